/// HTTP request handlers
use crate::domain::{ChatMessageEvent, FanoutErrorKind, FanoutResult, Health, SightingEvent};
use crate::errors::{ApiError, ApiResult};
use crate::services::{cancel_pair, CancelSignal, FanoutOrchestrator};
use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<FanoutOrchestrator>,
    pub fanout_deadline: Duration,
}

/// Response wrapper; `ok` mirrors whether the fanout reached `done`
#[derive(Serialize)]
pub struct FanoutResponse<T: Serialize> {
    pub ok: bool,
    #[serde(flatten)]
    pub data: T,
}

impl FanoutResponse<FanoutResult> {
    pub fn new(result: FanoutResult) -> Self {
        Self {
            ok: result.is_done(),
            data: result,
        }
    }
}

/// Health check handler
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        now: Utc::now(),
    })
}

/// Cancel signal that fires once `deadline` elapses; abort the timer when done
fn deadline_signal(deadline: Duration) -> (JoinHandle<()>, CancelSignal) {
    let (handle, signal) = cancel_pair();
    let timer = tokio::spawn(async move {
        tokio::time::sleep(deadline).await;
        handle.cancel();
    });
    (timer, signal)
}

/// Fan out alerts for a newly created sighting
pub async fn fanout_sighting(
    State(state): State<AppState>,
    Json(sighting): Json<SightingEvent>,
) -> ApiResult<Json<FanoutResponse<FanoutResult>>> {
    let (timer, signal) = deadline_signal(state.fanout_deadline);
    let result = state
        .orchestrator
        .fanout_with_cancel(&sighting, &signal)
        .await;
    timer.abort();

    if result.error_kind == Some(FanoutErrorKind::InvalidSighting) {
        return Err(ApiError::InvalidInput(
            result
                .failure_reason
                .unwrap_or_else(|| "invalid sighting".to_string()),
        ));
    }

    Ok(Json(FanoutResponse::new(result)))
}

/// Notify chat room members of a new message
pub async fn fanout_chat(
    State(state): State<AppState>,
    Json(message): Json<ChatMessageEvent>,
) -> ApiResult<Json<FanoutResponse<FanoutResult>>> {
    if message.sighting_id.trim().is_empty() || message.room_id.trim().is_empty() {
        return Err(ApiError::InvalidInput(
            "sighting_id and room_id are required".to_string(),
        ));
    }

    let (timer, signal) = deadline_signal(state.fanout_deadline);
    let result = state
        .orchestrator
        .fanout_chat_with_cancel(&message, &signal)
        .await;
    timer.abort();

    Ok(Json(FanoutResponse::new(result)))
}
