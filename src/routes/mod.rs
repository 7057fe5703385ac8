/// Application routes configuration
use crate::handlers::{fanout_chat, fanout_sighting, health, AppState};
use axum::{
    routing::{get, post},
    Router,
};

/// Build the application router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Fanout triggers, called by the sighting and chat workflows
        .route("/fanout/sightings", post(fanout_sighting))
        .route("/fanout/chat", post(fanout_chat))
        .with_state(state)
}
