use super::cancel::{cancel_pair, CancelHandle, CancelSignal};
use super::device_resolver::DeviceResolver;
use super::dispatcher::{DispatchBatch, DispatchReport, Dispatcher};
use super::geo_filter::find_nearby;
use super::payload_builder::PayloadBuilder;
use super::rate_limiter::RateLimiter;
use crate::domain::{
    ChatMessageEvent, FanoutResult, FanoutStage, NearbyUser, NotificationCategory, PushTarget,
    SightingEvent,
};
use crate::errors::FanoutError;
use crate::repo::UserLocationSource;
use crate::utils::check_coordinates;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tracks one fanout through its stages and owns its result
struct FanoutRun {
    result: FanoutResult,
}

impl FanoutRun {
    fn new(sighting_id: &str) -> Self {
        Self {
            result: FanoutResult::new(sighting_id),
        }
    }

    fn advance(&mut self, next: FanoutStage) {
        debug!(
            sighting_id = %self.result.sighting_id,
            from = ?self.result.stage,
            to = ?next,
            "Fanout stage transition"
        );
        self.result.stage = next;
    }

    fn fail(mut self, err: FanoutError) -> FanoutResult {
        warn!(
            sighting_id = %self.result.sighting_id,
            stage = ?self.result.stage,
            error = %err,
            "Fanout aborted"
        );
        self.result.failed_at = Some(self.result.stage);
        self.result.error_kind = Some(err.kind());
        self.result.failure_reason = Some(err.to_string());
        self.result.stage = FanoutStage::Error;
        self.result
    }

    fn absorb(&mut self, report: DispatchReport) {
        self.result.users_notified = report.attempted_users.len();
        self.result.notifications_sent = report.sent;
        self.result.notifications_failed = report.failed;
        self.result.not_attempted = report.not_attempted;
        self.result.discarded = report.discarded;
        self.result.per_provider = report.per_provider;
    }

    fn finish(mut self) -> FanoutResult {
        self.advance(FanoutStage::Done);
        let r = &self.result;
        info!(
            sighting_id = %r.sighting_id,
            nearby = r.nearby_users,
            rate_limited = r.rate_limited,
            targets = r.push_targets,
            sent = r.notifications_sent,
            failed = r.notifications_failed,
            "Fanout complete"
        );
        self.result
    }
}

/// Runs the alert pipeline for new sightings and chat messages
pub struct FanoutOrchestrator {
    users: Arc<dyn UserLocationSource>,
    rate_limiter: RateLimiter,
    devices: DeviceResolver,
    payloads: PayloadBuilder,
    dispatcher: Dispatcher,
}

impl FanoutOrchestrator {
    pub fn new(
        users: Arc<dyn UserLocationSource>,
        rate_limiter: RateLimiter,
        devices: DeviceResolver,
        payloads: PayloadBuilder,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            users,
            rate_limiter,
            devices,
            payloads,
            dispatcher,
        }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub async fn fanout(self: &Arc<Self>, sighting: &SightingEvent) -> FanoutResult {
        self.fanout_with_cancel(sighting, &CancelSignal::never()).await
    }

    /// Runs the pipeline on its own task. Dropping the returned future cancels
    /// the run instead of abandoning it, so rate-limit reservations are still
    /// settled against the sends that were actually issued.
    pub async fn fanout_with_cancel(
        self: &Arc<Self>,
        sighting: &SightingEvent,
        cancel: &CancelSignal,
    ) -> FanoutResult {
        let this = self.clone();
        let owned = sighting.clone();
        detached(&sighting.id, cancel, move |signal| async move {
            this.run_sighting(&owned, &signal).await
        })
        .await
    }

    /// Notify room members of a chat message; no geographic gate or rate limit
    pub async fn fanout_chat(self: &Arc<Self>, message: &ChatMessageEvent) -> FanoutResult {
        self.fanout_chat_with_cancel(message, &CancelSignal::never()).await
    }

    pub async fn fanout_chat_with_cancel(
        self: &Arc<Self>,
        message: &ChatMessageEvent,
        cancel: &CancelSignal,
    ) -> FanoutResult {
        let this = self.clone();
        let owned = message.clone();
        detached(&message.sighting_id, cancel, move |signal| async move {
            this.run_chat(&owned, &signal).await
        })
        .await
    }

    async fn run_sighting(&self, sighting: &SightingEvent, cancel: &CancelSignal) -> FanoutResult {
        let mut run = FanoutRun::new(&sighting.id);
        debug!(sighting_id = %sighting.id, "Fanout received");

        if let Err(reason) = validate_sighting(sighting) {
            return run.fail(FanoutError::InvalidSighting(reason));
        }
        if cancel.is_cancelled() {
            return run.fail(FanoutError::Cancelled);
        }

        let users = match self.users.snapshot().await {
            Ok(users) => users,
            Err(e) => return run.fail(FanoutError::source_unavailable("user location source", e)),
        };
        let nearby = find_nearby(sighting, &users);
        run.result.nearby_users = nearby.len();
        run.advance(FanoutStage::Filtered);

        if cancel.is_cancelled() {
            return run.fail(FanoutError::Cancelled);
        }

        let outcome = self.rate_limiter.apply(nearby, &sighting.id).await;
        run.result.rate_limited = outcome.limited;
        run.result.rate_limit_store_failures = outcome.store_failures;
        let admitted = outcome.allowed;
        run.advance(FanoutStage::RateLimited);

        if cancel.is_cancelled() {
            self.release(&admitted, &sighting.id).await;
            return run.fail(FanoutError::Cancelled);
        }

        let user_ids = admitted.iter().map(|n| n.user.user_id.clone()).collect();
        let targets = match self
            .devices
            .resolve(user_ids, NotificationCategory::SightingAlert)
            .await
        {
            Ok(targets) => targets,
            Err(e) => {
                self.release(&admitted, &sighting.id).await;
                return run.fail(FanoutError::source_unavailable("device registry", e));
            }
        };
        run.result.push_targets = targets.len();
        run.advance(FanoutStage::Resolved);

        let batches = self.sighting_batches(sighting, &admitted, targets);
        let report = self.dispatcher.dispatch(batches, cancel).await;
        let cancelled = report.was_cancelled();
        self.rate_limiter
            .record(&admitted, &report.attempted_users, &sighting.id)
            .await;
        run.absorb(report);

        if cancelled {
            return run.fail(FanoutError::Cancelled);
        }
        run.advance(FanoutStage::Dispatched);
        run.finish()
    }

    async fn run_chat(&self, message: &ChatMessageEvent, cancel: &CancelSignal) -> FanoutResult {
        let mut run = FanoutRun::new(&message.sighting_id);

        let mut seen = HashSet::new();
        let recipients: Vec<String> = message
            .recipient_user_ids
            .iter()
            .filter(|id| **id != message.sender_user_id && seen.insert(id.as_str()))
            .cloned()
            .collect();
        run.result.nearby_users = recipients.len();
        run.advance(FanoutStage::Filtered);
        run.advance(FanoutStage::RateLimited);

        if cancel.is_cancelled() {
            return run.fail(FanoutError::Cancelled);
        }

        let targets = match self
            .devices
            .resolve(recipients, NotificationCategory::ChatMessage)
            .await
        {
            Ok(targets) => targets,
            Err(e) => return run.fail(FanoutError::source_unavailable("device registry", e)),
        };
        run.result.push_targets = targets.len();
        run.advance(FanoutStage::Resolved);

        let payload = self.payloads.build_chat_notification(
            &message.sighting_id,
            &message.room_id,
            &message.sender_name,
            &message.preview,
        );
        let report = self
            .dispatcher
            .dispatch(vec![DispatchBatch { payload, targets }], cancel)
            .await;
        let cancelled = report.was_cancelled();
        run.absorb(report);

        if cancelled {
            return run.fail(FanoutError::Cancelled);
        }
        run.advance(FanoutStage::Dispatched);
        run.finish()
    }

    /// One batch per admitted user so the payload carries that user's distance
    fn sighting_batches(
        &self,
        sighting: &SightingEvent,
        admitted: &[NearbyUser],
        targets: Vec<PushTarget>,
    ) -> Vec<DispatchBatch> {
        let mut by_user: BTreeMap<String, Vec<PushTarget>> = BTreeMap::new();
        for target in targets {
            by_user.entry(target.user_id.clone()).or_default().push(target);
        }

        admitted
            .iter()
            .filter_map(|nearby| {
                let targets = by_user.remove(&nearby.user.user_id)?;
                Some(DispatchBatch {
                    payload: self.payloads.build_sighting_alert(sighting, nearby.distance_km),
                    targets,
                })
            })
            .collect()
    }

    async fn release(&self, admitted: &[NearbyUser], event_id: &str) {
        self.rate_limiter
            .record(admitted, &HashSet::new(), event_id)
            .await;
    }
}

/// Cancels the detached run when the waiting caller goes away
struct CancelOnDrop(CancelHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Spawn `job` and wait for it, forwarding `cancel` (or our own drop) to the
/// signal the job observes.
async fn detached<F, Fut>(id: &str, cancel: &CancelSignal, job: F) -> FanoutResult
where
    F: FnOnce(CancelSignal) -> Fut,
    Fut: Future<Output = FanoutResult> + Send + 'static,
{
    let (handle, signal) = cancel_pair();
    let guard = CancelOnDrop(handle);
    if cancel.is_cancelled() {
        guard.0.cancel();
    }

    let mut task = tokio::spawn(job(signal));
    let joined = tokio::select! {
        joined = &mut task => joined,
        _ = cancel.cancelled() => {
            guard.0.cancel();
            (&mut task).await
        }
    };

    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        // Aborted by runtime shutdown
        Err(_) => FanoutRun::new(id).fail(FanoutError::Cancelled),
    }
}

fn validate_sighting(sighting: &SightingEvent) -> Result<(), String> {
    if sighting.id.trim().is_empty() {
        return Err("sighting id is required".to_string());
    }
    check_coordinates(sighting.latitude, sighting.longitude)?;
    if !(0.0..=1.0).contains(&sighting.confidence) {
        return Err(format!("confidence {} outside [0, 1]", sighting.confidence));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sighting(lat: f64, lon: f64) -> SightingEvent {
        SightingEvent {
            id: "s-1".to_string(),
            latitude: lat,
            longitude: lon,
            title: String::new(),
            description: String::new(),
            shape: None,
            confidence: 0.5,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn validation_rejects_bad_sightings() {
        assert!(validate_sighting(&sighting(37.0, -122.0)).is_ok());
        assert!(validate_sighting(&sighting(91.0, 0.0)).is_err());
        assert!(validate_sighting(&sighting(0.0, 181.0)).is_err());

        let mut unnamed = sighting(0.0, 0.0);
        unnamed.id = "  ".to_string();
        assert!(validate_sighting(&unnamed).is_err());

        let mut overconfident = sighting(0.0, 0.0);
        overconfident.confidence = 1.5;
        assert!(validate_sighting(&overconfident).is_err());
    }
}
