use crate::domain::NearbyUser;
use crate::repo::AlertHistoryStore;
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of a rate-limit pass
#[derive(Debug, Default)]
pub struct RateLimitOutcome {
    /// Candidates that received a history slot for this event
    pub allowed: Vec<NearbyUser>,
    /// Candidates dropped because their budget is used up
    pub limited: usize,
    /// Candidates dropped because the store could not be consulted
    pub store_failures: usize,
}

/// Per-user hourly alert budget over a shared [`AlertHistoryStore`].
///
/// `apply` reserves a history slot per admitted user atomically, so concurrent
/// fanouts cannot both admit the user's last remaining slot. `record` then keeps
/// the slots of users that were actually sent to and releases the rest.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn AlertHistoryStore>,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn AlertHistoryStore>, window: Duration) -> Self {
        Self { store, window }
    }

    pub fn hourly(store: Arc<dyn AlertHistoryStore>) -> Self {
        Self::new(store, Duration::hours(1))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn store(&self) -> &Arc<dyn AlertHistoryStore> {
        &self.store
    }

    pub async fn apply(&self, candidates: Vec<NearbyUser>, event_id: &str) -> RateLimitOutcome {
        let now = Utc::now();
        let since = now - self.window;
        let mut outcome = RateLimitOutcome::default();

        for candidate in candidates {
            let user_id = candidate.user.user_id.as_str();
            let limit = candidate.user.max_alerts_per_hour;
            if limit == 0 {
                outcome.limited += 1;
                continue;
            }

            match self
                .store
                .append_within_limit(user_id, now, since, limit, event_id)
                .await
            {
                Ok(true) => outcome.allowed.push(candidate),
                Ok(false) => {
                    debug!(user_id, limit, "User over alert budget");
                    outcome.limited += 1;
                }
                Err(e) => {
                    // Fail closed
                    warn!(user_id, error = %e, "Alert history unavailable, excluding user");
                    outcome.store_failures += 1;
                }
            }
        }

        outcome
    }

    /// Settle the reservations `apply` made for `admitted`.
    ///
    /// Users in `attempted` keep their history entry; everyone else's entry for
    /// `event_id` is removed. Returns the number of committed entries.
    pub async fn record(
        &self,
        admitted: &[NearbyUser],
        attempted: &HashSet<String>,
        event_id: &str,
    ) -> usize {
        let mut committed = 0;
        for candidate in admitted {
            let user_id = candidate.user.user_id.as_str();
            if attempted.contains(user_id) {
                committed += 1;
                continue;
            }
            if let Err(e) = self.store.remove(user_id, event_id).await {
                // The stale slot expires with the window
                warn!(user_id, event_id, error = %e, "Failed to release alert slot");
            }
        }
        committed
    }
}
