use super::{AlertHistoryStore, StoreResult};
use crate::errors::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct Entry {
    at: DateTime<Utc>,
    event_id: String,
}

/// Process-local alert history, keyed by user id with entries ordered by time.
///
/// Suitable for a single instance; multi-instance deployments use
/// [`super::PgAlertHistoryStore`].
#[derive(Default)]
pub struct InMemoryAlertHistory {
    entries: Mutex<HashMap<String, VecDeque<Entry>>>,
}

impl InMemoryAlertHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, VecDeque<Entry>>>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("alert history lock poisoned".to_string()))
    }
}

fn insert_ordered(history: &mut VecDeque<Entry>, entry: Entry) {
    let idx = history.partition_point(|e| e.at <= entry.at);
    history.insert(idx, entry);
}

fn drop_before(history: &mut VecDeque<Entry>, cutoff: DateTime<Utc>) -> usize {
    let mut removed = 0;
    while history.front().map_or(false, |e| e.at < cutoff) {
        history.pop_front();
        removed += 1;
    }
    removed
}

#[async_trait]
impl AlertHistoryStore for InMemoryAlertHistory {
    async fn count_since(&self, user_id: &str, since: DateTime<Utc>) -> StoreResult<u32> {
        let map = self.lock()?;
        let count = map
            .get(user_id)
            .map(|h| h.iter().filter(|e| e.at >= since).count())
            .unwrap_or(0);
        Ok(count as u32)
    }

    async fn append(&self, user_id: &str, at: DateTime<Utc>, event_id: &str) -> StoreResult<()> {
        let mut map = self.lock()?;
        let history = map.entry(user_id.to_string()).or_default();
        insert_ordered(
            history,
            Entry {
                at,
                event_id: event_id.to_string(),
            },
        );
        Ok(())
    }

    async fn append_within_limit(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
        since: DateTime<Utc>,
        limit: u32,
        event_id: &str,
    ) -> StoreResult<bool> {
        let mut map = self.lock()?;
        let history = map.entry(user_id.to_string()).or_default();
        // Lazy expiry on write
        drop_before(history, since);
        if history.len() as u32 >= limit {
            return Ok(false);
        }
        insert_ordered(
            history,
            Entry {
                at,
                event_id: event_id.to_string(),
            },
        );
        Ok(true)
    }

    async fn remove(&self, user_id: &str, event_id: &str) -> StoreResult<()> {
        let mut map = self.lock()?;
        if let Some(history) = map.get_mut(user_id) {
            history.retain(|e| e.event_id != event_id);
            if history.is_empty() {
                map.remove(user_id);
            }
        }
        Ok(())
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut map = self.lock()?;
        let mut removed = 0u64;
        for history in map.values_mut() {
            removed += drop_before(history, cutoff) as u64;
        }
        map.retain(|_, h| !h.is_empty());
        Ok(removed)
    }
}
