/// Repository layer: the storage collaborators the fanout engine reads and writes
mod memory;
mod postgres;

pub use memory::InMemoryAlertHistory;
pub use postgres::{init_db, PgAlertHistoryStore, PgDeviceRegistry, PgUserLocationSource};

use crate::domain::{DeviceRegistration, UserLocation};
use crate::errors::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub type StoreResult<T> = Result<T, StoreError>;

/// Snapshot of users with a known location
#[async_trait]
pub trait UserLocationSource: Send + Sync {
    async fn snapshot(&self) -> StoreResult<Vec<UserLocation>>;
}

/// Lookup of registered devices by owning user
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Active registrations for one user. Unknown users yield an empty list.
    async fn active_devices(&self, user_id: &str) -> StoreResult<Vec<DeviceRegistration>>;
}

/// Per-user rolling record of alert timestamps.
///
/// Implementations are shared by every concurrent fanout and must make
/// `append_within_limit` atomic per user; the check and the insert cannot
/// interleave with another fanout's for the same user.
#[async_trait]
pub trait AlertHistoryStore: Send + Sync {
    /// Number of entries for `user_id` at or after `since`.
    async fn count_since(&self, user_id: &str, since: DateTime<Utc>) -> StoreResult<u32>;

    /// Unconditionally append an entry.
    async fn append(&self, user_id: &str, at: DateTime<Utc>, event_id: &str) -> StoreResult<()>;

    /// Append only when fewer than `limit` entries exist since `since`.
    /// Returns whether the entry was written.
    async fn append_within_limit(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
        since: DateTime<Utc>,
        limit: u32,
        event_id: &str,
    ) -> StoreResult<bool>;

    /// Drop the entries `user_id` holds for `event_id`.
    async fn remove(&self, user_id: &str, event_id: &str) -> StoreResult<()>;

    /// Drop every entry older than `cutoff`, returning how many were removed.
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}
