use super::{AlertHistoryStore, DeviceRegistry, StoreResult, UserLocationSource};
use crate::domain::{DevicePreferences, DeviceRegistration, Platform, ProviderKind, UserLocation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;

/// Users with a known location, read from `user_locations`
#[derive(Clone)]
pub struct PgUserLocationSource {
    pool: PgPool,
}

impl PgUserLocationSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserLocationSource for PgUserLocationSource {
    async fn snapshot(&self) -> StoreResult<Vec<UserLocation>> {
        let rows = sqlx::query_as::<_, (String, f64, f64, f64, i32, bool)>(
            "SELECT user_id, latitude, longitude, alert_range_km,
                    max_alerts_per_hour, alert_notifications_enabled
             FROM user_locations
             WHERE latitude IS NOT NULL AND longitude IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(user_id, latitude, longitude, alert_range_km, max_per_hour, enabled)| {
                    UserLocation {
                        user_id,
                        latitude,
                        longitude,
                        alert_range_km,
                        max_alerts_per_hour: max_per_hour.max(0) as u32,
                        alert_notifications_enabled: enabled,
                    }
                },
            )
            .collect())
    }
}

/// Device registrations, read from `device_registrations`
#[derive(Clone)]
pub struct PgDeviceRegistry {
    pool: PgPool,
}

impl PgDeviceRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceRegistry for PgDeviceRegistry {
    async fn active_devices(&self, user_id: &str) -> StoreResult<Vec<DeviceRegistration>> {
        let rows = sqlx::query_as::<_, (String, String, String, String, String, bool, bool, bool)>(
            "SELECT device_id, user_id, push_token, platform, provider,
                    alert_notifications, chat_notifications, system_notifications
             FROM device_registrations
             WHERE user_id = $1 AND is_active = TRUE",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut devices = Vec::with_capacity(rows.len());
        for (device_id, user_id, push_token, platform, provider, alert, chat, system) in rows {
            // Rows with a platform or provider we cannot deliver to are skipped
            let (platform, provider) = match (platform.parse::<Platform>(), provider.parse::<ProviderKind>()) {
                (Ok(platform), Ok(provider)) => (platform, provider),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(device_id = %device_id, error = %e, "Skipping device registration");
                    continue;
                }
            };
            devices.push(DeviceRegistration {
                device_id,
                user_id,
                push_token,
                platform,
                provider,
                preferences: DevicePreferences {
                    alert,
                    chat,
                    system,
                },
                is_active: true,
            });
        }
        Ok(devices)
    }
}

/// Alert history in `alert_history`, shared across instances
#[derive(Clone)]
pub struct PgAlertHistoryStore {
    pool: PgPool,
}

impl PgAlertHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertHistoryStore for PgAlertHistoryStore {
    async fn count_since(&self, user_id: &str, since: DateTime<Utc>) -> StoreResult<u32> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT count(*) FROM alert_history WHERE user_id = $1 AND sent_at >= $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0.max(0) as u32)
    }

    async fn append(&self, user_id: &str, at: DateTime<Utc>, event_id: &str) -> StoreResult<()> {
        sqlx::query("INSERT INTO alert_history (user_id, sent_at, event_id) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(at)
            .bind(event_id)
            .execute(&self.pool)
            .await?;
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
        let mut tx = self.pool.begin().await?;

        // Serializes check-and-insert per user until commit
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let (count,) = sqlx::query_as::<_, (i64,)>(
            "SELECT count(*) FROM alert_history WHERE user_id = $1 AND sent_at >= $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&mut *tx)
        .await?;

        if count >= i64::from(limit) {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("INSERT INTO alert_history (user_id, sent_at, event_id) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(at)
            .bind(event_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn remove(&self, user_id: &str, event_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM alert_history WHERE user_id = $1 AND event_id = $2")
            .bind(user_id)
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM alert_history WHERE sent_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Initialize database tables
pub async fn init_db(pool: &PgPool) -> StoreResult<()> {
    // Read-only snapshots owned by the profile and device subsystems
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_locations(
            user_id TEXT PRIMARY KEY,
            latitude DOUBLE PRECISION,
            longitude DOUBLE PRECISION,
            alert_range_km DOUBLE PRECISION NOT NULL DEFAULT 50,
            max_alerts_per_hour INT NOT NULL DEFAULT 5,
            alert_notifications_enabled BOOLEAN NOT NULL DEFAULT TRUE,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS device_registrations(
            device_id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            push_token TEXT NOT NULL,
            platform TEXT NOT NULL,
            provider TEXT NOT NULL,
            alert_notifications BOOLEAN NOT NULL DEFAULT TRUE,
            chat_notifications BOOLEAN NOT NULL DEFAULT TRUE,
            system_notifications BOOLEAN NOT NULL DEFAULT TRUE,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            registered_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS ix_device_registrations_user
         ON device_registrations(user_id) WHERE is_active",
    )
    .execute(pool)
    .await?;

    // Rate-limit history
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS alert_history(
            id BIGSERIAL PRIMARY KEY,
            user_id TEXT NOT NULL,
            sent_at TIMESTAMPTZ NOT NULL,
            event_id TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS ix_alert_history_user_sent
         ON alert_history(user_id, sent_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
