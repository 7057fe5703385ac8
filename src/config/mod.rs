/// Application configuration module
use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub dispatch: DispatchSettings,
    pub rate_limit: RateLimitSettings,
    pub payload: PayloadSettings,
    pub fcm: Option<FcmSettings>,
    pub apns: Option<ApnsSettings>,
}

#[derive(Clone, Debug)]
pub struct DispatchSettings {
    pub concurrency: usize,
    pub push_timeout: Duration,
    pub fanout_deadline: Duration,
}

#[derive(Clone, Debug)]
pub struct RateLimitSettings {
    pub window_seconds: u64,
    pub prune_every_seconds: u64,
}

#[derive(Clone, Debug)]
pub struct PayloadSettings {
    pub badge: u32,
    pub sound: Option<String>,
}

#[derive(Clone, Debug)]
pub struct FcmSettings {
    pub project_id: String,
    pub access_token: String,
}

#[derive(Clone, Debug)]
pub struct ApnsSettings {
    pub bearer_token: String,
    pub topic: String,
    pub sandbox: bool,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is required"))?;

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let dispatch = DispatchSettings {
            concurrency: env_u64("DISPATCH_CONCURRENCY", 32).max(1) as usize,
            push_timeout: Duration::from_millis(env_u64("PUSH_TIMEOUT_MS", 5_000)),
            fanout_deadline: Duration::from_millis(env_u64("FANOUT_DEADLINE_MS", 30_000)),
        };

        let rate_limit = RateLimitSettings {
            window_seconds: env_u64("RATE_LIMIT_WINDOW_SECONDS", 3600), // 1h
            prune_every_seconds: env_u64("ALERT_HISTORY_PRUNE_SECONDS", 600),
        };

        let payload = PayloadSettings {
            badge: env_u32("DEFAULT_BADGE", 1),
            sound: env_opt("DEFAULT_SOUND"),
        };

        let fcm = match (env_opt("FCM_PROJECT_ID"), env_opt("FCM_ACCESS_TOKEN")) {
            (Some(project_id), Some(access_token)) => Some(FcmSettings {
                project_id,
                access_token,
            }),
            _ => None,
        };

        let apns = match (env_opt("APNS_BEARER_TOKEN"), env_opt("APNS_TOPIC")) {
            (Some(bearer_token), Some(topic)) => Some(ApnsSettings {
                bearer_token,
                topic,
                sandbox: env_bool("APNS_SANDBOX", false),
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            bind_addr,
            dispatch,
            rate_limit,
            payload,
            fcm,
            apns,
        })
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Values that do not fit in a `u32` fall back to `default`
fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key).ok().as_deref().map(str::trim) {
        Some("1") | Some("true") | Some("yes") => true,
        Some("0") | Some("false") | Some("no") => false,
        _ => default,
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_u32_rejects_oversized_values() {
        env::set_var("SIGHTING_FANOUT_TEST_BADGE_BIG", "4294967297");
        assert_eq!(env_u32("SIGHTING_FANOUT_TEST_BADGE_BIG", 1), 1);

        env::set_var("SIGHTING_FANOUT_TEST_BADGE_OK", " 7 ");
        assert_eq!(env_u32("SIGHTING_FANOUT_TEST_BADGE_OK", 1), 7);

        assert_eq!(env_u32("SIGHTING_FANOUT_TEST_BADGE_UNSET", 3), 3);
    }

    #[test]
    fn env_bool_accepts_common_spellings() {
        env::set_var("SIGHTING_FANOUT_TEST_FLAG_YES", "yes");
        env::set_var("SIGHTING_FANOUT_TEST_FLAG_ZERO", "0");
        assert!(env_bool("SIGHTING_FANOUT_TEST_FLAG_YES", false));
        assert!(!env_bool("SIGHTING_FANOUT_TEST_FLAG_ZERO", true));
        assert!(env_bool("SIGHTING_FANOUT_TEST_FLAG_UNSET", true));
    }
}
