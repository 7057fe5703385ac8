/// Domain models for the fanout engine
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A newly created sighting report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SightingEvent {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub shape: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// A user's last known position and alert preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub alert_range_km: f64,
    pub max_alerts_per_hour: u32,
    pub alert_notifications_enabled: bool,
}

/// A user that passed the geographic gate
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyUser {
    pub user: UserLocation,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Fcm,
    Apns,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Fcm => "fcm",
            ProviderKind::Apns => "apns",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fcm" => Ok(ProviderKind::Fcm),
            "apns" => Ok(ProviderKind::Apns),
            other => Err(format!("unknown push provider '{}'", other)),
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            other => Err(format!("unknown platform '{}'", other)),
        }
    }
}

/// Notification categories a device can opt in or out of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    SightingAlert,
    ChatMessage,
    System,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::SightingAlert => "sighting_alert",
            NotificationCategory::ChatMessage => "chat_message",
            NotificationCategory::System => "system",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePreferences {
    pub alert: bool,
    pub chat: bool,
    pub system: bool,
}

impl Default for DevicePreferences {
    fn default() -> Self {
        Self {
            alert: true,
            chat: true,
            system: true,
        }
    }
}

impl DevicePreferences {
    pub fn allows(&self, category: NotificationCategory) -> bool {
        match category {
            NotificationCategory::SightingAlert => self.alert,
            NotificationCategory::ChatMessage => self.chat,
            NotificationCategory::System => self.system,
        }
    }
}

/// Registered push-capable device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRegistration {
    pub device_id: String,
    pub user_id: String,
    pub push_token: String,
    pub platform: Platform,
    pub provider: ProviderKind,
    pub preferences: DevicePreferences,
    pub is_active: bool,
}

/// One device to deliver to within a single fanout
#[derive(Debug, Clone, PartialEq)]
pub struct PushTarget {
    pub device_id: String,
    pub user_id: String,
    pub push_token: String,
    pub provider: ProviderKind,
    pub platform: Platform,
    pub preferences: DevicePreferences,
}

impl From<DeviceRegistration> for PushTarget {
    fn from(device: DeviceRegistration) -> Self {
        Self {
            device_id: device.device_id,
            user_id: device.user_id,
            push_token: device.push_token,
            provider: device.provider,
            platform: device.platform,
            preferences: device.preferences,
        }
    }
}

/// Chat message posted in a sighting's room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageEvent {
    pub sighting_id: String,
    pub room_id: String,
    pub sender_user_id: String,
    pub sender_name: String,
    pub preview: String,
    pub recipient_user_ids: Vec<String>,
}

/// Fanout lifecycle. `Done` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanoutStage {
    Received,
    Filtered,
    RateLimited,
    Resolved,
    Dispatched,
    Done,
    Error,
}

impl FanoutStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FanoutStage::Done | FanoutStage::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanoutErrorKind {
    InvalidSighting,
    SourceUnavailable,
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStats {
    pub targets: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Summary of one fanout invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutResult {
    pub sighting_id: String,
    pub stage: FanoutStage,
    /// Last stage reached before the run moved to `Error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<FanoutStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FanoutErrorKind>,
    /// Internal failure detail; logged, never serialized to callers.
    #[serde(skip)]
    pub failure_reason: Option<String>,
    pub nearby_users: usize,
    pub rate_limited: usize,
    pub rate_limit_store_failures: usize,
    pub push_targets: usize,
    pub users_notified: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
    /// Never started because the run was cancelled
    pub not_attempted: usize,
    /// Issued, but finished after cancellation so the outcome is unknown
    pub discarded: usize,
    pub per_provider: BTreeMap<String, ProviderStats>,
}

impl FanoutResult {
    pub fn new(sighting_id: impl Into<String>) -> Self {
        Self {
            sighting_id: sighting_id.into(),
            stage: FanoutStage::Received,
            failed_at: None,
            error_kind: None,
            failure_reason: None,
            nearby_users: 0,
            rate_limited: 0,
            rate_limit_store_failures: 0,
            push_targets: 0,
            users_notified: 0,
            notifications_sent: 0,
            notifications_failed: 0,
            not_attempted: 0,
            discarded: 0,
            per_provider: BTreeMap::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.stage == FanoutStage::Done
    }
}

/// Health check response
#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub now: DateTime<Utc>,
}
