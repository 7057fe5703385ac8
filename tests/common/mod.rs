//! Fixtures and builders shared by the fanout scenarios.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sighting_fanout::domain::{
    DevicePreferences, DeviceRegistration, Platform, ProviderKind, SightingEvent, UserLocation,
};
use sighting_fanout::errors::{ProviderError, StoreError};
use sighting_fanout::repo::{
    AlertHistoryStore, DeviceRegistry, InMemoryAlertHistory, StoreResult, UserLocationSource,
};
use sighting_fanout::services::{
    DeviceResolver, Dispatcher, FanoutOrchestrator, NotificationPayload, PayloadBuilder,
    ProviderReceipt, PushProvider, RateLimiter,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SF_LAT: f64 = 37.7749;
pub const SF_LON: f64 = -122.4194;
/// Oakland, roughly 13 km from San Francisco
pub const OAKLAND_LAT: f64 = 37.8044;
pub const OAKLAND_LON: f64 = -122.2712;

pub fn sighting(id: &str, lat: f64, lon: f64) -> SightingEvent {
    SightingEvent {
        id: id.to_string(),
        latitude: lat,
        longitude: lon,
        title: "Glowing triangle hovering".to_string(),
        description: "Three lights, no sound".to_string(),
        shape: Some("triangle".to_string()),
        confidence: 0.8,
        created_at: Utc::now(),
    }
}

pub fn user(id: &str, lat: f64, lon: f64, range_km: f64, max_per_hour: u32) -> UserLocation {
    UserLocation {
        user_id: id.to_string(),
        latitude: lat,
        longitude: lon,
        alert_range_km: range_km,
        max_alerts_per_hour: max_per_hour,
        alert_notifications_enabled: true,
    }
}

pub fn device(id: &str, user_id: &str, provider: ProviderKind) -> DeviceRegistration {
    DeviceRegistration {
        device_id: id.to_string(),
        user_id: user_id.to_string(),
        push_token: format!("token-{}", id),
        platform: match provider {
            ProviderKind::Fcm => Platform::Android,
            ProviderKind::Apns => Platform::Ios,
        },
        provider,
        preferences: DevicePreferences::default(),
        is_active: true,
    }
}

/// Fixed snapshot of users; `failing()` simulates an outage
pub struct StaticUsers {
    users: Vec<UserLocation>,
    fail: bool,
}

impl StaticUsers {
    pub fn new(users: Vec<UserLocation>) -> Arc<Self> {
        Arc::new(Self { users, fail: false })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            users: Vec::new(),
            fail: true,
        })
    }
}

#[async_trait]
impl UserLocationSource for StaticUsers {
    async fn snapshot(&self) -> StoreResult<Vec<UserLocation>> {
        if self.fail {
            return Err(StoreError::Unavailable("profile service down".into()));
        }
        Ok(self.users.clone())
    }
}

#[derive(Default)]
pub struct StaticDevices {
    by_user: HashMap<String, Vec<DeviceRegistration>>,
    fail: bool,
}

impl StaticDevices {
    pub fn new(devices: Vec<DeviceRegistration>) -> Arc<Self> {
        let mut by_user: HashMap<String, Vec<DeviceRegistration>> = HashMap::new();
        for d in devices {
            by_user.entry(d.user_id.clone()).or_default().push(d);
        }
        Arc::new(Self { by_user, fail: false })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            by_user: HashMap::new(),
            fail: true,
        })
    }
}

#[async_trait]
impl DeviceRegistry for StaticDevices {
    async fn active_devices(&self, user_id: &str) -> StoreResult<Vec<DeviceRegistration>> {
        if self.fail {
            return Err(StoreError::Unavailable("device registry down".into()));
        }
        Ok(self.by_user.get(user_id).cloned().unwrap_or_default())
    }
}

/// Push provider that records deliveries per token.
/// Tokens containing "bad" are rejected.
pub struct RecordingProvider {
    kind: ProviderKind,
    delay: Duration,
    pub calls: AtomicUsize,
    pub delivered: Mutex<Vec<(String, Value)>>,
}

impl RecordingProvider {
    pub fn new(kind: ProviderKind) -> Arc<Self> {
        Self::slow(kind, Duration::ZERO)
    }

    pub fn slow(kind: ProviderKind, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            kind,
            delay,
            calls: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn delivered_to(&self, token: &str) -> usize {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == token)
            .count()
    }

    pub fn payloads(&self) -> Vec<Value> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(_, v)| v.clone())
            .collect()
    }
}

#[async_trait]
impl PushProvider for RecordingProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn encode(&self, payload: &NotificationPayload) -> Value {
        match self.kind {
            ProviderKind::Fcm => payload.to_fcm(),
            ProviderKind::Apns => payload.to_apns(),
        }
    }

    async fn send(&self, token: &str, encoded: &Value) -> Result<ProviderReceipt, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if token.contains("bad") {
            return Err(ProviderError::Rejected {
                status: 410,
                reason: "Unregistered".into(),
            });
        }
        self.delivered
            .lock()
            .unwrap()
            .push((token.to_string(), encoded.clone()));
        Ok(ProviderReceipt {
            message_id: Some(format!("id-{}", token)),
        })
    }
}

pub struct Harness {
    pub orchestrator: Arc<FanoutOrchestrator>,
    pub history: Arc<InMemoryAlertHistory>,
    pub fcm: Arc<RecordingProvider>,
    pub apns: Arc<RecordingProvider>,
}

pub fn harness(users: Arc<dyn UserLocationSource>, devices: Arc<dyn DeviceRegistry>) -> Harness {
    harness_with(
        users,
        devices,
        RecordingProvider::new(ProviderKind::Fcm),
        RecordingProvider::new(ProviderKind::Apns),
        8,
    )
}

pub fn harness_with(
    users: Arc<dyn UserLocationSource>,
    devices: Arc<dyn DeviceRegistry>,
    fcm: Arc<RecordingProvider>,
    apns: Arc<RecordingProvider>,
    concurrency: usize,
) -> Harness {
    let history = Arc::new(InMemoryAlertHistory::new());
    let store: Arc<dyn AlertHistoryStore> = history.clone();
    let dispatcher = Dispatcher::new(concurrency, Duration::from_secs(2))
        .with_provider(fcm.clone())
        .with_provider(apns.clone());

    let orchestrator = FanoutOrchestrator::new(
        users,
        RateLimiter::hourly(store),
        DeviceResolver::new(devices),
        PayloadBuilder::default(),
        dispatcher,
    );

    Harness {
        orchestrator: Arc::new(orchestrator),
        history,
        fcm,
        apns,
    }
}
