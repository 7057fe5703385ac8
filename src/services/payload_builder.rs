use crate::config::PayloadSettings;
use crate::domain::{NotificationCategory, SightingEvent};
use crate::utils::{format_distance, stringify, truncate_chars};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

const DEFAULT_SOUND: &str = "default";
const PREVIEW_CHARS: usize = 120;

/// Platform-agnostic notification content
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPayload {
    pub category: NotificationCategory,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, Value>,
    pub badge: u32,
    pub sound: Option<String>,
}

impl NotificationPayload {
    fn sound_or_default(&self) -> &str {
        self.sound.as_deref().unwrap_or(DEFAULT_SOUND)
    }

    /// FCM-style message body (without the target token)
    pub fn to_fcm(&self) -> Value {
        let data: Map<String, Value> = self
            .data
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(stringify(v))))
            .collect();

        json!({
            "notification": {
                "title": self.title,
                "body": self.body,
            },
            "data": data,
            "android": {
                "priority": "high",
                "notification": {
                    "sound": self.sound_or_default(),
                    "channel_id": self.category.as_str(),
                },
            },
        })
    }

    /// APNS-style payload; `data` keys are mirrored at the top level
    pub fn to_apns(&self) -> Value {
        let mut root = Map::new();
        for (k, v) in &self.data {
            if k != "aps" {
                root.insert(k.clone(), v.clone());
            }
        }
        root.insert(
            "aps".to_string(),
            json!({
                "alert": {
                    "title": self.title,
                    "body": self.body,
                },
                "sound": self.sound_or_default(),
                "badge": self.badge,
                "thread-id": self.category.as_str(),
            }),
        );
        Value::Object(root)
    }
}

/// Builds notification payloads from sighting and chat events
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    badge: u32,
    sound: Option<String>,
}

impl Default for PayloadBuilder {
    fn default() -> Self {
        Self {
            badge: 1,
            sound: None,
        }
    }
}

impl PayloadBuilder {
    pub fn new(settings: &PayloadSettings) -> Self {
        Self {
            badge: settings.badge,
            sound: settings.sound.clone(),
        }
    }

    fn payload(
        &self,
        category: NotificationCategory,
        title: String,
        body: String,
        data: BTreeMap<String, Value>,
    ) -> NotificationPayload {
        NotificationPayload {
            category,
            title,
            body,
            data,
            badge: self.badge,
            sound: self.sound.clone(),
        }
    }

    pub fn build_sighting_alert(
        &self,
        sighting: &SightingEvent,
        distance_km: f64,
    ) -> NotificationPayload {
        let title = match shape_label(sighting.shape.as_deref()) {
            Some(label) => format!("🛸 {} UFO spotted nearby", label),
            None => "🛸 UFO sighting nearby".to_string(),
        };

        let distance = format_distance(distance_km);
        let body = match sighting.title.trim() {
            "" => format!("Reported {} from you", distance),
            report => format!("{} away: {}", distance, truncate_chars(report, PREVIEW_CHARS)),
        };

        let mut data = BTreeMap::new();
        data.insert("type".to_string(), json!(NotificationCategory::SightingAlert.as_str()));
        data.insert("sighting_id".to_string(), json!(sighting.id));
        data.insert(
            "distance_km".to_string(),
            json!((distance_km * 10.0).round() / 10.0),
        );
        data.insert("confidence".to_string(), json!(sighting.confidence));
        data.insert("deep_link".to_string(), json!(sighting_link(&sighting.id)));
        if let Some(shape) = sighting.shape.as_deref() {
            data.insert("shape".to_string(), json!(shape));
        }

        self.payload(NotificationCategory::SightingAlert, title, body, data)
    }

    pub fn build_chat_notification(
        &self,
        sighting_id: &str,
        room_id: &str,
        sender: &str,
        preview: &str,
    ) -> NotificationPayload {
        let title = "💬 New message in UFO sighting chat".to_string();
        let body = format!("{}: {}", sender, truncate_chars(preview, PREVIEW_CHARS));

        let mut data = BTreeMap::new();
        data.insert("type".to_string(), json!(NotificationCategory::ChatMessage.as_str()));
        data.insert("sighting_id".to_string(), json!(sighting_id));
        data.insert("room_id".to_string(), json!(room_id));
        data.insert("sender".to_string(), json!(sender));
        data.insert(
            "deep_link".to_string(),
            json!(format!("{}/chat", sighting_link(sighting_id))),
        );

        self.payload(NotificationCategory::ChatMessage, title, body, data)
    }

    /// Operational notice; `focus` points the compass view at a location
    pub fn build_system_notification(
        &self,
        title: &str,
        body: &str,
        focus: Option<(f64, f64)>,
    ) -> NotificationPayload {
        let title = match title.trim() {
            "" => "UFO alert service update".to_string(),
            t => t.to_string(),
        };

        let deep_link = match focus {
            Some((lat, lon)) => format!("app://compass?lat={:.5}&lon={:.5}", lat, lon),
            None => "app://compass".to_string(),
        };

        let mut data = BTreeMap::new();
        data.insert("type".to_string(), json!(NotificationCategory::System.as_str()));
        data.insert("deep_link".to_string(), json!(deep_link));

        self.payload(NotificationCategory::System, title, body.to_string(), data)
    }
}

fn sighting_link(id: &str) -> String {
    format!("app://sighting/{}", id)
}

/// Display label for a recognised shape classifier
fn shape_label(shape: Option<&str>) -> Option<&'static str> {
    let label = match shape?.trim().to_ascii_lowercase().as_str() {
        "light" | "lights" => "Mysterious light",
        "orb" | "sphere" | "circle" => "Orb-shaped",
        "disc" | "disk" | "saucer" => "Disc-shaped",
        "triangle" => "Triangular",
        "cigar" | "cylinder" => "Cigar-shaped",
        "fireball" => "Fireball",
        "formation" => "Formation of",
        "chevron" | "boomerang" => "Chevron-shaped",
        "diamond" => "Diamond-shaped",
        "rectangle" => "Rectangular",
        "oval" | "egg" => "Oval",
        "tic-tac" | "tictac" => "Tic-tac",
        _ => return None,
    };
    Some(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sighting(shape: Option<&str>) -> SightingEvent {
        SightingEvent {
            id: "abc123".to_string(),
            latitude: 37.7749,
            longitude: -122.4194,
            title: "Silent lights over the bay".to_string(),
            description: "Three lights hovering".to_string(),
            shape: shape.map(str::to_string),
            confidence: 0.7,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn sighting_alert_mentions_ufo_for_any_shape() {
        let builder = PayloadBuilder::default();
        for shape in [Some("triangle"), Some("DISC"), Some("blob"), None] {
            let payload = builder.build_sighting_alert(&sighting(shape), 3.2);
            assert!(!payload.title.is_empty());
            assert!(payload.title.contains("UFO"), "{}", payload.title);
        }
        let generic = builder.build_sighting_alert(&sighting(Some("blob")), 3.2);
        assert!(generic.title.contains("UFO sighting"));
    }

    #[test]
    fn sighting_alert_data_has_link_and_distance() {
        let payload = PayloadBuilder::default().build_sighting_alert(&sighting(None), 12.34);
        assert_eq!(payload.data["type"], "sighting_alert");
        assert_eq!(payload.data["sighting_id"], "abc123");
        assert_eq!(payload.data["distance_km"], json!(12.3));
        assert_eq!(payload.data["deep_link"], "app://sighting/abc123");
        assert!(payload.body.contains("12 km"));
    }

    #[test]
    fn chat_notification_links_to_room() {
        let payload = PayloadBuilder::default().build_chat_notification(
            "abc123",
            "!room:example.org",
            "skywatcher",
            "Did anyone else see that?",
        );
        assert_eq!(payload.category, NotificationCategory::ChatMessage);
        assert_eq!(payload.data["deep_link"], "app://sighting/abc123/chat");
        assert_eq!(payload.body, "skywatcher: Did anyone else see that?");
    }

    #[test]
    fn system_notification_links_to_compass() {
        let builder = PayloadBuilder::default();
        let focused = builder.build_system_notification("Heads up", "Look north", Some((1.5, -2.25)));
        assert_eq!(focused.data["deep_link"], "app://compass?lat=1.50000&lon=-2.25000");
        let plain = builder.build_system_notification("", "Maintenance tonight", None);
        assert_eq!(plain.data["deep_link"], "app://compass");
        assert!(plain.title.contains("UFO"));
    }

    #[test]
    fn fcm_encoding_is_high_priority_with_string_data() {
        let payload = PayloadBuilder::default().build_sighting_alert(&sighting(Some("orb")), 0.4);
        let fcm = payload.to_fcm();
        assert_eq!(fcm["android"]["priority"], "high");
        assert_eq!(fcm["notification"]["title"], json!(payload.title));
        for (_, v) in fcm["data"].as_object().unwrap() {
            assert!(v.is_string());
        }
        assert_eq!(fcm["data"]["distance_km"], "0.4");
    }

    #[test]
    fn apns_encoding_carries_badge_and_mirrors_data() {
        let builder = PayloadBuilder::new(&PayloadSettings {
            badge: 7,
            sound: None,
        });
        let payload = builder.build_sighting_alert(&sighting(None), 1.0);
        let apns = payload.to_apns();
        assert_eq!(apns["aps"]["badge"], json!(7));
        assert_eq!(apns["aps"]["sound"], "default");
        assert_eq!(apns["aps"]["alert"]["body"], json!(payload.body));
        assert_eq!(apns["sighting_id"], "abc123");
        assert_eq!(apns["deep_link"], "app://sighting/abc123");
    }

    #[test]
    fn configured_sound_passes_through() {
        let builder = PayloadBuilder::new(&PayloadSettings {
            badge: 1,
            sound: Some("beacon.caf".to_string()),
        });
        let payload = builder.build_chat_notification("s", "r", "a", "b");
        assert_eq!(payload.to_apns()["aps"]["sound"], "beacon.caf");
        assert_eq!(payload.to_fcm()["android"]["notification"]["sound"], "beacon.caf");
    }
}
