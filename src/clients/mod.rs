/// Push provider clients
use crate::config::{ApnsSettings, FcmSettings};
use crate::domain::ProviderKind;
use crate::errors::ProviderError;
use crate::services::{NotificationPayload, ProviderReceipt, PushProvider};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::time::Duration;

const FCM_BASE_URL: &str = "https://fcm.googleapis.com";
const APNS_PRODUCTION_URL: &str = "https://api.push.apple.com";
const APNS_SANDBOX_URL: &str = "https://api.sandbox.push.apple.com";

/// HTTP client wrapper with common configuration
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("sighting-fanout/1.0")
            .build()?;
        Ok(Self { client })
    }

    pub fn get_client(&self) -> &Client {
        &self.client
    }
}

async fn rejected(resp: Response) -> ProviderError {
    let status = resp.status().as_u16();
    let reason = resp.text().await.unwrap_or_default();
    ProviderError::Rejected { status, reason }
}

/// Firebase Cloud Messaging (HTTP v1)
pub struct FcmClient {
    http_client: HttpClient,
    base_url: String,
    settings: FcmSettings,
}

impl FcmClient {
    pub fn new(settings: FcmSettings, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: HttpClient::new(timeout)?,
            base_url: FCM_BASE_URL.to_string(),
            settings,
        })
    }

    fn send_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/messages:send",
            self.base_url, self.settings.project_id
        )
    }
}

#[async_trait]
impl PushProvider for FcmClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Fcm
    }

    fn encode(&self, payload: &NotificationPayload) -> Value {
        payload.to_fcm()
    }

    async fn send(&self, token: &str, encoded: &Value) -> Result<ProviderReceipt, ProviderError> {
        let mut message = encoded.clone();
        if let Some(obj) = message.as_object_mut() {
            obj.insert("token".to_string(), json!(token));
        }

        let resp = self
            .http_client
            .get_client()
            .post(self.send_url())
            .bearer_auth(&self.settings.access_token)
            .json(&json!({ "message": message }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(rejected(resp).await);
        }

        let body: Value = resp.json().await?;
        Ok(ProviderReceipt {
            message_id: body.get("name").and_then(Value::as_str).map(str::to_string),
        })
    }
}

/// Apple Push Notification service (token-based auth)
pub struct ApnsClient {
    http_client: HttpClient,
    base_url: String,
    settings: ApnsSettings,
}

impl ApnsClient {
    pub fn new(settings: ApnsSettings, timeout: Duration) -> Result<Self, ProviderError> {
        let base_url = if settings.sandbox {
            APNS_SANDBOX_URL
        } else {
            APNS_PRODUCTION_URL
        };
        Ok(Self {
            http_client: HttpClient::new(timeout)?,
            base_url: base_url.to_string(),
            settings,
        })
    }
}

#[async_trait]
impl PushProvider for ApnsClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Apns
    }

    fn encode(&self, payload: &NotificationPayload) -> Value {
        payload.to_apns()
    }

    async fn send(&self, token: &str, encoded: &Value) -> Result<ProviderReceipt, ProviderError> {
        let resp = self
            .http_client
            .get_client()
            .post(format!("{}/3/device/{}", self.base_url, token))
            .bearer_auth(&self.settings.bearer_token)
            .header("apns-topic", &self.settings.topic)
            .header("apns-push-type", "alert")
            .header("apns-priority", "10")
            .json(encoded)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(rejected(resp).await);
        }

        Ok(ProviderReceipt {
            message_id: resp
                .headers()
                .get("apns-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fcm_send_url_includes_project() {
        let client = FcmClient::new(
            FcmSettings {
                project_id: "ufo-alerts".to_string(),
                access_token: "token".to_string(),
            },
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.send_url(),
            "https://fcm.googleapis.com/v1/projects/ufo-alerts/messages:send"
        );
        assert_eq!(client.kind(), ProviderKind::Fcm);
    }

    #[test]
    fn apns_sandbox_selects_host() {
        let client = ApnsClient::new(
            ApnsSettings {
                bearer_token: "jwt".to_string(),
                topic: "com.example.ufo".to_string(),
                sandbox: true,
            },
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.base_url, APNS_SANDBOX_URL);
        assert_eq!(client.kind(), ProviderKind::Apns);
    }
}
