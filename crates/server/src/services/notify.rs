//! WhatsApp notifications.
//!
//! Sends an interactive message with "Yes"/"No" reply buttons through the
//! WhatsApp Cloud API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::WhatsAppConfig;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YesNoMessage {
    pub phone: String,
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns the provider's message id.
    async fn send_yes_no(&self, message: &YesNoMessage) -> Result<String>;
}

pub struct WhatsAppNotifier {
    config: WhatsAppConfig,
    http_client: Client,
}

impl WhatsAppNotifier {
    pub fn new(config: WhatsAppConfig, http_client: Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    fn payload(message: &YesNoMessage) -> Value {
        json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": normalize_phone(&message.phone),
            "type": "interactive",
            "interactive": {
                "type": "button",
                "body": { "text": message.body },
                "action": {
                    "buttons": [
                        { "type": "reply", "reply": { "id": "yes", "title": "Yes" } },
                        { "type": "reply", "reply": { "id": "no", "title": "No" } }
                    ]
                }
            }
        })
    }
}

#[async_trait]
impl Notifier for WhatsAppNotifier {
    async fn send_yes_no(&self, message: &YesNoMessage) -> Result<String> {
        let (Some(token), Some(sender_id)) = (&self.config.token, &self.config.sender_id) else {
            return Err(AppError::Upstream(
                "WhatsApp credentials are not configured".to_string(),
            ));
        };

        let url = format!(
            "{}/{}/messages",
            self.config.api_url.trim_end_matches('/'),
            sender_id
        );

        let response = self
            .http_client
            .post(url)
            .bearer_auth(token)
            .json(&Self::payload(message))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("WhatsApp request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "WhatsApp returned {status}: {error_text}"
            )));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| AppError::Upstream(format!("Invalid WhatsApp response: {e}")))?;

        let message_id = body["messages"][0]["id"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        tracing::info!(message_id = %message_id, "whatsapp message sent");
        Ok(message_id)
    }
}

/// Strip everything but digits; the API expects the international number
/// without `+` or separators.
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_is_digits_only() {
        assert_eq!(normalize_phone("+34 (600) 123-456"), "34600123456");
    }

    #[test]
    fn payload_has_two_reply_buttons() {
        let payload = WhatsAppNotifier::payload(&YesNoMessage {
            phone: "+1 555 0100".to_string(),
            body: "Can you start Monday?".to_string(),
        });
        assert_eq!(payload["to"], "15550100");
        assert_eq!(
            payload["interactive"]["action"]["buttons"]
                .as_array()
                .map(Vec::len),
            Some(2)
        );
    }
}
