//! SendGrid v3 delivery (`POST /v3/mail/send`).

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use super::{Delivery, DeliveryReceipt};
use crate::error::DeliveryError;
use crate::relay::OutboundMessage;

/// SendGrid delivery gateway.
pub struct SendGridDelivery {
    api_key: SecretString,
    api_url: String,
    client: reqwest::Client,
}

impl SendGridDelivery {
    pub fn new(api_key: SecretString, api_url: String, client: reqwest::Client) -> Self {
        Self {
            api_key,
            api_url,
            client,
        }
    }
}

/// Request body for the mail/send endpoint.
pub fn mail_send_body(message: &OutboundMessage) -> serde_json::Value {
    let attachments: Vec<_> = message
        .attachments
        .iter()
        .map(|a| {
            json!({
                "content": a.content_base64,
                "filename": a.filename,
                "type": a.mime_type,
                "disposition": "attachment",
            })
        })
        .collect();

    let mut body = json!({
        "personalizations": [{"to": [{"email": message.to}]}],
        "from": {"email": message.from},
        "subject": message.subject,
        "content": [{"type": "text/plain", "value": message.body}],
    });
    if !attachments.is_empty() {
        body["attachments"] = serde_json::Value::Array(attachments);
    }
    body
}

/// Map a non-success SendGrid reply to a failure category.
pub fn classify_status(status: StatusCode, body: &str) -> DeliveryError {
    let detail = format!("SendGrid returned {status}: {body}");
    match status {
        StatusCode::UNAUTHORIZED => DeliveryError::Configuration(detail),
        StatusCode::FORBIDDEN if body.to_ascii_lowercase().contains("sender identity") => {
            DeliveryError::UnverifiedSender(detail)
        }
        StatusCode::FORBIDDEN => DeliveryError::Configuration(detail),
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE => DeliveryError::Rejected(detail),
        _ => DeliveryError::Transport(detail),
    }
}

#[async_trait]
impl Delivery for SendGridDelivery {
    fn name(&self) -> &str {
        "sendgrid"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, DeliveryError> {
        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&mail_send_body(message))
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let message_id = resp
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        tracing::info!(to = %message.to, message_id = ?message_id, "Email accepted by SendGrid");
        Ok(DeliveryReceipt { message_id })
    }
}
