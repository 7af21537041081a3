//! SMTP delivery via lettre.
//!
//! The transport is blocking, so each send runs on the blocking pool.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use super::{Delivery, DeliveryReceipt};
use crate::error::DeliveryError;
use crate::relay::OutboundMessage;

/// SMTP delivery gateway.
pub struct SmtpDelivery {
    transport: SmtpTransport,
}

impl SmtpDelivery {
    pub fn new(
        host: &str,
        port: u16,
        username: String,
        password: SecretString,
    ) -> Result<Self, DeliveryError> {
        let mut builder = SmtpTransport::starttls_relay(host)
            .map_err(|e| DeliveryError::Configuration(format!("SMTP relay error: {e}")))?
            .port(port);
        if !username.is_empty() {
            builder = builder.credentials(Credentials::new(
                username,
                password.expose_secret().to_string(),
            ));
        }
        Ok(Self {
            transport: builder.build(),
        })
    }
}

/// Convert an outbound message into a lettre `Message`.
pub fn to_lettre_message(message: &OutboundMessage) -> Result<Message, DeliveryError> {
    let from: Mailbox = message
        .from
        .parse()
        .map_err(|e| DeliveryError::Configuration(format!("Invalid from address: {e}")))?;
    let to: Mailbox = message
        .to
        .parse()
        .map_err(|e| DeliveryError::Configuration(format!("Invalid to address: {e}")))?;

    let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(message.body.clone()));
    for attachment in &message.attachments {
        let content = BASE64
            .decode(&attachment.content_base64)
            .map_err(|e| DeliveryError::Rejected(format!("Attachment not base64: {e}")))?;
        let content_type = ContentType::parse(&attachment.mime_type).map_err(|e| {
            DeliveryError::Rejected(format!("Invalid MIME type {}: {e}", attachment.mime_type))
        })?;
        parts = parts
            .singlepart(Attachment::new(attachment.filename.clone()).body(content, content_type));
    }

    Message::builder()
        .from(from)
        .to(to)
        .subject(message.subject.clone())
        .multipart(parts)
        .map_err(|e| DeliveryError::Rejected(format!("Failed to build email: {e}")))
}

fn classify(err: &lettre::transport::smtp::Error) -> DeliveryError {
    categorize(err.is_permanent(), err.is_client(), err.to_string())
}

/// 5xx replies are rejections, client-side failures (TLS, auth setup) are
/// misconfiguration, everything else is a transport problem.
fn categorize(permanent: bool, client: bool, detail: String) -> DeliveryError {
    if permanent {
        DeliveryError::Rejected(detail)
    } else if client {
        DeliveryError::Configuration(detail)
    } else {
        DeliveryError::Transport(detail)
    }
}

#[async_trait]
impl Delivery for SmtpDelivery {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, DeliveryError> {
        let email = to_lettre_message(message)?;
        let transport = self.transport.clone();

        let response = tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| DeliveryError::Transport(format!("SMTP send task panicked: {e}")))?
            .map_err(|e| classify(&e))?;

        // The SMTP reply ("2.0.0 Ok: queued as ...") carries no Message-ID.
        tracing::info!(
            to = %message.to,
            smtp_reply = response.first_line().unwrap_or_default(),
            "Email sent via SMTP"
        );
        Ok(DeliveryReceipt::default())
    }
}
