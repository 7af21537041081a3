//! External collaborators: bot-check verification and email delivery.
//!
//! The orchestrator only sees the two traits below; concrete providers are
//! picked from configuration at startup.

pub mod bot_check;
pub mod sendgrid;
pub mod smtp;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{BotCheckConfig, MailBackend, MailConfig};
use crate::error::{BotCheckError, DeliveryError};
use crate::relay::OutboundMessage;

pub use bot_check::SiteVerifyBotCheck;
pub use sendgrid::SendGridDelivery;
pub use smtp::SmtpDelivery;

/// Outcome of a bot-check verification.
#[derive(Debug, Clone, PartialEq)]
pub enum BotCheckVerdict {
    Passed,
    Failed { error_codes: Vec<String> },
}

/// Verifies a browser-supplied challenge token.
#[async_trait]
pub trait BotCheck: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Payload field that carries the token.
    fn token_field(&self) -> &str;

    /// Verify a token with the provider.
    async fn verify(
        &self,
        token: &str,
        remote_ip: Option<&str>,
    ) -> Result<BotCheckVerdict, BotCheckError>;
}

/// Receipt for an accepted message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Provider message id, when the provider returns one.
    pub message_id: Option<String>,
}

/// Sends a built message through an email provider. Never retries.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Create the bot-check gateway from configuration.
pub fn create_bot_check(
    config: &BotCheckConfig,
    client: reqwest::Client,
) -> Arc<dyn BotCheck> {
    tracing::info!(provider = config.provider.name(), "Bot check enabled");
    Arc::new(SiteVerifyBotCheck::new(config, client))
}

/// Create the delivery gateway from configuration.
pub fn create_delivery(
    config: &MailConfig,
    client: reqwest::Client,
) -> Result<Arc<dyn Delivery>, DeliveryError> {
    match &config.backend {
        MailBackend::Smtp {
            host,
            port,
            username,
            password,
        } => {
            tracing::info!(host = %host, port, "Using SMTP delivery");
            Ok(Arc::new(SmtpDelivery::new(
                host,
                *port,
                username.clone(),
                password.clone(),
            )?))
        }
        MailBackend::SendGrid { api_key, api_url } => {
            tracing::info!("Using SendGrid delivery");
            Ok(Arc::new(SendGridDelivery::new(
                api_key.clone(),
                api_url.clone(),
                client,
            )))
        }
    }
}
