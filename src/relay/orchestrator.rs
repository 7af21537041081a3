//! Submission orchestrator.
//!
//! verify → normalize → resolve → identify → build → send → notify.
//! Everything before `send` fails fast with no side effects; the workflow
//! notification after it is advisory and cannot change the result.

use std::sync::Arc;

use serde_json::Value;

use super::identifier::{Identifier, IdentifierSource, SystemIdentifierSource};
use super::message::MessageBuilder;
use super::normalize::{Normalizer, RawPayload};
use super::recipient::RecipientResolver;
use crate::config::{LEGAL_TAG, RelayConfig};
use crate::error::{Error, SubmissionError};
use crate::gateways::{self, BotCheck, BotCheckVerdict, Delivery};
use crate::security::{SecurityEvent, log_security_event};
use crate::workflow::{KissflowClient, NotifierSettings, NotifyOutcome, WorkflowNotifier};

/// Code recorded when the bot-check provider could not be reached.
const BOT_CHECK_UNAVAILABLE: &str = "verification-unavailable";

/// A parsed inbound request.
#[derive(Debug, Clone, Default)]
pub struct SubmissionRequest {
    pub payload: RawPayload,
    pub client_ip: Option<String>,
}

/// What a successful submission hands back.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub identifier: Identifier,
    /// User-facing notice embedding the identifier.
    pub notice: String,
    pub message_id: Option<String>,
    /// Present when a workflow notification was attempted.
    pub workflow: Option<NotifyOutcome>,
}

/// Notice shown to the submitter after a successful send.
pub fn success_notice(identifier: &Identifier) -> String {
    format!(
        "Thank you! The relevant team was notified of your submission. \
         You could use a following identifier to refer to it in correspondence: {identifier}"
    )
}

/// Sequences one submission through every collaborator.
pub struct SubmissionService {
    normalizer: Normalizer,
    resolver: RecipientResolver,
    builder: MessageBuilder,
    ids: Arc<dyn IdentifierSource>,
    bot_check: Option<Arc<dyn BotCheck>>,
    delivery: Arc<dyn Delivery>,
    notifier: Option<Arc<WorkflowNotifier>>,
}

impl SubmissionService {
    pub fn new(
        normalizer: Normalizer,
        resolver: RecipientResolver,
        builder: MessageBuilder,
        delivery: Arc<dyn Delivery>,
    ) -> Self {
        Self {
            normalizer,
            resolver,
            builder,
            ids: Arc::new(SystemIdentifierSource),
            bot_check: None,
            delivery,
            notifier: None,
        }
    }

    pub fn with_bot_check(mut self, bot_check: Arc<dyn BotCheck>) -> Self {
        self.bot_check = Some(bot_check);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<WorkflowNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_identifier_source(mut self, ids: Arc<dyn IdentifierSource>) -> Self {
        self.ids = ids;
        self
    }

    /// Wire up real providers from configuration.
    pub fn from_config(config: &RelayConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| crate::error::ConfigError::InvalidValue {
                key: "RELAY_HTTP_TIMEOUT_SECS".into(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        let delivery = gateways::create_delivery(&config.mail, client.clone())?;
        let mut service = Self::new(
            Normalizer::new(config.submission.clone()),
            RecipientResolver::new(config.recipients.clone()),
            MessageBuilder::new(config.mail.from_address.clone()),
            delivery,
        );

        if let Some(bot) = &config.bot_check {
            service = service.with_bot_check(gateways::create_bot_check(bot, client.clone()));
        } else {
            tracing::warn!("Bot check disabled; submissions are not challenge-verified");
        }

        if let Some(workflow) = &config.workflow {
            let api = Arc::new(KissflowClient::new(workflow, client));
            let notifier = WorkflowNotifier::new(api, NotifierSettings::from(workflow));
            service = service.with_notifier(Arc::new(notifier));
            tracing::info!("Workflow notifier enabled");
        }

        Ok(service)
    }

    /// Process one submission end to end.
    pub async fn submit(&self, request: &SubmissionRequest) -> Result<Receipt, SubmissionError> {
        let client_ip = request.client_ip.as_deref();

        if let Some(bot) = &self.bot_check {
            self.verify_bot_check(bot.as_ref(), &request.payload, client_ip)
                .await?;
        }

        let submission = self.normalizer.normalize(&request.payload)?;

        let to = self.resolver.resolve(&submission.recipient).inspect_err(|_| {
            log_security_event(
                SecurityEvent::InvalidRecipient,
                &format!("recipient tag '{}'", submission.recipient),
                client_ip,
            );
        })?;

        let identifier = self.ids.next_identifier(&submission.recipient);
        let message = self.builder.build(
            &to,
            identifier.as_str(),
            &submission.message,
            &submission.attachments,
            submission.reference.as_deref(),
        );

        let receipt = match self.delivery.send(&message).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::error!(
                    provider = self.delivery.name(),
                    category = e.category(),
                    error = %e,
                    %identifier,
                    "Email delivery failed"
                );
                log_security_event(SecurityEvent::EmailSendFailed, e.category(), client_ip);
                return Err(SubmissionError::DeliveryFailed(e));
            }
        };

        tracing::info!(
            %identifier,
            recipient = %submission.recipient,
            attachments = message.attachments.len(),
            "Submission delivered"
        );

        let workflow = match (&self.notifier, submission.reference.as_deref()) {
            (Some(notifier), Some(reference)) if submission.recipient == LEGAL_TAG => {
                Some(notifier.notify(Some(reference), identifier.as_str()).await)
            }
            _ => None,
        };

        Ok(Receipt {
            notice: success_notice(&identifier),
            identifier,
            message_id: receipt.message_id,
            workflow,
        })
    }

    async fn verify_bot_check(
        &self,
        bot: &dyn BotCheck,
        payload: &RawPayload,
        client_ip: Option<&str>,
    ) -> Result<(), SubmissionError> {
        let Some(token) = payload
            .get(bot.token_field())
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
        else {
            log_security_event(SecurityEvent::BotCheckMissing, bot.name(), client_ip);
            return Err(SubmissionError::MissingBotCheckToken);
        };

        let codes = match bot.verify(token, client_ip).await {
            Ok(BotCheckVerdict::Passed) => return Ok(()),
            Ok(BotCheckVerdict::Failed { error_codes }) => error_codes,
            Err(e) => {
                tracing::error!(provider = bot.name(), error = %e, "Bot check provider unavailable");
                vec![BOT_CHECK_UNAVAILABLE.to_string()]
            }
        };

        log_security_event(
            SecurityEvent::BotCheckFailed,
            &format!("{}: {}", bot.name(), codes.join(",")),
            client_ip,
        );
        Err(SubmissionError::BotCheckFailed { codes })
    }
}
