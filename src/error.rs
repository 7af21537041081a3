//! Error types for the secure form relay.

/// Startup errors: anything that stops the relay from being wired up.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Bad or missing fields in an inbound submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Message is required")]
    MissingMessage,

    #[error("Recipient is required")]
    MissingRecipient,

    #[error("Too many attachments: {count} > {max}")]
    TooManyAttachments { count: usize, max: usize },

    #[error("Malformed attachment entry at position {index}")]
    MalformedAttachment { index: usize },

    #[error("Field {field} must be a string")]
    InvalidField { field: String },
}

/// Errors surfaced by the submission orchestrator.
///
/// `Display` carries internal detail for logs; use
/// [`SubmissionError::user_message`] for anything returned to a client.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("Bot check token missing")]
    MissingBotCheckToken,

    #[error("Bot check failed: {codes:?}")]
    BotCheckFailed { codes: Vec<String> },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid recipient: {tag}")]
    InvalidRecipient { tag: String },

    #[error("Delivery failed: {0}")]
    DeliveryFailed(#[from] DeliveryError),
}

/// Generic message shown to the submitter for anything that must not leak.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "An unexpected error occurred while processing your submission. Please try again later.";

impl SubmissionError {
    /// Message that is safe to show to the submitter.
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingBotCheckToken => "Please complete the bot check before submitting.".into(),
            Self::BotCheckFailed { .. } => "Bot check verification failed.".into(),
            Self::Validation(e) => format!("Error: {e}"),
            Self::InvalidRecipient { .. } => "Error: Invalid recipient!".into(),
            Self::DeliveryFailed(_) => GENERIC_FAILURE_MESSAGE.into(),
        }
    }

    /// Whether the failure is a client-side protocol error rather than a
    /// business-rule rejection.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MissingBotCheckToken)
    }
}

/// Errors talking to a bot-check provider.
#[derive(Debug, thiserror::Error)]
pub enum BotCheckError {
    #[error("Bot check provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from bot check provider {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Outbound email delivery failures, grouped by cause category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("Message rejected by provider: {0}")]
    Rejected(String),

    #[error("Sender address or domain not verified: {0}")]
    UnverifiedSender(String),

    #[error("Delivery misconfigured: {0}")]
    Configuration(String),

    #[error("Transport failure: {0}")]
    Transport(String),
}

impl DeliveryError {
    /// Short category label used in logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Rejected(_) => "rejected_message",
            Self::UnverifiedSender(_) => "unverified_sender",
            Self::Configuration(_) => "configuration_error",
            Self::Transport(_) => "transport_error",
        }
    }
}

/// Workflow API errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Workflow request failed: {0}")]
    Http(String),

    #[error("Workflow API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid workflow response: {0}")]
    InvalidResponse(String),

    #[error("Workflow item {0} has no id")]
    MissingItemId(usize),
}
