//! Security event logging.
//!
//! Events go to the `security` tracing target so they can be filtered or
//! routed separately from application logs.

use std::fmt;

/// Security-relevant events worth a dedicated log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    BotCheckMissing,
    BotCheckFailed,
    InvalidRecipient,
    EmailSendFailed,
    RateLimited,
    OversizedRequest,
}

impl SecurityEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BotCheckMissing => "bot_check_missing",
            Self::BotCheckFailed => "bot_check_failed",
            Self::InvalidRecipient => "invalid_recipient",
            Self::EmailSendFailed => "email_send_failed",
            Self::RateLimited => "rate_limited",
            Self::OversizedRequest => "oversized_request",
        }
    }
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log a security event with the submitter's address.
pub fn log_security_event(event: SecurityEvent, details: &str, client_ip: Option<&str>) {
    tracing::warn!(
        target: "security",
        event = %event,
        client_ip = client_ip.unwrap_or("unknown"),
        details,
        "Security event"
    );
}
