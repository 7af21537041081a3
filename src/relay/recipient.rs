//! Recipient resolver: maps a submitter-chosen tag to a real mailbox.
//!
//! Only allow-listed tags resolve; this is what keeps the relay from being
//! used to mail arbitrary addresses.

use crate::config::{LEGAL_TAG, RecipientConfig};
use crate::error::SubmissionError;

#[derive(Debug, Clone)]
pub struct RecipientResolver {
    config: RecipientConfig,
}

impl RecipientResolver {
    pub fn new(config: RecipientConfig) -> Self {
        Self { config }
    }

    /// Check a tag against the allow-list.
    pub fn is_allowed(&self, tag: &str) -> bool {
        self.config.allowed.iter().any(|t| t == tag)
    }

    /// Resolve a tag to its mailbox address.
    pub fn resolve(&self, tag: &str) -> Result<String, SubmissionError> {
        if !self.is_allowed(tag) {
            return Err(SubmissionError::InvalidRecipient {
                tag: tag.to_string(),
            });
        }
        if tag == LEGAL_TAG {
            return Ok(self.config.legal_mailbox.clone());
        }
        Ok(format!("{tag}{}", self.config.email_domain))
    }
}

impl Default for RecipientResolver {
    fn default() -> Self {
        Self::new(RecipientConfig::default())
    }
}
