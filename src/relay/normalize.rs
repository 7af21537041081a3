//! Form/request normalizer: untrusted payload → [`Submission`].
//!
//! The front-end posts JSON with a structured `files` list, while plain
//! HTML forms post `filename-N` / `attachment-N` pairs. Both arrive here as
//! a flat JSON object.

use serde_json::{Map, Value};

use crate::config::SubmissionPolicy;
use crate::error::ValidationError;

/// Decoded request body, before any validation.
pub type RawPayload = Map<String, Value>;

/// Fallback used when a filename sanitizes down to nothing.
pub const FALLBACK_FILENAME: &str = "attachment";

/// One attachment as posted by the browser (already client-side encrypted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentInput {
    pub filename: String,
    pub content: String,
}

impl AttachmentInput {
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

/// A validated, sanitized submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub message: String,
    pub recipient: String,
    pub reference: Option<String>,
    pub attachments: Vec<AttachmentInput>,
}

/// Turns raw payloads into submissions under a fixed policy.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    policy: SubmissionPolicy,
}

impl Normalizer {
    pub fn new(policy: SubmissionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SubmissionPolicy {
        &self.policy
    }

    /// Extract and sanitize a submission from a raw payload.
    pub fn normalize(&self, raw: &RawPayload) -> Result<Submission, ValidationError> {
        let message = string_field(raw, "message")?.unwrap_or_default();
        if self.policy.require_message && message.trim().is_empty() {
            return Err(ValidationError::MissingMessage);
        }

        let recipient = string_field(raw, "recipient")?
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .ok_or(ValidationError::MissingRecipient)?;

        let reference = reference_field(raw)?;

        let attachments = match raw.get("files") {
            Some(Value::Array(items)) => self.structured_attachments(items)?,
            Some(Value::Null) | None => self.indexed_attachments(raw)?,
            Some(_) => {
                return Err(ValidationError::InvalidField {
                    field: "files".into(),
                });
            }
        };

        Ok(Submission {
            message,
            recipient,
            reference,
            attachments,
        })
    }

    /// `files: [{filename, attachment}, ...]`
    fn structured_attachments(&self, items: &[Value]) -> Result<Vec<AttachmentInput>, ValidationError> {
        if items.len() > self.policy.max_attachments {
            return Err(ValidationError::TooManyAttachments {
                count: items.len(),
                max: self.policy.max_attachments,
            });
        }

        let mut attachments = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let (Some(filename), Some(content)) = (
                item.get("filename").and_then(Value::as_str),
                item.get("attachment").and_then(Value::as_str),
            ) else {
                return Err(ValidationError::MalformedAttachment { index });
            };
            if content.is_empty() {
                continue;
            }
            attachments.push(AttachmentInput::new(sanitize_filename(filename), content));
        }
        Ok(attachments)
    }

    /// `filename-0`, `attachment-0`, ... up to the configured maximum.
    fn indexed_attachments(&self, raw: &RawPayload) -> Result<Vec<AttachmentInput>, ValidationError> {
        let mut attachments = Vec::new();
        for index in 0..self.policy.max_attachments {
            let Some(content) = string_field(raw, &format!("attachment-{index}"))? else {
                continue;
            };
            if content.is_empty() {
                continue;
            }
            let filename = string_field(raw, &format!("filename-{index}"))?.unwrap_or_default();
            attachments.push(AttachmentInput::new(sanitize_filename(&filename), content));
        }
        Ok(attachments)
    }
}

/// Make an untrusted filename safe to use as a mail attachment name.
///
/// Non-ASCII and control characters are dropped (not escaped), path
/// separators are removed, and `..` is stripped until none is left so that
/// removals cannot splice a new `..` together.
pub fn sanitize_filename(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control() && *c != '/' && *c != '\\')
        .collect();
    while name.contains("..") {
        name = name.replace("..", "");
    }
    let name = name.trim().to_string();
    if name.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        name
    }
}

fn string_field(raw: &RawPayload, field: &str) -> Result<Option<String>, ValidationError> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ValidationError::InvalidField {
            field: field.to_string(),
        }),
    }
}

fn reference_field(raw: &RawPayload) -> Result<Option<String>, ValidationError> {
    let reference = match raw.get("reference") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(_) => {
            return Err(ValidationError::InvalidField {
                field: "reference".into(),
            });
        }
    };
    Ok(Some(reference).filter(|r| !r.is_empty()))
}
