//! Message builder: transport-agnostic outbound email.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;

use super::normalize::AttachmentInput;

/// MIME type every attachment is labelled with.
///
/// Content is encrypted in the browser; the relay does not verify that.
pub const ATTACHMENT_MIME_TYPE: &str = "application/pgp-encrypted";

/// Suffix appended to every attachment filename.
pub const ATTACHMENT_SUFFIX: &str = ".pgp";

const SUBJECT_PREFIX: &str = "Secure Form Submission";

/// A single encoded attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundAttachment {
    pub filename: String,
    pub mime_type: String,
    pub content_base64: String,
}

/// A fully built email, ready for any delivery gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<OutboundAttachment>,
}

/// Builds outbound messages from a fixed sender address.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    from: String,
}

impl MessageBuilder {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }

    /// Assemble the outbound message. Attachments keep their input order.
    pub fn build(
        &self,
        to: &str,
        identifier: &str,
        text: &str,
        attachments: &[AttachmentInput],
        reference: Option<&str>,
    ) -> OutboundMessage {
        OutboundMessage {
            from: self.from.clone(),
            to: to.to_string(),
            subject: subject_line(identifier, reference),
            body: text.replace("<br />", "\n"),
            attachments: attachments.iter().map(encode_attachment).collect(),
        }
    }
}

/// `"[{reference} ]Secure Form Submission {identifier}"`
pub fn subject_line(identifier: &str, reference: Option<&str>) -> String {
    match reference.filter(|r| !r.is_empty()) {
        Some(reference) => format!("{reference} {SUBJECT_PREFIX} {identifier}"),
        None => format!("{SUBJECT_PREFIX} {identifier}"),
    }
}

fn encode_attachment(input: &AttachmentInput) -> OutboundAttachment {
    OutboundAttachment {
        filename: format!("{}{ATTACHMENT_SUFFIX}", input.filename),
        mime_type: ATTACHMENT_MIME_TYPE.to_string(),
        content_base64: BASE64.encode(input.content.as_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> MessageBuilder {
        MessageBuilder::new("noreply@example.org")
    }

    #[test]
    fn builds_documented_example() {
        let msg = builder().build(
            "someone@somewhere.org",
            "just:some:identifier",
            "encrypted_blablabla",
            &[AttachmentInput::new("myfile.txt", "encrypted_file_content")],
            None,
        );

        assert_eq!(msg.from, "noreply@example.org");
        assert_eq!(msg.to, "someone@somewhere.org");
        assert_eq!(msg.subject, "Secure Form Submission just:some:identifier");
        assert_eq!(msg.body, "encrypted_blablabla");
        assert_eq!(msg.attachments.len(), 1);

        let a = &msg.attachments[0];
        assert_eq!(a.filename, "myfile.txt.pgp");
        assert_eq!(a.mime_type, "application/pgp-encrypted");
        assert_eq!(a.content_base64, "ZW5jcnlwdGVkX2ZpbGVfY29udGVudA==");
    }

    #[test]
    fn subject_uses_literal_identifier() {
        assert_eq!(
            subject_line("just:some:identifier", None),
            "Secure Form Submission just:some:identifier"
        );
    }

    #[test]
    fn reference_prefixes_subject() {
        assert_eq!(
            subject_line("legal:2025:01:15:14:30:45:1234", Some("FY24-017")),
            "FY24-017 Secure Form Submission legal:2025:01:15:14:30:45:1234"
        );
        assert_eq!(
            subject_line("x", Some("")),
            "Secure Form Submission x"
        );
    }

    #[test]
    fn br_markers_become_newlines() {
        let msg = builder().build(
            "a@b.c",
            "t:2023:01:01:12:00:00:1000",
            "line one<br />line two<br />",
            &[],
            None,
        );
        assert_eq!(msg.body, "line one\nline two\n");
    }

    #[test]
    fn body_is_otherwise_untouched() {
        let text = "-----BEGIN PGP MESSAGE-----\n<b>not html</b>\n";
        let msg = builder().build("a@b.c", "t:2023:01:01:12:00:00:1000", text, &[], None);
        assert_eq!(msg.body, text);
    }

    #[test]
    fn attachments_keep_input_order() {
        let msg = builder().build(
            "a@b.c",
            "t:2023:01:01:12:00:00:1000",
            "m",
            &[
                AttachmentInput::new("first.txt", "1"),
                AttachmentInput::new("second.txt", "2"),
            ],
            None,
        );
        let names: Vec<_> = msg.attachments.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, vec!["first.txt.pgp", "second.txt.pgp"]);
    }

    #[test]
    fn building_twice_is_identical() {
        let id = "devcon:2023:01:01:12:00:00:1234";
        let attachments = [AttachmentInput::new("a.bin", "payload")];
        let first = builder().build("a@b.c", id, "text<br />", &attachments, Some("REF"));
        let second = builder().build("a@b.c", id, "text<br />", &attachments, Some("REF"));
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }
}
