//! Submission core: normalizing, addressing, building and dispatching a
//! secure form submission.

pub mod identifier;
pub mod message;
pub mod normalize;
pub mod orchestrator;
pub mod recipient;

pub use identifier::{FixedIdentifierSource, Identifier, IdentifierSource, SystemIdentifierSource};
pub use message::{MessageBuilder, OutboundAttachment, OutboundMessage};
pub use normalize::{AttachmentInput, Normalizer, RawPayload, Submission};
pub use orchestrator::{Receipt, SubmissionRequest, SubmissionService};
pub use recipient::RecipientResolver;
