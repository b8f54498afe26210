//! Domain models for messages and attachments.

mod attachment;
mod embedded;
mod errors;
mod message;
mod packets;
mod verification;

pub use attachment::{Attachment, AttachmentId, AttachmentSource};
pub use embedded::{EmbeddedInfo, EmbeddedMap, find_cid_references};
pub use errors::{ErrorBag, ErrorKind, MessageError};
pub use message::{LocalId, Message, Overlay, SignedPayload, WireFormat};
pub use packets::{EncryptedAttachment, Packets, Plaintext};
pub use verification::{Verification, VerificationStatus};
