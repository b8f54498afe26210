//! # sealmail-mime
//!
//! MIME parsing for decrypted message payloads.
//!
//! Once an encrypted MIME message has been decrypted, the plaintext is a full
//! MIME tree. This crate turns that tree into the pieces the rest of the
//! pipeline needs:
//!
//! - **Body**: the preferred displayable body (HTML over plain text) and its type
//! - **Attachments**: every non-body leaf, with filename, MIME type, content-id
//!   and decoded bytes, so inline images can later be matched by CID
//! - **Protected subject**: the subject carried inside an encrypted
//!   `text/rfc822-headers` part, for senders that encrypt the subject too
//!
//! ## Quick Start
//!
//! ```ignore
//! use sealmail_mime::extract;
//!
//! let content = extract(decrypted_bytes)?;
//! println!("{} ({})", content.body, content.mime_type);
//! for attachment in &content.attachments {
//!     println!("{} cid={:?}", attachment.filename, attachment.content_id);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod error;
mod extract;
mod header;
mod part;

pub mod encoding;

pub use content_type::{ContentDisposition, ContentType, DispositionKind};
pub use error::{Error, Result};
pub use extract::{BodyType, DecryptedContent, MimeAttachment, extract};
pub use header::Headers;
pub use part::{MAX_DEPTH, Part, TransferEncoding};
