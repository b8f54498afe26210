//! # sealmail-core
//!
//! Crypto pipeline for the `SealMail` client.
//!
//! This crate provides:
//! - **Decryption** of message bodies, legacy inline and full MIME
//! - **Signature verification** against pinned, published and attached keys
//! - **Attachment crypto** with split key and data packets
//! - **Attachment cache** with single-flight loading
//! - **Embedded images** resolved from `cid:` references to local URLs
//! - **Action queues** serializing work on each open message
//! - **Uploads** of new attachments into drafts
//!
//! The crypto primitives, the server transport and the key directory are
//! collaborators behind traits ([`CryptoProvider`], [`Transport`],
//! [`KeyDirectory`]).

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod attachment;
pub mod cache;
pub mod config;
pub mod crypto;
mod error;
pub mod keys;
pub mod model;
pub mod pipeline;
pub mod remote;
pub mod service;
pub mod session;

#[cfg(test)]
mod testing;

pub use attachment::{
    AttachmentCrypto, AttachmentError, AttachmentFile, AttachmentLoader, UploadError,
    ValidationError,
};
pub use cache::{AttachmentCache, BlobRegistry, CacheKey};
pub use config::Settings;
pub use crypto::{CryptoError, CryptoProvider, KeyId, PrivateKey, PublicKey};
pub use error::{Error, Result};
pub use keys::{KeyResolver, SendPreferences, send_preferences};
pub use model::{
    Attachment, AttachmentId, ErrorBag, ErrorKind, LocalId, Message, MessageError, Overlay,
    Plaintext, Verification, VerificationStatus, WireFormat,
};
pub use remote::{KeyDirectory, Notification, Notifier, Transport};
pub use service::{AttachmentAction, MessageProcessor, StepOutcome, UploadController};
pub use session::{ActionQueue, AddressKeys, MessageStore};
