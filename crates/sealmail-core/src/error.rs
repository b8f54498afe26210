//! Error types for the core library.

use thiserror::Error;

use crate::attachment::{AttachmentError, UploadError, ValidationError};
use crate::crypto::CryptoError;
use crate::remote::{DirectoryError, TransportError};
use crate::session::QueueError;

/// Errors that can occur in core operations.
///
/// Per-message processing failures are not reported through this type;
/// they are recorded in the message's [`ErrorBag`](crate::ErrorBag).
#[derive(Debug, Error)]
pub enum Error {
    /// Cryptographic primitive failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Transport collaborator failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Key directory lookup failed.
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// Pre-flight validation rejected the request.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Attachment encryption or decryption failed.
    #[error("Attachment error: {0}")]
    Attachment(#[from] AttachmentError),

    /// Attachment upload failed.
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// The message's action queue was disposed.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// No message with this local id is loaded in the session.
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
