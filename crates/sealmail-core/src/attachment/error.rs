//! Attachment error types.

use thiserror::Error;

use crate::remote::TransportError;

/// Pre-flight validation failure for attachment operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// No file was supplied.
    NoFile,
    /// The message's attachments would exceed the size ceiling.
    SizeExceeded {
        /// Ceiling in bytes.
        limit: u64,
    },
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::NoFile => "No file provided",
            Self::SizeExceeded { .. } => "Attachments exceed the size limit",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Errors from attachment encryption, decryption and loading.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttachmentError {
    /// Input rejected before any crypto ran.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Encryption failed.
    #[error("failed to encrypt attachment: {0}")]
    EncryptFailed(String),

    /// None of the private keys opens the key packets.
    #[error("no private key matches the attachment")]
    NoMatchingKey,

    /// The key packets could not be processed.
    #[error("invalid key packet: {0}")]
    KeyPacket(String),

    /// The session key was recovered but the data packet did not decrypt.
    #[error("attachment data is corrupted: {0}")]
    CorruptedData(String),

    /// The attachment record has no key packets.
    #[error("attachment has no key packets")]
    MissingKeyPackets,

    /// Plaintext for an extracted attachment is no longer available.
    #[error("attachment content is not available")]
    Unavailable,

    /// Fetching the encrypted bytes failed.
    #[error("attachment download failed: {0}")]
    Transport(#[from] TransportError),
}

/// Errors from uploading an attachment.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    /// Input rejected before any work started.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Encryption failed.
    #[error("{0}")]
    Attachment(#[from] AttachmentError),

    /// The server rejected or lost the upload.
    #[error("upload failed: {0}")]
    Transport(#[from] TransportError),

    /// The user cancelled the upload.
    #[error("upload aborted")]
    Aborted,

    /// The message was closed while the upload ran.
    #[error("message is no longer open")]
    MessageClosed,
}

impl UploadError {
    /// Whether this outcome should be reported to the user.
    #[must_use]
    pub const fn is_silent(&self) -> bool {
        matches!(self, Self::Aborted | Self::MessageClosed)
    }
}
