//! Error types for key handling and packet codecs.

use sealmail_core::CryptoError;
use thiserror::Error;

/// Errors from key parsing and packet encoding.
#[derive(Debug, Error)]
pub enum Error {
    /// Armored text is not in the expected shape.
    #[error("Armor error: {0}")]
    Armor(String),

    /// Armor body is not valid base64.
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Key material has the wrong size.
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    KeyLength {
        /// Required length.
        expected: usize,
        /// Length found.
        actual: usize,
    },

    /// Ed25519 key or signature rejected.
    #[error("Signature error: {0}")]
    Signature(#[from] ed25519_dalek::SignatureError),

    /// Packet framing is broken.
    #[error("Packet error: {0}")]
    Packet(String),

    /// Authenticated encryption failed to open or seal.
    #[error("authentication failed")]
    Aead,

    /// No key packet is addressed to any supplied private key.
    #[error("no matching private key")]
    NoMatchingKey,
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for CryptoError {
    fn from(e: Error) -> Self {
        match e {
            Error::NoMatchingKey => Self::NoMatchingKey,
            Error::Aead => Self::Decrypt(e.to_string()),
            Error::Armor(_) | Error::Base64(_) | Error::KeyLength { .. } | Error::Signature(_) => {
                Self::InvalidKey(e.to_string())
            }
            Error::Packet(_) => Self::Malformed(e.to_string()),
        }
    }
}
