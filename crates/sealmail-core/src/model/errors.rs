//! Per-message error bag.

use thiserror::Error;

/// Category of a recorded message error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport failure.
    Network,
    /// Body could not be decrypted.
    Decryption,
    /// Signature check raised an error.
    Verification,
    /// Sender key lookup failed.
    KeyFetch,
    /// Anything else.
    Common,
}

/// An error recorded against a message while processing it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// Transport failure.
    #[error("Network error: {0}")]
    Network(String),
    /// Body could not be decrypted.
    #[error("Decryption error: {0}")]
    Decryption(String),
    /// Signature check raised an error.
    #[error("Verification error: {0}")]
    Verification(String),
    /// Sender key lookup failed.
    #[error("Key lookup error: {0}")]
    KeyFetch(String),
    /// Anything else.
    #[error("{0}")]
    Common(String),
}

impl MessageError {
    /// Category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Decryption(_) => ErrorKind::Decryption,
            Self::Verification(_) => ErrorKind::Verification,
            Self::KeyFetch(_) => ErrorKind::KeyFetch,
            Self::Common(_) => ErrorKind::Common,
        }
    }
}

/// Errors recorded against one message, in the order they occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorBag {
    entries: Vec<MessageError>,
}

impl ErrorBag {
    /// Records an error.
    pub fn push(&mut self, error: MessageError) {
        self.entries.push(error);
    }

    /// Errors of one kind.
    pub fn of_kind(&self, kind: ErrorKind) -> impl Iterator<Item = &MessageError> {
        self.entries.iter().filter(move |e| e.kind() == kind)
    }

    /// Number of errors of one kind.
    #[must_use]
    pub fn count(&self, kind: ErrorKind) -> usize {
        self.of_kind(kind).count()
    }

    /// Whether an error of this kind was recorded.
    #[must_use]
    pub fn has(&self, kind: ErrorKind) -> bool {
        self.entries.iter().any(|e| e.kind() == kind)
    }

    /// Drops all errors of the given kinds.
    pub fn clear_kinds(&mut self, kinds: &[ErrorKind]) {
        self.entries.retain(|e| !kinds.contains(&e.kind()));
    }

    /// All errors.
    pub fn iter(&self) -> impl Iterator<Item = &MessageError> {
        self.entries.iter()
    }

    /// Total number of errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no errors were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
