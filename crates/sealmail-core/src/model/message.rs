//! Message wire record and its processing overlay.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attachment::Attachment;
use super::embedded::EmbeddedMap;
use super::errors::{ErrorBag, ErrorKind, MessageError};
use super::verification::{Verification, VerificationStatus};
use crate::crypto::Signature;

/// Session-local message identifier.
///
/// Stable for the lifetime of the session, even for drafts that have no
/// server id yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(String);

impl LocalId {
    /// Creates a local id from an existing value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random local id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LocalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the message body is encrypted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WireFormat {
    /// The body decrypts to a full MIME tree.
    Mime,
    /// The body decrypts directly to the display text.
    #[default]
    Legacy,
}

/// Message as received from the server.
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// Server id, absent for unsaved drafts.
    pub id: Option<String>,
    /// Sender address.
    pub sender: String,
    /// Encrypted body.
    pub body: Bytes,
    /// Wire format of `body`.
    pub format: WireFormat,
    /// Declared MIME type of the decrypted body.
    pub mime_type: String,
    /// Message date.
    pub date: DateTime<Utc>,
    /// Cleartext subject.
    pub subject: String,
    /// Whether the sender asked for the message to be signed.
    pub sign: bool,
    /// Attachment metadata.
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Domain part of the sender address, if any.
    #[must_use]
    pub fn sender_domain(&self) -> Option<&str> {
        self.sender
            .rsplit_once('@')
            .map(|(_, domain)| domain.trim_end_matches('>'))
            .filter(|domain| !domain.is_empty())
    }

    /// Sum of all attachment sizes in bytes.
    #[must_use]
    pub fn attachments_size(&self) -> u64 {
        self.attachments.iter().map(|a| a.size).sum()
    }
}

/// Detached signature plus the exact bytes it covers.
#[derive(Debug, Clone)]
pub struct SignedPayload {
    /// The signature.
    pub signature: Signature,
    /// The signed content.
    pub content: Bytes,
}

/// Mutable state accumulated while processing a message.
#[derive(Debug, Clone, Default)]
pub struct Overlay {
    /// Decrypted display body. Empty after a failed decryption.
    pub decrypted_body: Option<String>,
    /// MIME type of `decrypted_body`.
    pub decrypted_mime_type: Option<String>,
    /// Subject protected inside the encrypted payload.
    pub decrypted_subject: Option<String>,
    /// Signature found during decryption.
    pub signature: Option<SignedPayload>,
    /// Verification result.
    pub verification: Verification,
    /// Errors recorded while processing.
    pub errors: ErrorBag,
    /// Resolved inline images by content id.
    pub embeddeds: EmbeddedMap,
    /// Per-message override of the embedded-images setting.
    pub show_embedded_images: Option<bool>,
    /// Per-message override of the remote-images setting.
    pub show_remote_images: Option<bool>,
    /// Whether decryption has run for this message.
    pub initialized: bool,
}

impl Overlay {
    /// Records a successful decryption.
    pub fn apply_decryption(
        &mut self,
        body: String,
        mime_type: String,
        subject: Option<String>,
        signature: Option<SignedPayload>,
    ) {
        self.decrypted_body = Some(body);
        self.decrypted_mime_type = Some(mime_type);
        self.decrypted_subject = subject;
        self.signature = signature;
        self.errors.clear_kinds(&[ErrorKind::Decryption]);
        self.initialized = true;
    }

    /// Records a failed decryption: empty body, no signature, one error,
    /// and a `NotVerified` status.
    pub fn apply_decryption_failure(&mut self, error: MessageError) {
        self.decrypted_body = Some(String::new());
        self.decrypted_mime_type = None;
        self.decrypted_subject = None;
        self.signature = None;
        self.verification = Verification::with_status(VerificationStatus::NotVerified);
        self.errors.clear_kinds(&[ErrorKind::Decryption]);
        self.errors.push(error);
        self.initialized = true;
    }

    /// Whether the last decryption attempt failed.
    #[must_use]
    pub fn decryption_failed(&self) -> bool {
        self.errors.has(ErrorKind::Decryption)
    }

    /// Replaces the verification result and its errors in one step.
    ///
    /// Returns `false` and leaves the overlay untouched when no body has
    /// been decrypted yet.
    pub fn apply_verification(
        &mut self,
        verification: Verification,
        errors: Vec<MessageError>,
    ) -> bool {
        if self.decrypted_body.is_none() {
            return false;
        }

        self.verification = verification;
        self.errors
            .clear_kinds(&[ErrorKind::Verification, ErrorKind::KeyFetch]);
        for error in errors {
            self.errors.push(error);
        }
        true
    }

    /// Whether embedded images should be resolved, given the user default.
    #[must_use]
    pub fn shows_embedded_images(&self, default: bool) -> bool {
        self.show_embedded_images.unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_domain() {
        let message = Message {
            sender: "alice@example.com".to_string(),
            ..Message::default()
        };
        assert_eq!(message.sender_domain(), Some("example.com"));

        let bare = Message {
            sender: "nobody".to_string(),
            ..Message::default()
        };
        assert_eq!(bare.sender_domain(), None);
    }

    #[test]
    fn test_verification_requires_body() {
        let mut overlay = Overlay::default();
        let applied = overlay.apply_verification(
            Verification::with_status(VerificationStatus::NotSigned),
            Vec::new(),
        );
        assert!(!applied);
        assert_eq!(overlay.verification.status(), VerificationStatus::Pending);
    }

    #[test]
    fn test_decryption_failure_shape() {
        let mut overlay = Overlay::default();
        overlay.apply_decryption_failure(MessageError::Decryption("bad".into()));

        assert_eq!(overlay.decrypted_body.as_deref(), Some(""));
        assert_eq!(
            overlay.verification.status(),
            VerificationStatus::NotVerified
        );
        assert_eq!(overlay.errors.count(ErrorKind::Decryption), 1);
        assert!(overlay.decryption_failed());
    }

    #[test]
    fn test_verification_replaces_previous_errors() {
        let mut overlay = Overlay::default();
        overlay.apply_decryption("hi".into(), "text/plain".into(), None, None);
        overlay.apply_verification(
            Verification::with_status(VerificationStatus::Pending),
            vec![MessageError::KeyFetch("offline".into())],
        );
        overlay.apply_verification(
            Verification::with_status(VerificationStatus::NotSigned),
            Vec::new(),
        );

        assert!(overlay.errors.is_empty());
        assert_eq!(overlay.verification.status(), VerificationStatus::NotSigned);
    }
}
