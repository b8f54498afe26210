//! Signature verification state.

use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;

/// Outcome of signature verification for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VerificationStatus {
    /// Verification has not completed.
    #[default]
    Pending,
    /// The message carries no signature.
    NotSigned,
    /// Signed, but no candidate key matches the signer.
    NotVerified,
    /// Signed and verified by a candidate key.
    SignedAndValid,
    /// Signed by a candidate key, but the signature does not verify.
    SignedAndInvalid,
}

impl VerificationStatus {
    /// Whether this status describes a message whose signer was identified.
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::SignedAndValid | Self::SignedAndInvalid)
    }

    /// Get display name for the status.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::NotSigned => "Not signed",
            Self::NotVerified => "Not verified",
            Self::SignedAndValid => "Signed and valid",
            Self::SignedAndInvalid => "Signed and invalid",
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Verification status together with the keys it was computed from.
///
/// Always replaced as a whole so status and keys stay consistent.
#[derive(Debug, Clone, Default)]
pub struct Verification {
    status: VerificationStatus,
    signing_public_key: Option<PublicKey>,
    /// Keys the user pinned for the sender.
    pub sender_pinned_keys: Vec<PublicKey>,
    /// Keys the directory published for the sender.
    pub sender_api_keys: Vec<PublicKey>,
    /// Keys parsed from `.asc` attachments.
    pub attached_public_keys: Vec<PublicKey>,
    /// Whether the sender's contact signature was verified.
    pub sender_verified: Option<bool>,
}

impl Verification {
    /// Creates a result with no signing key.
    #[must_use]
    pub fn with_status(status: VerificationStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Creates a result, keeping `signing_key` only for signed statuses.
    #[must_use]
    pub fn new(status: VerificationStatus, signing_key: Option<PublicKey>) -> Self {
        Self {
            status,
            signing_public_key: signing_key.filter(|_| status.is_signed()),
            ..Self::default()
        }
    }

    /// Verification status.
    #[must_use]
    pub const fn status(&self) -> VerificationStatus {
        self.status
    }

    /// Key that produced the signature, for signed statuses.
    #[must_use]
    pub const fn signing_public_key(&self) -> Option<&PublicKey> {
        self.signing_public_key.as_ref()
    }
}
