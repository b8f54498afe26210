//! Signature verification against candidate keys.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::crypto::{CryptoProvider, PublicKey};
use crate::model::{MessageError, SignedPayload, VerificationStatus};

/// Result of [`Verifier::verify`].
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    /// Computed status.
    pub status: VerificationStatus,
    /// Key that produced the signature, for signed statuses.
    pub signing_key: Option<PublicKey>,
    /// Errors raised while checking.
    pub errors: Vec<MessageError>,
}

impl VerificationOutcome {
    fn status(status: VerificationStatus) -> Self {
        Self {
            status,
            signing_key: None,
            errors: Vec::new(),
        }
    }
}

/// Checks a message signature against candidate keys.
#[derive(Clone)]
pub struct Verifier {
    crypto: Arc<dyn CryptoProvider>,
}

impl Verifier {
    /// Creates a verifier over `crypto`.
    #[must_use]
    pub fn new(crypto: Arc<dyn CryptoProvider>) -> Self {
        Self { crypto }
    }

    /// Verifies `signed` against `candidates` in order.
    ///
    /// An unsigned message is `NotSigned` without any crypto call. Only
    /// candidates whose id matches the signature's issuer are tried; the
    /// first one that verifies wins. A matching key that does not verify
    /// gives `SignedAndInvalid`; no matching key gives `NotVerified`.
    pub async fn verify(
        &self,
        signed: Option<&SignedPayload>,
        date: DateTime<Utc>,
        candidates: &[PublicKey],
    ) -> VerificationOutcome {
        let Some(signed) = signed else {
            return VerificationOutcome::status(VerificationStatus::NotSigned);
        };

        let issuer = signed.signature.issuer();
        let mut errors = Vec::new();
        let mut first_match: Option<&PublicKey> = None;

        for key in candidates.iter().filter(|k| k.id() == issuer) {
            first_match.get_or_insert(key);
            match self
                .crypto
                .verify_detached(&signed.content, &signed.signature, key, date)
                .await
            {
                Ok(true) => {
                    debug!("Signature verified with key {}", key.id());
                    return VerificationOutcome {
                        status: VerificationStatus::SignedAndValid,
                        signing_key: Some(key.clone()),
                        errors,
                    };
                }
                Ok(false) => debug!("Signature does not verify with key {}", key.id()),
                Err(e) => {
                    warn!("Signature check with key {} failed: {}", key.id(), e);
                    errors.push(MessageError::Verification(e.to_string()));
                }
            }
        }

        match first_match {
            Some(key) => VerificationOutcome {
                status: VerificationStatus::SignedAndInvalid,
                signing_key: Some(key.clone()),
                errors,
            },
            None => {
                debug!("No candidate key matches signer {}", issuer);
                VerificationOutcome {
                    status: VerificationStatus::NotVerified,
                    signing_key: None,
                    errors,
                }
            }
        }
    }
}
