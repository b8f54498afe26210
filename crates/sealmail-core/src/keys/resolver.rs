//! Sender key resolution.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::attachment::AttachmentLoader;
use crate::crypto::{CryptoProvider, PrivateKey, PublicKey};
use crate::model::{Attachment, LocalId};
use crate::remote::{DirectoryError, KeyDirectory};

/// Keys known for a sender from the directory.
#[derive(Debug, Clone, Default)]
pub struct ResolvedKeys {
    /// Keys the user pinned for the sender.
    pub pinned: Vec<PublicKey>,
    /// Keys the directory published for the sender.
    pub api: Vec<PublicKey>,
    /// Whether the sender's contact signature was verified.
    pub sender_verified: Option<bool>,
    /// Non-fatal problems found while resolving.
    pub warnings: Vec<String>,
}

/// Finds the public keys that may have signed a message.
#[derive(Clone)]
pub struct KeyResolver {
    directory: Arc<dyn KeyDirectory>,
    crypto: Arc<dyn CryptoProvider>,
    large_key_size: u64,
}

impl KeyResolver {
    /// Creates a resolver. `.asc` attachments of `large_key_size` bytes or
    /// more are never parsed.
    #[must_use]
    pub fn new(
        directory: Arc<dyn KeyDirectory>,
        crypto: Arc<dyn CryptoProvider>,
        large_key_size: u64,
    ) -> Self {
        Self {
            directory,
            crypto,
            large_key_size,
        }
    }

    /// Looks up the sender in the directory.
    ///
    /// # Errors
    ///
    /// Returns the directory's error when the lookup fails.
    pub async fn resolve(&self, sender: &str) -> Result<ResolvedKeys, DirectoryError> {
        let prefs = self.directory.encryption_preferences(sender).await?;
        debug!(
            "Resolved {} pinned and {} directory keys for {}",
            prefs.pinned_keys.len(),
            prefs.api_keys.len(),
            sender
        );

        Ok(ResolvedKeys {
            pinned: prefs.pinned_keys,
            api: prefs.api_keys,
            sender_verified: prefs.is_contact_signature_verified,
            warnings: prefs.warnings,
        })
    }

    /// Attachments worth parsing as public keys.
    #[must_use]
    pub fn key_attachments<'a>(&self, attachments: &'a [Attachment]) -> Vec<&'a Attachment> {
        attachments
            .iter()
            .filter(|a| a.is_key_candidate(self.large_key_size))
            .collect()
    }

    /// Decrypts and parses every `.asc` attachment small enough to be a key.
    ///
    /// Attachments that fail to load or parse are skipped.
    pub async fn attached_keys(
        &self,
        loader: &AttachmentLoader,
        local_id: &LocalId,
        attachments: &[Attachment],
        private_keys: &[PrivateKey],
    ) -> Vec<PublicKey> {
        let candidates = self.key_attachments(attachments);
        if candidates.is_empty() {
            return Vec::new();
        }

        let loads = candidates.iter().map(|attachment| async move {
            let plaintext = match loader.load(local_id, attachment, private_keys).await {
                Ok(plaintext) => plaintext,
                Err(e) => {
                    warn!("Could not load key attachment {}: {}", attachment.name, e);
                    return None;
                }
            };
            match self.crypto.parse_public_key(&plaintext.data) {
                Ok(key) => Some(key),
                Err(e) => {
                    debug!("Attachment {} is not a public key: {}", attachment.name, e);
                    None
                }
            }
        });

        join_all(loads).await.into_iter().flatten().collect()
    }

    /// Verification candidates in priority order: pinned, directory, then
    /// attached. Duplicate key ids keep their first position.
    #[must_use]
    pub fn candidates(resolved: Option<&ResolvedKeys>, attached: &[PublicKey]) -> Vec<PublicKey> {
        let mut out: Vec<PublicKey> = Vec::new();
        let resolved_keys = resolved
            .into_iter()
            .flat_map(|r| r.pinned.iter().chain(r.api.iter()));

        for key in resolved_keys.chain(attached.iter()) {
            if !out.iter().any(|k| k.id() == key.id()) {
                out.push(key.clone());
            }
        }
        out
    }
}
