//! Public key directory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::PublicKey;

/// Errors reported by a [`KeyDirectory`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    /// The directory could not be reached.
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    /// The directory returned an invalid key.
    #[error("invalid key for {address}: {reason}")]
    InvalidKey {
        /// Looked-up address.
        address: String,
        /// Why the key was rejected.
        reason: String,
    },
}

/// PGP packaging scheme for outgoing mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PgpScheme {
    /// PGP/MIME.
    #[default]
    PgpMime,
    /// Inline PGP.
    PgpInline,
}

/// Everything known about how to encrypt to and verify an address.
#[derive(Debug, Clone, Default)]
pub struct EncryptionPreferences {
    /// Keys the user pinned for this address.
    pub pinned_keys: Vec<PublicKey>,
    /// Keys published by the directory.
    pub api_keys: Vec<PublicKey>,
    /// Whether the contact card signature was verified.
    pub is_contact_signature_verified: Option<bool>,
    /// Whether mail to this address should be encrypted.
    pub encrypt: bool,
    /// Whether mail to this address should be signed.
    pub sign: bool,
    /// Preferred packaging scheme.
    pub scheme: Option<PgpScheme>,
    /// Preferred MIME type.
    pub mime_type: Option<String>,
    /// Non-fatal problems found while resolving.
    pub warnings: Vec<String>,
}

/// Lookup of encryption preferences by address.
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// Resolves preferences for `address`.
    async fn encryption_preferences(
        &self,
        address: &str,
    ) -> Result<EncryptionPreferences, DirectoryError>;
}

/// Fixed in-memory [`KeyDirectory`].
///
/// Unknown addresses resolve to empty preferences.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    entries: Mutex<HashMap<String, EncryptionPreferences>>,
    unavailable: AtomicBool,
    lookups: AtomicUsize,
}

impl StaticDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the preferences returned for `address`.
    pub fn insert(&self, address: &str, preferences: EncryptionPreferences) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize(address), preferences);
    }

    /// Makes every lookup fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of lookups served so far.
    #[must_use]
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyDirectory for StaticDirectory {
    async fn encryption_preferences(
        &self,
        address: &str,
    ) -> Result<EncryptionPreferences, DirectoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable(format!(
                "lookup of {address} failed"
            )));
        }

        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize(address))
            .cloned()
            .unwrap_or_default())
    }
}

fn normalize(address: &str) -> String {
    address.trim().to_lowercase()
}
