//! Local URLs for decrypted content.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use uuid::Uuid;

use crate::model::LocalId;

/// URL prefix of registered blobs.
pub const BLOB_URL_PREFIX: &str = "blob:sealmail/";

/// Decrypted content served under a local URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// Message the blob belongs to.
    pub owner: LocalId,
    /// Content bytes.
    pub data: Bytes,
    /// MIME type.
    pub mime_type: String,
}

/// Registry of `blob:` URLs pointing at decrypted bytes.
#[derive(Debug, Clone, Default)]
pub struct BlobRegistry {
    blobs: Arc<Mutex<HashMap<String, Blob>>>,
}

impl BlobRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Blob>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers content and returns its URL.
    pub fn register(&self, owner: &LocalId, data: Bytes, mime_type: &str) -> String {
        let url = format!("{BLOB_URL_PREFIX}{}", Uuid::new_v4());
        self.lock().insert(
            url.clone(),
            Blob {
                owner: owner.clone(),
                data,
                mime_type: mime_type.to_string(),
            },
        );
        url
    }

    /// Looks up a URL.
    #[must_use]
    pub fn get(&self, url: &str) -> Option<Blob> {
        self.lock().get(url).cloned()
    }

    /// Releases one URL.
    pub fn revoke(&self, url: &str) {
        self.lock().remove(url);
    }

    /// Releases every URL owned by a message.
    pub fn revoke_owner(&self, owner: &LocalId) {
        self.lock().retain(|_, blob| blob.owner != *owner);
    }

    /// Number of live URLs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no URL is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_revoke_owner() {
        let registry = BlobRegistry::new();
        let m1 = LocalId::new("m1");
        let m2 = LocalId::new("m2");

        let url = registry.register(&m1, Bytes::from_static(b"a"), "image/png");
        registry.register(&m2, Bytes::from_static(b"b"), "image/png");

        assert!(url.starts_with(BLOB_URL_PREFIX));
        assert_eq!(registry.get(&url).map(|b| b.data), Some(Bytes::from_static(b"a")));

        registry.revoke_owner(&m1);
        assert!(registry.get(&url).is_none());
        assert_eq!(registry.len(), 1);
    }
}
