//! Fetch-and-decrypt of attachments through the cache.

use std::sync::Arc;

use tracing::debug;

use super::crypto::AttachmentCrypto;
use super::error::AttachmentError;
use crate::cache::{AttachmentCache, CacheKey};
use crate::crypto::PrivateKey;
use crate::model::{Attachment, AttachmentSource, EncryptedAttachment, LocalId, Plaintext};
use crate::remote::Transport;

/// Loads attachment plaintext, fetching and decrypting at most once per
/// attachment.
#[derive(Clone)]
pub struct AttachmentLoader {
    transport: Arc<dyn Transport>,
    crypto: AttachmentCrypto,
    cache: AttachmentCache,
}

impl AttachmentLoader {
    /// Creates a loader.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        crypto: AttachmentCrypto,
        cache: AttachmentCache,
    ) -> Self {
        Self {
            transport,
            crypto,
            cache,
        }
    }

    /// The cache backing this loader.
    #[must_use]
    pub const fn cache(&self) -> &AttachmentCache {
        &self.cache
    }

    /// Returns the plaintext of `attachment` in message `local_id`.
    ///
    /// Attachments extracted from a MIME body are served from the cache
    /// only; remote ones are fetched and decrypted on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`AttachmentError::Unavailable`] for an extracted attachment
    /// missing from the cache, or any fetch/decrypt failure.
    pub async fn load(
        &self,
        local_id: &LocalId,
        attachment: &Attachment,
        private_keys: &[PrivateKey],
    ) -> Result<Plaintext, AttachmentError> {
        let key = CacheKey::new(local_id.clone(), attachment.id.clone());

        if attachment.source == AttachmentSource::Embedded {
            return self.cache.get(&key).ok_or(AttachmentError::Unavailable);
        }

        let transport = Arc::clone(&self.transport);
        let crypto = self.crypto.clone();
        let id = attachment.id.clone();
        let key_packets = attachment.key_packets.clone();
        let mime_type = attachment.mime_type.clone();
        let private_keys = private_keys.to_vec();

        self.cache
            .get_or_load(key, move || async move {
                let key_packets = key_packets.ok_or(AttachmentError::MissingKeyPackets)?;
                let data_packet = transport.fetch_attachment(&id).await?;
                debug!("Fetched attachment {} ({} bytes)", id, data_packet.len());

                crypto
                    .decrypt(
                        &EncryptedAttachment {
                            key_packets,
                            data_packet,
                            mime_type,
                        },
                        &private_keys,
                    )
                    .await
            })
            .await
    }
}
