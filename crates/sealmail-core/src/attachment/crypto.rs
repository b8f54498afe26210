//! Attachment encryption and decryption.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use super::error::{AttachmentError, ValidationError};
use crate::crypto::{CryptoError, CryptoProvider, PrivateKey, PublicKey};
use crate::model::{EncryptedAttachment, Packets, Plaintext};

/// A file picked for upload.
#[derive(Debug, Clone)]
pub struct AttachmentFile {
    /// Filename.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
    /// Plaintext bytes.
    pub data: Bytes,
}

impl AttachmentFile {
    /// Creates a file from its parts.
    #[must_use]
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Splits attachments into key and data packets and back.
#[derive(Clone)]
pub struct AttachmentCrypto {
    crypto: Arc<dyn CryptoProvider>,
}

impl AttachmentCrypto {
    /// Creates an attachment codec over `crypto`.
    #[must_use]
    pub fn new(crypto: Arc<dyn CryptoProvider>) -> Self {
        Self { crypto }
    }

    /// Encrypts a file for upload.
    ///
    /// Only the first recipient key gets a key packet; the first sender key
    /// signs the plaintext.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NoFile`] when `file` is `None`, and
    /// [`AttachmentError::EncryptFailed`] when there is no recipient key or
    /// the provider fails.
    pub async fn encrypt(
        &self,
        file: Option<&AttachmentFile>,
        inline: bool,
        recipient_keys: &[PublicKey],
        sender_keys: &[PrivateKey],
    ) -> Result<Packets, AttachmentError> {
        let file = file.ok_or(ValidationError::NoFile)?;
        let recipient = recipient_keys
            .first()
            .ok_or_else(|| AttachmentError::EncryptFailed("no recipient key".to_string()))?;

        let split = self
            .crypto
            .encrypt_split(
                &file.data,
                &file.name,
                std::slice::from_ref(recipient),
                sender_keys.first(),
            )
            .await
            .map_err(|e| {
                warn!("Failed to encrypt attachment {}: {}", file.name, e);
                AttachmentError::EncryptFailed(e.to_string())
            })?;

        let key_packet = split.key_packets.into_iter().next().ok_or_else(|| {
            AttachmentError::EncryptFailed("provider returned no key packet".to_string())
        })?;

        debug!(
            "Encrypted attachment {} ({} bytes) for key {}",
            file.name,
            file.size(),
            recipient.id()
        );

        Ok(Packets {
            filename: file.name.clone(),
            mime_type: file.mime_type.clone(),
            size: file.size(),
            inline,
            signature: split
                .signature
                .map(|s| Bytes::copy_from_slice(s.as_bytes())),
            preview: file.data.clone(),
            key_packet: Bytes::from(key_packet),
            data_packet: Bytes::from(split.data_packet),
        })
    }

    /// Decrypts stored attachment packets.
    ///
    /// # Errors
    ///
    /// Returns [`AttachmentError::NoMatchingKey`] or
    /// [`AttachmentError::KeyPacket`] when the session key cannot be
    /// recovered, and [`AttachmentError::CorruptedData`] when the data packet
    /// does not decrypt under it.
    pub async fn decrypt(
        &self,
        encrypted: &EncryptedAttachment,
        private_keys: &[PrivateKey],
    ) -> Result<Plaintext, AttachmentError> {
        let session_key = self
            .crypto
            .decrypt_session_key(&encrypted.key_packets, private_keys)
            .await
            .map_err(|e| match e {
                CryptoError::NoMatchingKey => AttachmentError::NoMatchingKey,
                other => AttachmentError::KeyPacket(other.to_string()),
            })?;

        let data = self
            .crypto
            .decrypt_data_packet(&encrypted.data_packet, &session_key)
            .await
            .map_err(|e| AttachmentError::CorruptedData(e.to_string()))?;

        Ok(Plaintext {
            data: Bytes::from(data),
            mime_type: encrypted.mime_type.clone(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{MockCrypto, keypair};

    fn codec() -> (AttachmentCrypto, Arc<MockCrypto>) {
        let mock = Arc::new(MockCrypto::default());
        (AttachmentCrypto::new(mock.clone()), mock)
    }

    fn file() -> AttachmentFile {
        AttachmentFile::new("report.pdf", "application/pdf", &b"%PDF-1.7 content"[..])
    }

    #[tokio::test]
    async fn test_encrypt_then_decrypt() {
        let (codec, _) = codec();
        let (public, private) = keypair(1);

        let packets = codec
            .encrypt(Some(&file()), false, &[public], &[private.clone()])
            .await
            .unwrap();

        assert_eq!(packets.size, 16);
        assert_eq!(packets.preview, file().data);
        assert!(packets.signature.is_some());

        let plain = codec
            .decrypt(
                &EncryptedAttachment {
                    key_packets: packets.key_packet,
                    data_packet: packets.data_packet,
                    mime_type: packets.mime_type,
                },
                &[private],
            )
            .await
            .unwrap();
        assert_eq!(plain.data, file().data);
    }

    #[tokio::test]
    async fn test_encrypt_without_file() {
        let (codec, _) = codec();
        let (public, _) = keypair(1);
        let result = codec.encrypt(None, false, &[public], &[]).await;
        let error = result.unwrap_err();
        assert_eq!(error, AttachmentError::Validation(ValidationError::NoFile));
        assert_eq!(error.to_string(), "No file provided");
    }

    #[tokio::test]
    async fn test_encrypt_uses_only_first_recipient() {
        let (codec, mock) = codec();
        let (first, _) = keypair(1);
        let (second, _) = keypair(2);

        codec
            .encrypt(Some(&file()), false, &[first, second], &[])
            .await
            .unwrap();

        assert_eq!(mock.last_recipient_count(), 1);
    }

    #[tokio::test]
    async fn test_wrong_key_is_distinct_from_corruption() {
        let (codec, _) = codec();
        let (public, private) = keypair(1);
        let (_, stranger) = keypair(9);

        let packets = codec
            .encrypt(Some(&file()), false, &[public], &[])
            .await
            .unwrap();
        let encrypted = EncryptedAttachment {
            key_packets: packets.key_packet.clone(),
            data_packet: packets.data_packet.clone(),
            mime_type: packets.mime_type.clone(),
        };

        let wrong_key = codec.decrypt(&encrypted, &[stranger]).await;
        assert_eq!(wrong_key.unwrap_err(), AttachmentError::NoMatchingKey);

        let mut tampered = packets.data_packet.to_vec();
        let last = tampered.len() - 1;
        tampered[last] ^= 0xff;
        let corrupted = codec
            .decrypt(
                &EncryptedAttachment {
                    data_packet: Bytes::from(tampered),
                    ..encrypted
                },
                &[private],
            )
            .await;
        assert!(matches!(corrupted, Err(AttachmentError::CorruptedData(_))));
    }
}
