//! Orchestration of the per-message pipeline.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::attachment::{AttachmentCrypto, AttachmentError, AttachmentLoader};
use crate::cache::{AttachmentCache, BlobRegistry, CacheKey};
use crate::config::Settings;
use crate::crypto::CryptoProvider;
use crate::keys::KeyResolver;
use crate::model::{
    AttachmentId, AttachmentSource, LocalId, Message, MessageError, Plaintext, Verification,
    VerificationStatus,
};
use crate::pipeline::{Decrypted, DecryptionOutcome, Decryptor, EmbeddedResolver, Verifier};
use crate::remote::{KeyDirectory, Transport};
use crate::session::{AddressKeys, MessageEntity, MessageStore};
use crate::{Error, Result};

/// What a pipeline step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step ran and its result was stored.
    Applied,
    /// The step ran but recorded a failure.
    Failed,
    /// Nothing to do.
    Skipped,
    /// The message was closed or reopened while the step ran; the result
    /// was dropped.
    Stale,
}

/// Runs decryption, verification and embedded-image resolution for open
/// messages, each step through the message's action queue.
#[derive(Clone)]
pub struct MessageProcessor {
    store: MessageStore,
    decryptor: Decryptor,
    verifier: Verifier,
    resolver: KeyResolver,
    embedded: EmbeddedResolver,
    loader: AttachmentLoader,
    attachment_crypto: AttachmentCrypto,
    settings: Settings,
}

impl MessageProcessor {
    /// Wires a processor over the given collaborators.
    #[must_use]
    pub fn new(
        crypto: Arc<dyn CryptoProvider>,
        transport: Arc<dyn Transport>,
        directory: Arc<dyn KeyDirectory>,
        settings: Settings,
    ) -> Self {
        let cache = AttachmentCache::new();
        let blobs = BlobRegistry::new();
        let attachment_crypto = AttachmentCrypto::new(Arc::clone(&crypto));
        let loader = AttachmentLoader::new(transport, attachment_crypto.clone(), cache.clone());

        Self {
            store: MessageStore::new(cache, blobs.clone()),
            decryptor: Decryptor::new(Arc::clone(&crypto)),
            verifier: Verifier::new(Arc::clone(&crypto)),
            resolver: KeyResolver::new(directory, crypto, settings.large_key_size),
            embedded: EmbeddedResolver::new(loader.clone(), blobs),
            loader,
            attachment_crypto,
            settings,
        }
    }

    /// Open messages.
    #[must_use]
    pub const fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Attachment codec.
    #[must_use]
    pub const fn attachment_crypto(&self) -> &AttachmentCrypto {
        &self.attachment_crypto
    }

    /// Active settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Opens a message for processing.
    pub fn open(&self, local_id: LocalId, data: Message, keys: AddressKeys) -> Arc<MessageEntity> {
        self.store.open(local_id, data, keys)
    }

    /// Closes a message; pending steps are dropped and results of running
    /// ones are discarded.
    pub fn close(&self, local_id: &LocalId) -> bool {
        self.store.evict(local_id)
    }

    fn entity(&self, local_id: &LocalId) -> Result<Arc<MessageEntity>> {
        self.store
            .get(local_id)
            .ok_or_else(|| Error::MessageNotFound(local_id.to_string()))
    }

    /// Decrypts, verifies and resolves embedded images of a message.
    ///
    /// A message that was already decrypted is left as it is.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is not open or is closed while
    /// waiting in its queue.
    pub async fn load(&self, local_id: &LocalId) -> Result<StepOutcome> {
        let entity = self.entity(local_id)?;
        let (queue, epoch) = (entity.queue(), entity.epoch());

        let decrypted = queue.enqueue(|| self.decrypt_step(local_id, epoch)).await?;
        if decrypted != StepOutcome::Applied {
            return Ok(decrypted);
        }

        let verified = queue.enqueue(|| self.verify_step(local_id, epoch)).await?;
        queue.enqueue(|| self.embedded_step(local_id, epoch)).await?;

        info!(%local_id, ?verified, "Loaded message");
        Ok(decrypted)
    }

    /// Recomputes verification, e.g. after the sender's keys changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is not open or is closed while
    /// waiting in its queue.
    pub async fn reverify(&self, local_id: &LocalId) -> Result<StepOutcome> {
        let entity = self.entity(local_id)?;
        let epoch = entity.epoch();
        Ok(entity
            .queue()
            .enqueue(|| self.verify_step(local_id, epoch))
            .await?)
    }

    /// Turns on embedded images for one message and resolves them.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is not open or is closed while
    /// waiting in its queue.
    pub async fn load_embedded_images(&self, local_id: &LocalId) -> Result<StepOutcome> {
        let entity = self.entity(local_id)?;
        let epoch = entity.epoch();
        entity
            .queue()
            .enqueue(|| async move {
                if self
                    .store
                    .commit(local_id, epoch, |s| {
                        s.overlay.show_embedded_images = Some(true);
                    })
                    .is_none()
                {
                    return StepOutcome::Stale;
                }
                self.embedded_step(local_id, epoch).await
            })
            .await
            .map_err(Error::from)
    }

    /// Rebuilds the embedded-image map after the attachment list changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is not open or is closed while
    /// waiting in its queue.
    pub async fn refresh_embedded(&self, local_id: &LocalId) -> Result<StepOutcome> {
        let entity = self.entity(local_id)?;
        let epoch = entity.epoch();
        Ok(entity
            .queue()
            .enqueue(|| self.embedded_step(local_id, epoch))
            .await?)
    }

    /// Turns on remote content for one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is not open or is closed while
    /// waiting in its queue.
    pub async fn load_remote_images(&self, local_id: &LocalId) -> Result<StepOutcome> {
        let entity = self.entity(local_id)?;
        let epoch = entity.epoch();
        let applied = entity
            .queue()
            .enqueue(|| async move {
                self.store.commit(local_id, epoch, |s| {
                    s.overlay.show_remote_images = Some(true);
                })
            })
            .await?;
        Ok(applied.map_or(StepOutcome::Stale, |()| StepOutcome::Applied))
    }

    /// Decrypted content of one attachment.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is not open, has no such
    /// attachment, or the attachment cannot be fetched or decrypted.
    pub async fn load_attachment(
        &self,
        local_id: &LocalId,
        attachment_id: &AttachmentId,
    ) -> Result<Plaintext> {
        let state = self.entity(local_id)?.snapshot();
        let attachment = state
            .data
            .attachments
            .iter()
            .find(|a| a.id == *attachment_id)
            .ok_or(AttachmentError::Unavailable)?;

        Ok(self
            .loader
            .load(local_id, attachment, &state.keys.private)
            .await?)
    }

    /// Decrypted body with resolved `cid:` references replaced by local
    /// URLs.
    #[must_use]
    pub fn rendered_body(&self, local_id: &LocalId) -> Option<String> {
        let state = self.store.get(local_id)?.snapshot();
        let body = state.overlay.decrypted_body.as_deref()?;
        Some(state.overlay.embeddeds.apply(body))
    }

    async fn decrypt_step(&self, local_id: &LocalId, epoch: u64) -> StepOutcome {
        let Some(state) = self.store.snapshot_at(local_id, epoch) else {
            return StepOutcome::Stale;
        };
        if state.overlay.initialized {
            debug!(%local_id, "Already decrypted");
            return StepOutcome::Skipped;
        }

        match self.decryptor.decrypt(&state.data, &state.keys.private).await {
            DecryptionOutcome::Failed(error) => self
                .store
                .commit(local_id, epoch, |s| {
                    s.data
                        .attachments
                        .retain(|a| a.source != AttachmentSource::Embedded);
                    s.overlay.apply_decryption_failure(error);
                })
                .map_or(StepOutcome::Stale, |()| StepOutcome::Failed),
            DecryptionOutcome::Decrypted(decrypted) => {
                self.commit_decrypted(local_id, epoch, decrypted)
            }
        }
    }

    fn commit_decrypted(&self, local_id: &LocalId, epoch: u64, decrypted: Decrypted) -> StepOutcome {
        let Decrypted {
            body,
            mime_type,
            subject,
            signature,
            attachments,
        } = decrypted;
        let extracted: Vec<_> = attachments.iter().map(|e| e.attachment.clone()).collect();

        let committed = self.store.commit(local_id, epoch, |s| {
            s.data
                .attachments
                .retain(|a| a.source != AttachmentSource::Embedded);
            s.data.attachments.extend(extracted);
            s.overlay.apply_decryption(body, mime_type, subject, signature);
        });
        if committed.is_none() {
            debug!(%local_id, "Dropping stale decryption result");
            return StepOutcome::Stale;
        }

        for e in attachments {
            self.store.cache().insert(
                CacheKey::new(local_id.clone(), e.attachment.id),
                e.plaintext,
            );
        }
        StepOutcome::Applied
    }

    async fn verify_step(&self, local_id: &LocalId, epoch: u64) -> StepOutcome {
        let Some(state) = self.store.snapshot_at(local_id, epoch) else {
            return StepOutcome::Stale;
        };
        if state.overlay.decrypted_body.is_none() || state.overlay.decryption_failed() {
            return StepOutcome::Skipped;
        }

        let mut errors = Vec::new();
        let resolved = match self.resolver.resolve(&state.data.sender).await {
            Ok(resolved) => Some(resolved),
            Err(e) => {
                warn!(%local_id, ?e, "Sender key lookup failed");
                errors.push(MessageError::KeyFetch(e.to_string()));
                None
            }
        };
        let attached = self
            .resolver
            .attached_keys(
                &self.loader,
                local_id,
                &state.data.attachments,
                &state.keys.private,
            )
            .await;

        let signed = state.overlay.signature.as_ref();
        let mut verification = if signed.is_some() && resolved.is_none() && attached.is_empty() {
            // No key source at all; the status stays unresolved.
            Verification::with_status(VerificationStatus::Pending)
        } else {
            let candidates = KeyResolver::candidates(resolved.as_ref(), &attached);
            let outcome = self
                .verifier
                .verify(signed, state.data.date, &candidates)
                .await;
            errors.extend(outcome.errors);
            Verification::new(outcome.status, outcome.signing_key)
        };

        if let Some(resolved) = resolved {
            verification.sender_pinned_keys = resolved.pinned;
            verification.sender_api_keys = resolved.api;
            verification.sender_verified = resolved.sender_verified;
        }
        verification.attached_public_keys = attached;
        let status = verification.status();

        match self.store.commit(local_id, epoch, |s| {
            s.overlay.apply_verification(verification, errors)
        }) {
            Some(true) => {
                debug!(%local_id, %status, "Stored verification result");
                StepOutcome::Applied
            }
            Some(false) => StepOutcome::Skipped,
            None => StepOutcome::Stale,
        }
    }

    async fn embedded_step(&self, local_id: &LocalId, epoch: u64) -> StepOutcome {
        let Some(state) = self.store.snapshot_at(local_id, epoch) else {
            return StepOutcome::Stale;
        };
        let Some(body) = state.overlay.decrypted_body.as_deref() else {
            return StepOutcome::Skipped;
        };
        if !state
            .overlay
            .shows_embedded_images(self.settings.show_embedded_images)
        {
            return StepOutcome::Skipped;
        }

        let map = self
            .embedded
            .resolve(
                local_id,
                body,
                &state.data.attachments,
                &state.keys.private,
                true,
            )
            .await;
        let new_urls: Vec<String> = map.iter().map(|(_, info)| info.url.clone()).collect();

        let blobs = self.store.blobs();
        match self.store.commit(local_id, epoch, |s| {
            // Attachments removed while the map was being resolved.
            let mut map = map;
            let dropped = map.retain_attachments(&s.data.attachments);
            (std::mem::replace(&mut s.overlay.embeddeds, map), dropped)
        }) {
            Some((previous, dropped)) => {
                for (_, info) in previous.iter() {
                    blobs.revoke(&info.url);
                }
                for url in &dropped {
                    blobs.revoke(url);
                }
                StepOutcome::Applied
            }
            None => {
                for url in &new_urls {
                    blobs.revoke(url);
                }
                StepOutcome::Stale
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::model::{ErrorKind, Overlay, WireFormat};
    use crate::remote::{EncryptionPreferences, InMemoryTransport, StaticDirectory};
    use crate::testing::{MockCrypto, keypair, seal};

    const SENDER: &str = "alice@example.com";

    const MIME: &[u8] = b"Content-Type: multipart/related; boundary=b\r\n\r\n\
--b\r\nContent-Type: text/html\r\n\r\n<p><img src=\"cid:pic@x\"></p>\r\n\
--b\r\nContent-Type: image/png\r\nContent-ID: <pic@x>\r\nContent-Disposition: inline\r\n\r\nPNG\r\n\
--b--\r\n";

    struct Fixture {
        crypto: Arc<MockCrypto>,
        directory: Arc<StaticDirectory>,
        processor: MessageProcessor,
    }

    fn fixture(settings: Settings) -> Fixture {
        let crypto = Arc::new(MockCrypto::default());
        let directory = Arc::new(StaticDirectory::new());
        let processor = MessageProcessor::new(
            crypto.clone(),
            Arc::new(InMemoryTransport::new()),
            directory.clone(),
            settings,
        );
        Fixture {
            crypto,
            directory,
            processor,
        }
    }

    fn own_keys() -> AddressKeys {
        let (public, private) = keypair(1);
        AddressKeys {
            private: vec![private],
            public: vec![public],
        }
    }

    /// Message to the user's key (seed 1), optionally signed by seed 2.
    fn open(f: &Fixture, payload: &[u8], format: WireFormat, signed: bool) -> LocalId {
        let (user, _) = keypair(1);
        let (_, sender_key) = keypair(2);
        let id = LocalId::new("m1");
        f.processor.open(
            id.clone(),
            Message {
                sender: SENDER.into(),
                body: Bytes::from(seal(payload, &user, signed.then_some(&sender_key))),
                format,
                mime_type: "text/plain".into(),
                ..Message::default()
            },
            own_keys(),
        );
        id
    }

    fn overlay(f: &Fixture, id: &LocalId) -> Overlay {
        f.processor.store().get(id).unwrap().snapshot().overlay
    }

    #[tokio::test]
    async fn test_unsigned_message_skips_verification_crypto() {
        let f = fixture(Settings::default());
        let id = open(&f, b"hello", WireFormat::Legacy, false);

        assert_eq!(f.processor.load(&id).await.unwrap(), StepOutcome::Applied);

        let overlay = overlay(&f, &id);
        assert_eq!(overlay.decrypted_body.as_deref(), Some("hello"));
        assert_eq!(
            overlay.verification.status(),
            VerificationStatus::NotSigned
        );
        assert_eq!(f.crypto.verify_count(), 0);
    }

    #[tokio::test]
    async fn test_signed_by_pinned_key_is_valid() {
        let f = fixture(Settings::default());
        f.directory.insert(
            SENDER,
            EncryptionPreferences {
                pinned_keys: vec![keypair(2).0],
                ..EncryptionPreferences::default()
            },
        );
        let id = open(&f, b"hello", WireFormat::Legacy, true);

        f.processor.load(&id).await.unwrap();

        let overlay = overlay(&f, &id);
        assert_eq!(
            overlay.verification.status(),
            VerificationStatus::SignedAndValid
        );
        assert_eq!(
            overlay.verification.signing_public_key().unwrap().id(),
            keypair(2).0.id()
        );
        assert_eq!(overlay.verification.sender_pinned_keys.len(), 1);
    }

    #[tokio::test]
    async fn test_signed_without_matching_key_is_not_verified() {
        let f = fixture(Settings::default());
        f.directory.insert(
            SENDER,
            EncryptionPreferences {
                api_keys: vec![keypair(7).0],
                ..EncryptionPreferences::default()
            },
        );
        let id = open(&f, b"hello", WireFormat::Legacy, true);

        f.processor.load(&id).await.unwrap();

        assert_eq!(
            overlay(&f, &id).verification.status(),
            VerificationStatus::NotVerified
        );
    }

    #[tokio::test]
    async fn test_key_lookup_failure_keeps_status_pending() {
        let f = fixture(Settings::default());
        f.directory.set_unavailable(true);
        let id = open(&f, b"hello", WireFormat::Legacy, true);

        f.processor.load(&id).await.unwrap();

        let overlay = overlay(&f, &id);
        assert_eq!(overlay.decrypted_body.as_deref(), Some("hello"));
        assert_eq!(overlay.verification.status(), VerificationStatus::Pending);
        assert_eq!(overlay.errors.count(ErrorKind::KeyFetch), 1);
        assert_eq!(f.crypto.verify_count(), 0);
    }

    #[tokio::test]
    async fn test_reverify_after_directory_recovers() {
        let f = fixture(Settings::default());
        f.directory.set_unavailable(true);
        let id = open(&f, b"hello", WireFormat::Legacy, true);
        f.processor.load(&id).await.unwrap();

        f.directory.set_unavailable(false);
        f.directory.insert(
            SENDER,
            EncryptionPreferences {
                pinned_keys: vec![keypair(2).0],
                ..EncryptionPreferences::default()
            },
        );
        assert_eq!(
            f.processor.reverify(&id).await.unwrap(),
            StepOutcome::Applied
        );

        let overlay = overlay(&f, &id);
        assert_eq!(
            overlay.verification.status(),
            VerificationStatus::SignedAndValid
        );
        assert!(!overlay.errors.has(ErrorKind::KeyFetch));
    }

    #[tokio::test]
    async fn test_step_for_replaced_entity_is_stale() {
        let f = fixture(Settings::default());
        let id = open(&f, b"hello", WireFormat::Legacy, false);
        let old = f.processor.store().get(&id).unwrap().epoch();
        open(&f, b"hello", WireFormat::Legacy, false);

        assert_eq!(f.processor.decrypt_step(&id, old).await, StepOutcome::Stale);
        assert_eq!(f.processor.embedded_step(&id, old).await, StepOutcome::Stale);
        assert!(overlay(&f, &id).decrypted_body.is_none());
        assert_eq!(f.crypto.decrypt_count(), 0);
    }

    #[tokio::test]
    async fn test_decryption_failure() {
        let f = fixture(Settings::default());
        let id = LocalId::new("m1");
        f.processor.open(
            id.clone(),
            Message {
                sender: SENDER.into(),
                body: Bytes::from_static(b"garbage"),
                ..Message::default()
            },
            own_keys(),
        );

        assert_eq!(f.processor.load(&id).await.unwrap(), StepOutcome::Failed);

        let overlay = overlay(&f, &id);
        assert_eq!(overlay.decrypted_body.as_deref(), Some(""));
        assert_eq!(overlay.errors.count(ErrorKind::Decryption), 1);
        assert_eq!(
            overlay.verification.status(),
            VerificationStatus::NotVerified
        );
    }

    #[tokio::test]
    async fn test_second_load_does_not_decrypt_again() {
        let f = fixture(Settings::default());
        let id = open(&f, b"hello", WireFormat::Legacy, false);

        f.processor.load(&id).await.unwrap();
        assert_eq!(f.processor.load(&id).await.unwrap(), StepOutcome::Skipped);
        assert_eq!(f.crypto.decrypt_count(), 1);
    }

    #[tokio::test]
    async fn test_embedded_images_hidden_until_requested() {
        let f = fixture(Settings::default());
        let id = open(&f, MIME, WireFormat::Mime, false);

        f.processor.load(&id).await.unwrap();
        assert!(overlay(&f, &id).embeddeds.is_empty());
        assert_eq!(
            f.processor.rendered_body(&id).unwrap(),
            "<p><img src=\"cid:pic@x\"></p>"
        );

        assert_eq!(
            f.processor.load_embedded_images(&id).await.unwrap(),
            StepOutcome::Applied
        );
        let rendered = f.processor.rendered_body(&id).unwrap();
        assert!(!rendered.contains("cid:"));

        let url = overlay(&f, &id).embeddeds.get("pic@x").unwrap().url.clone();
        let blob = f.processor.store().blobs().get(&url).unwrap();
        assert_eq!(blob.data, Bytes::from_static(b"PNG"));
    }

    #[tokio::test]
    async fn test_close_revokes_embedded_urls() {
        let f = fixture(Settings {
            show_embedded_images: true,
            ..Settings::default()
        });
        let id = open(&f, MIME, WireFormat::Mime, false);
        f.processor.load(&id).await.unwrap();
        assert_eq!(f.processor.store().blobs().len(), 1);

        assert!(f.processor.close(&id));

        assert!(f.processor.store().blobs().is_empty());
        assert!(matches!(
            f.processor.load(&id).await,
            Err(Error::MessageNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_load_embedded_attachment_from_cache() {
        let f = fixture(Settings::default());
        let id = open(&f, MIME, WireFormat::Mime, false);
        f.processor.load(&id).await.unwrap();

        let plaintext = f
            .processor
            .load_attachment(&id, &AttachmentId::embedded(1))
            .await
            .unwrap();

        assert_eq!(plaintext.data, Bytes::from_static(b"PNG"));
        assert_eq!(plaintext.mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_remote_images_flag() {
        let f = fixture(Settings::default());
        let id = open(&f, b"hello", WireFormat::Legacy, false);

        f.processor.load_remote_images(&id).await.unwrap();

        assert_eq!(overlay(&f, &id).show_remote_images, Some(true));
    }
}
