//! Attachment uploads for drafts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::processor::MessageProcessor;
use crate::attachment::{AttachmentError, AttachmentFile, UploadError, ValidationError};
use crate::cache::CacheKey;
use crate::model::{Attachment, AttachmentId, AttachmentSource, LocalId, Plaintext};
use crate::remote::{Notification, Notifier, Transport, UploadRequest};
use crate::session::AddressKeys;
use crate::{Error, Result};

/// MIME types that can be shown inline.
pub const EMBEDDABLE_TYPES: &[&str] = &["image/gif", "image/jpeg", "image/png", "image/bmp"];

/// Domain used in generated content ids when the sender has none.
const FALLBACK_CID_DOMAIN: &str = "sealmail.local";

/// How picked files should be added to a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentAction {
    /// Regular attachment.
    Attachment,
    /// Inline image where the type allows it, regular attachment otherwise.
    Inline,
}

/// Identifier of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UploadId(u64);

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "upload-{}", self.0)
    }
}

/// An upload that has not finished yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    /// Upload id.
    pub id: UploadId,
    /// Draft the file is being added to.
    pub local_id: LocalId,
    /// Filename.
    pub filename: String,
    /// Size in bytes.
    pub size: u64,
    /// Whether the file is added inline.
    pub inline: bool,
}

struct PendingEntry {
    upload: PendingUpload,
    handle: AbortHandle,
}

/// Handle to a running upload.
pub struct UploadTask {
    id: UploadId,
    handle: JoinHandle<std::result::Result<Attachment, UploadError>>,
}

impl UploadTask {
    /// Upload id, for [`UploadController::abort`].
    #[must_use]
    pub const fn id(&self) -> UploadId {
        self.id
    }

    /// Waits for the upload to finish.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Aborted`] if the upload was aborted, or the
    /// error that made it fail.
    pub async fn wait(self) -> std::result::Result<Attachment, UploadError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(UploadError::Aborted),
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}

struct Job {
    id: UploadId,
    local_id: LocalId,
    epoch: u64,
    message_id: Option<String>,
    keys: AddressKeys,
    file: AttachmentFile,
    inline: bool,
    content_id: Option<String>,
}

/// Encrypts and uploads files into open drafts.
///
/// A finished upload is added to the draft only if it was not aborted and
/// the draft is still open.
#[derive(Clone)]
pub struct UploadController {
    processor: MessageProcessor,
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn Notifier>,
    pending: Arc<Mutex<Vec<PendingEntry>>>,
    next_id: Arc<AtomicU64>,
}

impl UploadController {
    /// Creates a controller.
    #[must_use]
    pub fn new(
        processor: MessageProcessor,
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            processor,
            transport,
            notifier,
            pending: Arc::default(),
            next_id: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PendingEntry>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Uploads that have not finished for `local_id`.
    #[must_use]
    pub fn pending(&self, local_id: &LocalId) -> Vec<PendingUpload> {
        self.lock()
            .iter()
            .filter(|e| e.upload.local_id == *local_id)
            .map(|e| e.upload.clone())
            .collect()
    }

    /// Starts uploading `files` into draft `local_id`.
    ///
    /// When the draft's attachments plus pending uploads plus `files` would
    /// exceed the size ceiling, the user is notified and nothing starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft is not open or the size ceiling would
    /// be exceeded.
    pub fn add_attachments(
        &self,
        local_id: &LocalId,
        files: Vec<AttachmentFile>,
        action: AttachmentAction,
    ) -> Result<Vec<UploadTask>> {
        let entity = self
            .processor
            .store()
            .get(local_id)
            .ok_or_else(|| Error::MessageNotFound(local_id.to_string()))?;
        let state = entity.snapshot();
        let settings = self.processor.settings();

        let pending = self.pending(local_id);
        let total = state.data.attachments_size()
            + pending.iter().map(|p| p.size).sum::<u64>()
            + files.iter().map(AttachmentFile::size).sum::<u64>();
        if total > settings.attachment_size_limit {
            warn!(%local_id, total, "Attachment size limit exceeded");
            self.notifier
                .notify(Notification::error(settings.size_limit_message()));
            return Err(ValidationError::SizeExceeded {
                limit: settings.attachment_size_limit,
            }
            .into());
        }

        let existing = state.data.attachments.len() + pending.len();
        let domain = state
            .data
            .sender_domain()
            .unwrap_or(FALLBACK_CID_DOMAIN)
            .to_string();

        let mut pending = self.lock();
        let tasks = files
            .into_iter()
            .enumerate()
            .map(|(i, mut file)| {
                let inline = action == AttachmentAction::Inline && is_embeddable(&file.mime_type);
                if file.name.is_empty() {
                    file.name = format!("Image {}", existing + i + 1);
                }
                let id = UploadId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
                let upload = PendingUpload {
                    id,
                    local_id: local_id.clone(),
                    filename: file.name.clone(),
                    size: file.size(),
                    inline,
                };
                let job = Job {
                    id,
                    local_id: local_id.clone(),
                    epoch: entity.epoch(),
                    message_id: state.data.id.clone(),
                    keys: state.keys.clone(),
                    content_id: inline.then(|| format!("{}@{}", Uuid::new_v4().simple(), domain)),
                    file,
                    inline,
                };

                let handle = tokio::spawn(self.clone().run(job));
                pending.push(PendingEntry {
                    upload,
                    handle: handle.abort_handle(),
                });
                UploadTask { id, handle }
            })
            .collect();

        Ok(tasks)
    }

    /// Cancels an upload. Its result, if it still arrives, is ignored.
    ///
    /// Returns whether the upload was still pending.
    pub fn abort(&self, id: UploadId) -> bool {
        let entry = {
            let mut pending = self.lock();
            pending
                .iter()
                .position(|e| e.upload.id == id)
                .map(|i| pending.remove(i))
        };
        match entry {
            Some(entry) => {
                entry.handle.abort();
                info!(%id, filename = %entry.upload.filename, "Upload aborted");
                true
            }
            None => false,
        }
    }

    /// Removes the pending record of `id`, returning whether it was there.
    fn finish(&self, id: UploadId) -> bool {
        let mut pending = self.lock();
        let before = pending.len();
        pending.retain(|e| e.upload.id != id);
        pending.len() != before
    }

    async fn run(self, job: Job) -> std::result::Result<Attachment, UploadError> {
        let result = self.upload(&job).await;

        if !self.finish(job.id) {
            debug!(id = %job.id, "Ignoring result of aborted upload");
            return Err(UploadError::Aborted);
        }

        match result {
            Ok((record, preview)) => self.commit(&job, record, preview).await,
            Err(e) => {
                warn!(id = %job.id, ?e, "Upload failed");
                if !e.is_silent() {
                    self.notifier.notify(Notification::error(format!(
                        "Error while uploading {}: {}",
                        job.file.name, e
                    )));
                }
                Err(e)
            }
        }
    }

    async fn upload(
        &self,
        job: &Job,
    ) -> std::result::Result<(Attachment, Plaintext), UploadError> {
        let packets = self
            .processor
            .attachment_crypto()
            .encrypt(Some(&job.file), job.inline, &job.keys.public, &job.keys.private)
            .await?;

        let preview = Plaintext {
            data: packets.preview.clone(),
            mime_type: packets.mime_type.clone(),
        };
        let record = self
            .transport
            .upload_attachment(UploadRequest {
                filename: packets.filename,
                message_id: job.message_id.clone(),
                content_id: job.content_id.clone(),
                mime_type: packets.mime_type,
                size: packets.size,
                inline: packets.inline,
                key_packets: packets.key_packet,
                data_packet: packets.data_packet,
                signature: packets.signature,
            })
            .await?;

        Ok((record, preview))
    }

    async fn commit(
        &self,
        job: &Job,
        record: Attachment,
        preview: Plaintext,
    ) -> std::result::Result<Attachment, UploadError> {
        let store = self.processor.store();
        let Some(entity) = store.get(&job.local_id).filter(|e| e.epoch() == job.epoch) else {
            debug!(id = %job.id, "Draft closed before upload finished");
            return Err(UploadError::MessageClosed);
        };

        let added = record.clone();
        let key = CacheKey::new(job.local_id.clone(), record.id.clone());
        let committed = entity
            .queue()
            .enqueue(|| async move {
                let committed = store.commit(&job.local_id, job.epoch, |s| {
                    s.data.attachments.push(added);
                    if let Some(cid) = &job.content_id {
                        s.overlay.show_embedded_images = Some(true);
                        let body = s.overlay.decrypted_body.get_or_insert_with(String::new);
                        body.push_str(&format!(
                            "<img src=\"cid:{cid}\" alt=\"{}\">",
                            escape_attribute(&job.file.name)
                        ));
                    }
                });
                if committed.is_some() {
                    store.cache().insert(key, preview);
                }
                committed
            })
            .await;
        if !matches!(committed, Ok(Some(()))) {
            debug!(id = %job.id, "Draft closed before upload finished");
            return Err(UploadError::MessageClosed);
        }

        info!(id = %job.id, attachment = %record.id, "Attachment uploaded");

        if job.inline
            && let Err(e) = self.processor.refresh_embedded(&job.local_id).await
        {
            debug!(?e, "Could not refresh embedded images");
        }

        Ok(record)
    }

    /// Deletes an attachment from a draft.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft is not open, has no such attachment,
    /// or the server refuses the deletion.
    pub async fn remove_attachment(
        &self,
        local_id: &LocalId,
        attachment_id: &AttachmentId,
    ) -> Result<()> {
        let store = self.processor.store();
        let entity = store
            .get(local_id)
            .ok_or_else(|| Error::MessageNotFound(local_id.to_string()))?;
        let state = entity.snapshot();
        let attachment = state
            .data
            .attachments
            .iter()
            .find(|a| a.id == *attachment_id)
            .ok_or(AttachmentError::Unavailable)?;

        if attachment.source == AttachmentSource::Remote {
            self.transport
                .remove_attachment(attachment_id, state.data.id.as_deref())
                .await?;
        }

        let epoch = entity.epoch();
        let revoked = entity
            .queue()
            .enqueue(|| async move {
                let revoked = store.commit(local_id, epoch, |s| {
                    s.data.attachments.retain(|a| a.id != *attachment_id);
                    s.overlay.embeddeds.remove_attachment(attachment_id)
                })?;
                store
                    .cache()
                    .remove(&CacheKey::new(local_id.clone(), attachment_id.clone()));
                Some(revoked)
            })
            .await?
            .ok_or_else(|| Error::MessageNotFound(local_id.to_string()))?;
        for url in revoked {
            store.blobs().revoke(&url);
        }

        info!(%local_id, attachment = %attachment_id, "Attachment removed");
        Ok(())
    }
}

/// Escapes `value` for use inside a double-quoted HTML attribute.
fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Whether `mime_type` can be shown inline.
#[must_use]
pub fn is_embeddable(mime_type: &str) -> bool {
    EMBEDDABLE_TYPES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(mime_type.trim()))
}
