//! Attachment transport.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use crate::model::{Attachment, AttachmentId, AttachmentSource};

/// Errors reported by a [`Transport`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// The server rejected the request.
    #[error("server rejected request ({code}): {message}")]
    Rejected {
        /// Status code.
        code: u16,
        /// Server message.
        message: String,
    },

    /// The attachment does not exist.
    #[error("attachment not found: {0}")]
    NotFound(String),
}

/// An encrypted attachment to store on the server.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Display filename.
    pub filename: String,
    /// Owning message's server id, if saved.
    pub message_id: Option<String>,
    /// Content-ID for inline attachments.
    pub content_id: Option<String>,
    /// MIME type.
    pub mime_type: String,
    /// Plaintext size in bytes.
    pub size: u64,
    /// Whether the attachment is inline.
    pub inline: bool,
    /// Key packet for the recipient key.
    pub key_packets: Bytes,
    /// Encrypted payload.
    pub data_packet: Bytes,
    /// Detached signature.
    pub signature: Option<Bytes>,
}

/// Server-side attachment storage.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stores an encrypted attachment and returns its record.
    async fn upload_attachment(&self, request: UploadRequest) -> Result<Attachment, TransportError>;

    /// Fetches the encrypted data packet of an attachment.
    async fn fetch_attachment(&self, id: &AttachmentId) -> Result<Bytes, TransportError>;

    /// Deletes an attachment.
    async fn remove_attachment(
        &self,
        id: &AttachmentId,
        message_id: Option<&str>,
    ) -> Result<(), TransportError>;
}

/// Process-local [`Transport`] keeping data packets in memory.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    packets: Mutex<HashMap<AttachmentId, Bytes>>,
    failing: Mutex<HashSet<AttachmentId>>,
    next_id: AtomicU64,
    fetches: AtomicUsize,
    uploads: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl InMemoryTransport {
    /// Creates an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a data packet under `id`.
    pub fn insert(&self, id: AttachmentId, data_packet: impl Into<Bytes>) {
        self.packets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, data_packet.into());
    }

    /// Makes every later fetch of `id` fail with a network error.
    pub fn fail_fetches_of(&self, id: AttachmentId) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
    }

    /// Delays every request by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Number of fetch requests served so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of upload requests received so far.
    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn upload_attachment(&self, request: UploadRequest) -> Result<Attachment, TransportError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.wait().await;

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = AttachmentId::new(format!("att-{n}"));
        self.insert(id.clone(), request.data_packet);
        debug!("Stored attachment {} ({} bytes)", id, request.size);

        Ok(Attachment {
            id,
            name: request.filename,
            mime_type: request.mime_type,
            size: request.size,
            inline: request.inline,
            content_id: request.content_id,
            key_packets: Some(request.key_packets),
            signature: request.signature,
            source: AttachmentSource::Remote,
        })
    }

    async fn fetch_attachment(&self, id: &AttachmentId) -> Result<Bytes, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.wait().await;

        if self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
        {
            return Err(TransportError::Network(format!("fetch of {id} failed")));
        }

        self.packets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(id.to_string()))
    }

    async fn remove_attachment(
        &self,
        id: &AttachmentId,
        _message_id: Option<&str>,
    ) -> Result<(), TransportError> {
        self.wait().await;
        self.packets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| TransportError::NotFound(id.to_string()))
    }
}
