//! Attachment metadata.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Attachment identifier, unique within one message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttachmentId(String);

impl AttachmentId {
    /// Creates an id from a server or local value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id for the `index`-th attachment extracted from a MIME body.
    #[must_use]
    pub fn embedded(index: usize) -> Self {
        Self(format!("mime-{index}"))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an attachment's content comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachmentSource {
    /// Encrypted packets stored on the server.
    #[default]
    Remote,
    /// Extracted from a decrypted MIME body; plaintext lives in the cache.
    Embedded,
}

/// Attachment metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachment {
    /// Attachment id.
    pub id: AttachmentId,
    /// Display filename.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Whether the attachment is shown inline.
    pub inline: bool,
    /// Content-ID without angle brackets.
    pub content_id: Option<String>,
    /// Key packets for remote attachments.
    pub key_packets: Option<Bytes>,
    /// Detached signature over the plaintext.
    pub signature: Option<Bytes>,
    /// Content origin.
    pub source: AttachmentSource,
}

impl Attachment {
    /// Lowercased filename extension, if any.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }

    /// Whether this looks like an armored public key worth parsing.
    #[must_use]
    pub fn is_key_candidate(&self, size_limit: u64) -> bool {
        self.extension().as_deref() == Some("asc") && self.size < size_limit
    }

    /// Whether `cid` (with or without angle brackets) names this attachment.
    #[must_use]
    pub fn matches_cid(&self, cid: &str) -> bool {
        let cid = cid.trim().trim_start_matches('<').trim_end_matches('>');
        self.content_id.as_deref().is_some_and(|own| own == cid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, size: u64) -> Attachment {
        Attachment {
            name: name.to_string(),
            size,
            ..Attachment::default()
        }
    }

    #[test]
    fn test_key_candidate() {
        assert!(named("key.ASC", 1200).is_key_candidate(50 * 1024));
        assert!(!named("key.asc", 60 * 1024).is_key_candidate(50 * 1024));
        assert!(!named("photo.png", 10).is_key_candidate(50 * 1024));
        assert!(!named("asc", 10).is_key_candidate(50 * 1024));
    }

    #[test]
    fn test_matches_cid() {
        let attachment = Attachment {
            content_id: Some("logo@x".to_string()),
            ..Attachment::default()
        };
        assert!(attachment.matches_cid("logo@x"));
        assert!(attachment.matches_cid("<logo@x>"));
        assert!(!attachment.matches_cid("other@x"));
    }
}
