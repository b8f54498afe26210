//! Encrypted attachment packets.

use bytes::Bytes;

/// Result of encrypting an attachment for upload.
#[derive(Debug, Clone)]
pub struct Packets {
    /// Original filename.
    pub filename: String,
    /// MIME type.
    pub mime_type: String,
    /// Plaintext size in bytes.
    pub size: u64,
    /// Whether the attachment is inline.
    pub inline: bool,
    /// Detached signature over the plaintext, if signed.
    pub signature: Option<Bytes>,
    /// Plaintext kept for local preview.
    pub preview: Bytes,
    /// Key packet for the first recipient key.
    pub key_packet: Bytes,
    /// Encrypted payload.
    pub data_packet: Bytes,
}

/// Stored attachment ciphertext to decrypt.
#[derive(Debug, Clone)]
pub struct EncryptedAttachment {
    /// Key packets.
    pub key_packets: Bytes,
    /// Encrypted payload.
    pub data_packet: Bytes,
    /// MIME type of the plaintext.
    pub mime_type: String,
}

/// Decrypted attachment content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plaintext {
    /// Plaintext bytes.
    pub data: Bytes,
    /// MIME type.
    pub mime_type: String,
}
