//! Cryptographic capability consumed by the pipeline.
//!
//! The pipeline never touches key material directly. It hands opaque
//! [`PublicKey`]/[`PrivateKey`] handles to a [`CryptoProvider`] and gets
//! plaintext, packets, or verification results back.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use zeroize::Zeroizing;

/// Length of a [`KeyId`] in bytes.
pub const KEY_ID_LEN: usize = 8;

/// Short identifier of a key pair.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(pub [u8; KEY_ID_LEN]);

impl KeyId {
    /// Reads a key id from the first eight bytes of `bytes`.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes
            .get(..KEY_ID_LEN)
            .and_then(|b| b.try_into().ok())
            .map(Self)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({self})")
    }
}

/// Public half of a key pair, in provider-specific encoding.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    id: KeyId,
    material: Arc<[u8]>,
}

impl PublicKey {
    /// Wraps provider-encoded public key material.
    #[must_use]
    pub fn new(id: KeyId, material: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id,
            material: material.into(),
        }
    }

    /// Key identifier.
    #[must_use]
    pub const fn id(&self) -> KeyId {
        self.id
    }

    /// Provider-encoded key material.
    #[must_use]
    pub fn material(&self) -> &[u8] {
        &self.material
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey").field("id", &self.id).finish()
    }
}

/// Private half of a key pair. Material is wiped on drop.
#[derive(Clone)]
pub struct PrivateKey {
    id: KeyId,
    material: Arc<Zeroizing<Vec<u8>>>,
}

impl PrivateKey {
    /// Wraps provider-encoded private key material.
    #[must_use]
    pub fn new(id: KeyId, material: Vec<u8>) -> Self {
        Self {
            id,
            material: Arc::new(Zeroizing::new(material)),
        }
    }

    /// Key identifier (same as the matching public key).
    #[must_use]
    pub const fn id(&self) -> KeyId {
        self.id
    }

    /// Provider-encoded key material.
    #[must_use]
    pub fn material(&self) -> &[u8] {
        &self.material
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("id", &self.id)
            .field("material", &"[REDACTED]")
            .finish()
    }
}

/// A detached signature together with the id of the key that made it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    issuer: KeyId,
    bytes: Arc<[u8]>,
}

impl Signature {
    /// Creates a signature from its issuer and serialized form.
    #[must_use]
    pub fn new(issuer: KeyId, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            issuer,
            bytes: bytes.into(),
        }
    }

    /// Id of the signing key.
    #[must_use]
    pub const fn issuer(&self) -> KeyId {
        self.issuer
    }

    /// Serialized signature, as produced by the provider.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Symmetric key recovered from a key packet. Wiped on drop.
pub struct SessionKey(Zeroizing<Vec<u8>>);

impl SessionKey {
    /// Wraps raw session key bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey([REDACTED])")
    }
}

/// Context passed along with a message decryption.
#[derive(Debug, Clone)]
pub struct DecryptContext {
    /// Message date, used as the reference time for key validity.
    pub date: DateTime<Utc>,
    /// Sender address, if known.
    pub sender: Option<String>,
}

/// Plaintext of a whole message, with its embedded signature if any.
#[derive(Debug, Clone)]
pub struct DecryptedData {
    /// Decrypted payload.
    pub data: Vec<u8>,
    /// Signature over `data`, if the sender signed it.
    pub signature: Option<Signature>,
}

/// Output of a split encryption: key packets, one data packet, and a
/// detached signature over the plaintext.
#[derive(Debug, Clone)]
pub struct SplitMessage {
    /// One key packet per recipient key, in recipient order.
    pub key_packets: Vec<Vec<u8>>,
    /// Symmetrically encrypted payload.
    pub data_packet: Vec<u8>,
    /// Detached signature, when a signing key was supplied.
    pub signature: Option<Signature>,
}

/// Errors reported by a [`CryptoProvider`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// None of the supplied private keys can open the key packets.
    #[error("no matching private key")]
    NoMatchingKey,

    /// Decryption failed (wrong key or tampered data).
    #[error("decryption failed: {0}")]
    Decrypt(String),

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encrypt(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Sign(String),

    /// Key material could not be parsed.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Input is not in the expected packet format.
    #[error("malformed data: {0}")]
    Malformed(String),
}

/// The cryptographic operations the pipeline relies on.
///
/// Session-key recovery and data-packet decryption are separate calls so
/// that callers can tell a key mismatch apart from corrupted content.
#[async_trait]
pub trait CryptoProvider: Send + Sync {
    /// Decrypts a whole message for any of `private_keys`.
    async fn decrypt_message(
        &self,
        ciphertext: &[u8],
        private_keys: &[PrivateKey],
        context: &DecryptContext,
    ) -> Result<DecryptedData, CryptoError>;

    /// Encrypts `data` into one key packet per recipient plus a data packet.
    ///
    /// `filename` is bound into the data packet.
    async fn encrypt_split(
        &self,
        data: &[u8],
        filename: &str,
        public_keys: &[PublicKey],
        signing_key: Option<&PrivateKey>,
    ) -> Result<SplitMessage, CryptoError>;

    /// Recovers the session key from key packets.
    async fn decrypt_session_key(
        &self,
        key_packets: &[u8],
        private_keys: &[PrivateKey],
    ) -> Result<SessionKey, CryptoError>;

    /// Decrypts a data packet with a recovered session key.
    async fn decrypt_data_packet(
        &self,
        data_packet: &[u8],
        session_key: &SessionKey,
    ) -> Result<Vec<u8>, CryptoError>;

    /// Checks `signature` over `data` against one public key.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not verify.
    async fn verify_detached(
        &self,
        data: &[u8],
        signature: &Signature,
        key: &PublicKey,
        date: DateTime<Utc>,
    ) -> Result<bool, CryptoError>;

    /// Parses a serialized detached signature.
    fn parse_signature(&self, bytes: &[u8]) -> Result<Signature, CryptoError>;

    /// Parses an armored or binary public key.
    fn parse_public_key(&self, bytes: &[u8]) -> Result<PublicKey, CryptoError>;
}
