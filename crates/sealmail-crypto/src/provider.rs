//! [`CryptoProvider`] over the sealed packet formats.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature as Ed25519Signature, Signer, Verifier};
use sealmail_core::crypto::{DecryptContext, DecryptedData, SessionKey, Signature, SplitMessage};
use sealmail_core::{CryptoError, CryptoProvider, KeyId, PrivateKey, PublicKey};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::keys;
use crate::packet::{self, SIGNATURE_LEN};

/// X25519 + XChaCha20-Poly1305 + Ed25519 provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct SealedCrypto;

impl SealedCrypto {
    /// Creates a provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Generates a fresh key pair.
    #[must_use]
    pub fn generate_key(&self) -> (PublicKey, PrivateKey) {
        keys::generate()
    }

    /// Encrypts a message body for `public_keys`, embedding a signature
    /// when `signing_key` is given.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no recipient or a key is malformed.
    pub fn encrypt_message(
        &self,
        data: &[u8],
        public_keys: &[PublicKey],
        signing_key: Option<&PrivateKey>,
    ) -> std::result::Result<Vec<u8>, CryptoError> {
        if public_keys.is_empty() {
            return Err(CryptoError::Encrypt("no recipient keys".into()));
        }

        let signature = signing_key.map(|key| sign(data, key)).transpose()?;
        let literal = packet::encode_literal(
            "",
            signature.as_ref().map(Signature::as_bytes),
            data,
        )
        .map_err(encrypt_error)?;

        let session_key = packet::session_key();
        let key_packets = wrap_for(&session_key, public_keys)?;
        let data_packet = packet::seal_data(&session_key, &literal).map_err(encrypt_error)?;

        debug!(
            "Encrypted message ({} bytes) for {} recipients",
            data.len(),
            public_keys.len()
        );
        packet::encode_message(&key_packets, &data_packet).map_err(encrypt_error)
    }
}

fn encrypt_error(e: Error) -> CryptoError {
    match e {
        Error::KeyLength { .. } | Error::Signature(_) => CryptoError::InvalidKey(e.to_string()),
        _ => CryptoError::Encrypt(e.to_string()),
    }
}

fn wrap_for(
    session_key: &packet::SessionKey,
    public_keys: &[PublicKey],
) -> std::result::Result<Vec<Vec<u8>>, CryptoError> {
    public_keys
        .iter()
        .map(|key| packet::wrap_session_key(session_key, key).map_err(encrypt_error))
        .collect()
}

fn sign(data: &[u8], key: &PrivateKey) -> std::result::Result<Signature, CryptoError> {
    let parts = keys::private_parts(key).map_err(|e| CryptoError::Sign(e.to_string()))?;
    let signature = parts.signing.sign(data);

    let mut bytes = Vec::with_capacity(SIGNATURE_LEN);
    bytes.extend_from_slice(&key.id().0);
    bytes.extend_from_slice(&signature.to_bytes());
    Ok(Signature::new(key.id(), bytes))
}

fn parse_signature(bytes: &[u8]) -> Result<Signature> {
    if bytes.len() != SIGNATURE_LEN {
        return Err(Error::Packet(format!(
            "signature must be {SIGNATURE_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    let issuer =
        KeyId::from_slice(bytes).ok_or_else(|| Error::Packet("short signature".into()))?;
    Ok(Signature::new(issuer, bytes.to_vec()))
}

fn to_session_key(key: &SessionKey) -> Result<packet::SessionKey> {
    packet::session_key_from(key.as_bytes())
}

#[async_trait]
impl CryptoProvider for SealedCrypto {
    async fn decrypt_message(
        &self,
        ciphertext: &[u8],
        private_keys: &[PrivateKey],
        context: &DecryptContext,
    ) -> std::result::Result<DecryptedData, CryptoError> {
        let (key_packets, data_packet) = packet::decode_message(ciphertext)?;
        let session_key = packet::unwrap_session_key(key_packets, private_keys)?;
        let literal = packet::decode_literal(&packet::open_data(&session_key, data_packet)?)?;

        let signature = literal
            .signature
            .as_deref()
            .map(parse_signature)
            .transpose()?;
        trace!(
            "Decrypted message from {:?} ({} bytes, signed: {})",
            context.sender,
            literal.data.len(),
            signature.is_some()
        );

        Ok(DecryptedData {
            data: literal.data,
            signature,
        })
    }

    async fn encrypt_split(
        &self,
        data: &[u8],
        filename: &str,
        public_keys: &[PublicKey],
        signing_key: Option<&PrivateKey>,
    ) -> std::result::Result<SplitMessage, CryptoError> {
        if public_keys.is_empty() {
            return Err(CryptoError::Encrypt("no recipient keys".into()));
        }

        let literal = packet::encode_literal(filename, None, data).map_err(encrypt_error)?;
        let session_key = packet::session_key();

        Ok(SplitMessage {
            key_packets: wrap_for(&session_key, public_keys)?,
            data_packet: packet::seal_data(&session_key, &literal).map_err(encrypt_error)?,
            signature: signing_key.map(|key| sign(data, key)).transpose()?,
        })
    }

    async fn decrypt_session_key(
        &self,
        key_packets: &[u8],
        private_keys: &[PrivateKey],
    ) -> std::result::Result<SessionKey, CryptoError> {
        let key = packet::unwrap_session_key(key_packets, private_keys)?;
        Ok(SessionKey::new(key.to_vec()))
    }

    async fn decrypt_data_packet(
        &self,
        data_packet: &[u8],
        session_key: &SessionKey,
    ) -> std::result::Result<Vec<u8>, CryptoError> {
        let key = to_session_key(session_key)?;
        let literal = packet::decode_literal(&packet::open_data(&key, data_packet)?)?;
        Ok(literal.data)
    }

    async fn verify_detached(
        &self,
        data: &[u8],
        signature: &Signature,
        key: &PublicKey,
        _date: DateTime<Utc>,
    ) -> std::result::Result<bool, CryptoError> {
        if signature.issuer() != key.id() {
            return Ok(false);
        }
        let parts = keys::public_parts(key)?;

        let raw = signature
            .as_bytes()
            .get(8..)
            .and_then(|b| <[u8; 64]>::try_from(b).ok())
            .ok_or_else(|| CryptoError::Malformed("bad signature length".into()))?;
        let signature = Ed25519Signature::from_bytes(&raw);

        Ok(parts.verifying.verify(data, &signature).is_ok())
    }

    fn parse_signature(&self, bytes: &[u8]) -> std::result::Result<Signature, CryptoError> {
        Ok(parse_signature(bytes)?)
    }

    fn parse_public_key(&self, bytes: &[u8]) -> std::result::Result<PublicKey, CryptoError> {
        Ok(keys::parse_public_key(bytes)?)
    }
}
