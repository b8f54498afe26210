//! Deterministic crypto double for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::crypto::{
    CryptoError, CryptoProvider, DecryptContext, DecryptedData, KeyId, PrivateKey, PublicKey,
    SessionKey, Signature, SplitMessage,
};

const MAGIC: &[u8] = b"MOCK";
const SESSION_KEY: [u8; 4] = [0x5a; 4];

/// Key pair whose id is `[seed; 8]`.
pub fn keypair(seed: u8) -> (PublicKey, PrivateKey) {
    let id = KeyId([seed; 8]);
    (PublicKey::new(id, vec![seed]), PrivateKey::new(id, vec![seed]))
}

/// Armored form accepted by [`MockCrypto::parse_public_key`].
pub fn armored(seed: u8) -> Vec<u8> {
    let mut out = b"MOCKKEY:".to_vec();
    out.push(seed);
    out
}

fn sign(data: &[u8], issuer: KeyId) -> Signature {
    let mut bytes = issuer.0.to_vec();
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.update(issuer.0);
    bytes.extend_from_slice(&hasher.finalize());
    Signature::new(issuer, bytes)
}

/// Encrypts `payload` for `recipient` in the mock message format.
pub fn seal(payload: &[u8], recipient: &PublicKey, signer: Option<&PrivateKey>) -> Vec<u8> {
    let mut out = MAGIC.to_vec();
    out.extend_from_slice(&recipient.id().0);
    match signer {
        Some(key) => {
            out.push(1);
            out.extend_from_slice(&key.id().0);
        }
        None => out.push(0),
    }
    out.extend_from_slice(&Sha256::digest(payload));
    out.extend_from_slice(payload);
    out
}

/// Provider double with call counters.
#[derive(Debug, Default)]
pub struct MockCrypto {
    decrypt_calls: AtomicUsize,
    data_packet_calls: AtomicUsize,
    verify_calls: AtomicUsize,
    last_recipients: AtomicUsize,
    fail_verify: AtomicBool,
}

impl MockCrypto {
    pub fn decrypt_count(&self) -> usize {
        self.decrypt_calls.load(Ordering::SeqCst)
    }

    pub fn data_packet_count(&self) -> usize {
        self.data_packet_calls.load(Ordering::SeqCst)
    }

    pub fn verify_count(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn last_recipient_count(&self) -> usize {
        self.last_recipients.load(Ordering::SeqCst)
    }

    pub fn set_fail_verify(&self, fail: bool) {
        self.fail_verify.store(fail, Ordering::SeqCst);
    }
}

fn checked(body: &[u8]) -> Result<&[u8], CryptoError> {
    if body.len() < 32 {
        return Err(CryptoError::Malformed("truncated".into()));
    }
    let (digest, payload) = body.split_at(32);
    if Sha256::digest(payload).as_slice() != digest {
        return Err(CryptoError::Decrypt("checksum mismatch".into()));
    }
    Ok(payload)
}

#[async_trait]
impl CryptoProvider for MockCrypto {
    async fn decrypt_message(
        &self,
        ciphertext: &[u8],
        private_keys: &[PrivateKey],
        _context: &DecryptContext,
    ) -> Result<DecryptedData, CryptoError> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);

        let rest = ciphertext
            .strip_prefix(MAGIC)
            .ok_or_else(|| CryptoError::Malformed("bad magic".into()))?;
        let recipient =
            KeyId::from_slice(rest).ok_or_else(|| CryptoError::Malformed("truncated".into()))?;
        if !private_keys.iter().any(|k| k.id() == recipient) {
            return Err(CryptoError::NoMatchingKey);
        }

        let rest = &rest[8..];
        let (issuer, body) = match rest.first() {
            Some(0) => (None, &rest[1..]),
            Some(1) => {
                let issuer = KeyId::from_slice(&rest[1..])
                    .ok_or_else(|| CryptoError::Malformed("truncated".into()))?;
                (Some(issuer), &rest[9..])
            }
            _ => return Err(CryptoError::Malformed("bad flag".into())),
        };

        let payload = checked(body)?;
        Ok(DecryptedData {
            data: payload.to_vec(),
            signature: issuer.map(|id| sign(payload, id)),
        })
    }

    async fn encrypt_split(
        &self,
        data: &[u8],
        _filename: &str,
        public_keys: &[PublicKey],
        signing_key: Option<&PrivateKey>,
    ) -> Result<SplitMessage, CryptoError> {
        self.last_recipients
            .store(public_keys.len(), Ordering::SeqCst);

        let key_packets = public_keys
            .iter()
            .map(|key| {
                let mut packet = key.id().0.to_vec();
                packet.extend_from_slice(&SESSION_KEY);
                packet
            })
            .collect();

        let mut data_packet = Sha256::digest(data).to_vec();
        data_packet.extend_from_slice(data);

        Ok(SplitMessage {
            key_packets,
            data_packet,
            signature: signing_key.map(|key| sign(data, key.id())),
        })
    }

    async fn decrypt_session_key(
        &self,
        key_packets: &[u8],
        private_keys: &[PrivateKey],
    ) -> Result<SessionKey, CryptoError> {
        let id = KeyId::from_slice(key_packets)
            .ok_or_else(|| CryptoError::Malformed("short key packet".into()))?;
        if !private_keys.iter().any(|k| k.id() == id) {
            return Err(CryptoError::NoMatchingKey);
        }
        Ok(SessionKey::new(key_packets[8..].to_vec()))
    }

    async fn decrypt_data_packet(
        &self,
        data_packet: &[u8],
        session_key: &SessionKey,
    ) -> Result<Vec<u8>, CryptoError> {
        self.data_packet_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        if session_key.as_bytes() != SESSION_KEY {
            return Err(CryptoError::Decrypt("wrong session key".into()));
        }
        checked(data_packet).map(<[u8]>::to_vec)
    }

    async fn verify_detached(
        &self,
        data: &[u8],
        signature: &Signature,
        key: &PublicKey,
        _date: DateTime<Utc>,
    ) -> Result<bool, CryptoError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_verify.load(Ordering::SeqCst) {
            return Err(CryptoError::Malformed("unreadable signature".into()));
        }
        Ok(signature.issuer() == key.id() && sign(data, key.id()) == *signature)
    }

    fn parse_signature(&self, bytes: &[u8]) -> Result<Signature, CryptoError> {
        let issuer = KeyId::from_slice(bytes)
            .ok_or_else(|| CryptoError::Malformed("short signature".into()))?;
        Ok(Signature::new(issuer, bytes.to_vec()))
    }

    fn parse_public_key(&self, bytes: &[u8]) -> Result<PublicKey, CryptoError> {
        match bytes.strip_prefix(b"MOCKKEY:") {
            Some([seed]) => Ok(keypair(*seed).0),
            _ => Err(CryptoError::InvalidKey("not a mock key".into())),
        }
    }
}
