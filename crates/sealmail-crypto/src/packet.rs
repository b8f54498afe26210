//! Packet formats.
//!
//! ```text
//! key packet   = version(1) | recipient id(8) | ephemeral X25519(32) | nonce(24) | wrapped key(48)
//! data packet  = version(1) | nonce(24) | XChaCha20-Poly1305(literal)
//! literal      = flags(1) | name length(2, BE) | name | [signature(72)] | data
//! message      = "SMSG" | version(1) | key packet count(1) | key packets | data packet
//! ```
//!
//! The wrapping key of a key packet is HKDF-SHA256 over the X25519 shared
//! secret, salted with the ephemeral and recipient public keys.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use sealmail_core::{KeyId, PrivateKey, PublicKey};
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519Public};
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::keys;

/// Packet format version.
pub const VERSION: u8 = 1;

/// Session key length.
pub const SESSION_KEY_LEN: usize = 32;

/// Length of one key packet.
pub const KEY_PACKET_LEN: usize = 1 + 8 + 32 + NONCE_LEN + SESSION_KEY_LEN + TAG_LEN;

/// Length of a serialized signature: issuer id plus Ed25519 signature.
pub const SIGNATURE_LEN: usize = 8 + 64;

const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;
const MAGIC: &[u8] = b"SMSG";
const KEY_WRAP_INFO: &[u8] = b"sealmail key packet v1";
const FLAG_SIGNED: u8 = 0x01;

/// Symmetric key of one message or attachment.
pub type SessionKey = Zeroizing<[u8; SESSION_KEY_LEN]>;

/// Generates a random session key.
#[must_use]
pub fn session_key() -> SessionKey {
    let mut key = Zeroizing::new([0u8; SESSION_KEY_LEN]);
    OsRng.fill_bytes(&mut key[..]);
    key
}

fn nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

fn cipher(key: &[u8; SESSION_KEY_LEN]) -> XChaCha20Poly1305 {
    XChaCha20Poly1305::new(Key::from_slice(key))
}

fn wrap_key(
    shared: &[u8; 32],
    ephemeral: &X25519Public,
    recipient: &X25519Public,
) -> Result<SessionKey> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral.as_bytes());
    salt[32..].copy_from_slice(recipient.as_bytes());

    let mut okm = Zeroizing::new([0u8; SESSION_KEY_LEN]);
    Hkdf::<Sha256>::new(Some(&salt[..]), shared)
        .expand(KEY_WRAP_INFO, &mut okm[..])
        .map_err(|e| Error::Packet(e.to_string()))?;
    Ok(okm)
}

/// Wraps `session_key` for `recipient`.
///
/// # Errors
///
/// Returns an error if the recipient key is malformed.
pub fn wrap_session_key(session_key: &SessionKey, recipient: &PublicKey) -> Result<Vec<u8>> {
    let parts = keys::public_parts(recipient)?;
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = X25519Public::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&parts.encryption);

    let key = wrap_key(shared.as_bytes(), &ephemeral_public, &parts.encryption)?;
    let nonce = nonce();
    let wrapped = cipher(&key)
        .encrypt(XNonce::from_slice(&nonce), &session_key[..])
        .map_err(|_| Error::Aead)?;

    let mut packet = Vec::with_capacity(KEY_PACKET_LEN);
    packet.push(VERSION);
    packet.extend_from_slice(&recipient.id().0);
    packet.extend_from_slice(ephemeral_public.as_bytes());
    packet.extend_from_slice(&nonce);
    packet.extend_from_slice(&wrapped);
    Ok(packet)
}

/// Recipient ids of concatenated key packets.
///
/// # Errors
///
/// Returns an error if `packets` is not a whole number of key packets.
pub fn recipients(packets: &[u8]) -> Result<Vec<KeyId>> {
    key_packets(packets)?
        .map(|p| KeyId::from_slice(&p[1..]).ok_or_else(|| Error::Packet("short key packet".into())))
        .collect()
}

fn key_packets(packets: &[u8]) -> Result<std::slice::ChunksExact<'_, u8>> {
    if packets.is_empty() || packets.len() % KEY_PACKET_LEN != 0 {
        return Err(Error::Packet(format!(
            "key packets must be a multiple of {KEY_PACKET_LEN} bytes, got {}",
            packets.len()
        )));
    }
    Ok(packets.chunks_exact(KEY_PACKET_LEN))
}

/// Recovers the session key from concatenated key packets.
///
/// # Errors
///
/// Returns [`Error::NoMatchingKey`] if no packet is addressed to any of
/// `private_keys`, and [`Error::Aead`] if the addressed packet does not open.
pub fn unwrap_session_key(packets: &[u8], private_keys: &[PrivateKey]) -> Result<SessionKey> {
    for packet in key_packets(packets)? {
        if packet[0] != VERSION {
            return Err(Error::Packet(format!("unsupported version {}", packet[0])));
        }
        let (recipient, rest) = packet[1..].split_at(8);
        let Some(key) = private_keys.iter().find(|k| k.id().0 == recipient) else {
            continue;
        };

        let (ephemeral, rest) = rest.split_at(32);
        let (nonce, wrapped) = rest.split_at(NONCE_LEN);
        let mut ephemeral_bytes = [0u8; 32];
        ephemeral_bytes.copy_from_slice(ephemeral);
        let ephemeral = X25519Public::from(ephemeral_bytes);

        let parts = keys::private_parts(key)?;
        let shared = parts.encryption.diffie_hellman(&ephemeral);
        let own_public = X25519Public::from(&parts.encryption);
        let wrapping = wrap_key(shared.as_bytes(), &ephemeral, &own_public)?;

        let opened = Zeroizing::new(
            cipher(&wrapping)
                .decrypt(XNonce::from_slice(nonce), wrapped)
                .map_err(|_| Error::Aead)?,
        );
        return session_key_from(&opened);
    }
    Err(Error::NoMatchingKey)
}

/// Session key from raw bytes.
///
/// # Errors
///
/// Returns an error if `bytes` has the wrong length.
pub fn session_key_from(bytes: &[u8]) -> Result<SessionKey> {
    if bytes.len() != SESSION_KEY_LEN {
        return Err(Error::KeyLength {
            expected: SESSION_KEY_LEN,
            actual: bytes.len(),
        });
    }
    let mut key = Zeroizing::new([0u8; SESSION_KEY_LEN]);
    key.copy_from_slice(bytes);
    Ok(key)
}

/// Encrypts `literal` under `session_key`.
///
/// # Errors
///
/// Returns an error if encryption fails.
pub fn seal_data(session_key: &SessionKey, literal: &[u8]) -> Result<Vec<u8>> {
    let nonce = nonce();
    let ciphertext = cipher(session_key)
        .encrypt(XNonce::from_slice(&nonce), literal)
        .map_err(|_| Error::Aead)?;

    let mut packet = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
    packet.push(VERSION);
    packet.extend_from_slice(&nonce);
    packet.extend_from_slice(&ciphertext);
    Ok(packet)
}

/// Decrypts a data packet.
///
/// # Errors
///
/// Returns [`Error::Aead`] if the packet was tampered with or the key is
/// wrong.
pub fn open_data(session_key: &SessionKey, packet: &[u8]) -> Result<Vec<u8>> {
    if packet.len() < 1 + NONCE_LEN + TAG_LEN {
        return Err(Error::Packet("data packet too short".into()));
    }
    if packet[0] != VERSION {
        return Err(Error::Packet(format!("unsupported version {}", packet[0])));
    }
    let (nonce, ciphertext) = packet[1..].split_at(NONCE_LEN);
    cipher(session_key)
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::Aead)
}

/// Decoded literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    /// Filename bound into the packet, empty for message bodies.
    pub filename: String,
    /// Serialized signature over `data`, if embedded.
    pub signature: Option<Vec<u8>>,
    /// Payload.
    pub data: Vec<u8>,
}

/// Frames a literal.
///
/// # Errors
///
/// Returns an error if the filename is too long or the signature has the
/// wrong size.
pub fn encode_literal(filename: &str, signature: Option<&[u8]>, data: &[u8]) -> Result<Vec<u8>> {
    let name_len = u16::try_from(filename.len())
        .map_err(|_| Error::Packet("filename too long".into()))?;
    if signature.is_some_and(|s| s.len() != SIGNATURE_LEN) {
        return Err(Error::Packet("bad signature length".into()));
    }

    let mut out = Vec::with_capacity(3 + filename.len() + SIGNATURE_LEN + data.len());
    out.push(if signature.is_some() { FLAG_SIGNED } else { 0 });
    out.extend_from_slice(&name_len.to_be_bytes());
    out.extend_from_slice(filename.as_bytes());
    if let Some(signature) = signature {
        out.extend_from_slice(signature);
    }
    out.extend_from_slice(data);
    Ok(out)
}

/// Parses a framed literal.
///
/// # Errors
///
/// Returns an error if the framing is truncated.
pub fn decode_literal(bytes: &[u8]) -> Result<Literal> {
    let truncated = || Error::Packet("truncated literal".into());

    let (&flags, rest) = bytes.split_first().ok_or_else(truncated)?;
    let (len, rest) = rest.split_at_checked(2).ok_or_else(truncated)?;
    let name_len = usize::from(u16::from_be_bytes([len[0], len[1]]));
    let (name, rest) = rest.split_at_checked(name_len).ok_or_else(truncated)?;

    let (signature, data) = if flags & FLAG_SIGNED == 0 {
        (None, rest)
    } else {
        let (signature, data) = rest.split_at_checked(SIGNATURE_LEN).ok_or_else(truncated)?;
        (Some(signature.to_vec()), data)
    };

    Ok(Literal {
        filename: String::from_utf8_lossy(name).into_owned(),
        signature,
        data: data.to_vec(),
    })
}

/// Assembles a full message.
///
/// # Errors
///
/// Returns an error if there are no key packets or more than 255.
pub fn encode_message(key_packets: &[Vec<u8>], data_packet: &[u8]) -> Result<Vec<u8>> {
    let count = u8::try_from(key_packets.len())
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| Error::Packet(format!("{} key packets", key_packets.len())))?;

    let mut out = Vec::with_capacity(
        MAGIC.len() + 2 + key_packets.len() * KEY_PACKET_LEN + data_packet.len(),
    );
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.push(count);
    for packet in key_packets {
        out.extend_from_slice(packet);
    }
    out.extend_from_slice(data_packet);
    Ok(out)
}

/// Splits a full message into concatenated key packets and the data packet.
///
/// # Errors
///
/// Returns an error if the header is not recognized or truncated.
pub fn decode_message(bytes: &[u8]) -> Result<(&[u8], &[u8])> {
    let rest = bytes
        .strip_prefix(MAGIC)
        .ok_or_else(|| Error::Packet("not a sealed message".into()))?;
    let [version, count, rest @ ..] = rest else {
        return Err(Error::Packet("truncated header".into()));
    };
    if *version != VERSION {
        return Err(Error::Packet(format!("unsupported version {version}")));
    }
    rest.split_at_checked(usize::from(*count) * KEY_PACKET_LEN)
        .ok_or_else(|| Error::Packet("truncated key packets".into()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::keys::generate;

    #[test]
    fn test_key_packet_length() {
        let (public, _) = generate();
        let packet = wrap_session_key(&session_key(), &public).unwrap();
        assert_eq!(packet.len(), KEY_PACKET_LEN);
        assert_eq!(recipients(&packet).unwrap(), vec![public.id()]);
    }

    #[test]
    fn test_unwrap_picks_addressed_packet() {
        let (alice, alice_private) = generate();
        let (bob, bob_private) = generate();
        let key = session_key();

        let mut packets = wrap_session_key(&key, &alice).unwrap();
        packets.extend(wrap_session_key(&key, &bob).unwrap());

        assert_eq!(*unwrap_session_key(&packets, &[bob_private]).unwrap(), *key);
        assert_eq!(*unwrap_session_key(&packets, &[alice_private]).unwrap(), *key);
    }

    #[test]
    fn test_unwrap_without_matching_key() {
        let (alice, _) = generate();
        let (_, stranger) = generate();
        let packet = wrap_session_key(&session_key(), &alice).unwrap();

        assert!(matches!(
            unwrap_session_key(&packet, &[stranger]),
            Err(Error::NoMatchingKey)
        ));
    }

    #[test]
    fn test_tampered_key_packet() {
        let (alice, private) = generate();
        let mut packet = wrap_session_key(&session_key(), &alice).unwrap();
        *packet.last_mut().unwrap() ^= 0x01;

        assert!(matches!(
            unwrap_session_key(&packet, &[private]),
            Err(Error::Aead)
        ));
    }

    #[test]
    fn test_data_packet() {
        let key = session_key();
        let mut packet = seal_data(&key, b"payload").unwrap();
        assert_eq!(open_data(&key, &packet).unwrap(), b"payload");

        packet[30] ^= 0xff;
        assert!(matches!(open_data(&key, &packet), Err(Error::Aead)));
        assert!(matches!(open_data(&session_key(), &packet), Err(Error::Aead)));
    }

    #[test]
    fn test_literal_framing() {
        let signature = [7u8; SIGNATURE_LEN];
        let bytes = encode_literal("report.pdf", Some(&signature), b"data").unwrap();

        let literal = decode_literal(&bytes).unwrap();
        assert_eq!(literal.filename, "report.pdf");
        assert_eq!(literal.signature.as_deref(), Some(&signature[..]));
        assert_eq!(literal.data, b"data");

        assert!(decode_literal(&bytes[..5]).is_err());
        assert!(encode_literal("", Some(b"short"), b"").is_err());
    }

    #[test]
    fn test_message_framing() {
        let (public, _) = generate();
        let key_packet = wrap_session_key(&session_key(), &public).unwrap();

        let message = encode_message(&[key_packet.clone()], b"data").unwrap();
        let (packets, data) = decode_message(&message).unwrap();

        assert_eq!(packets, &key_packet[..]);
        assert_eq!(data, b"data");
        assert!(encode_message(&[], b"data").is_err());
        assert!(decode_message(b"SMSG").is_err());
        assert!(decode_message(b"MOCK\x01\x00").is_err());
    }
}
