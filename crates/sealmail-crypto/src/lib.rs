//! # sealmail-crypto
//!
//! A concrete [`CryptoProvider`](sealmail_core::CryptoProvider) for
//! `SealMail`.
//!
//! - **Key wrapping**: ephemeral X25519 agreement, HKDF-SHA256, and
//!   XChaCha20-Poly1305 over a random session key
//! - **Data packets**: XChaCha20-Poly1305 under the session key
//! - **Signatures**: detached Ed25519 over the plaintext
//! - **Armor**: `-----BEGIN SEALMAIL PUBLIC KEY-----` blocks as found in
//!   `.asc` attachments
//!
//! ## Quick Start
//!
//! ```ignore
//! use sealmail_crypto::SealedCrypto;
//!
//! let crypto = SealedCrypto::new();
//! let (public, private) = crypto.generate_key();
//! let sealed = crypto.encrypt_message(b"hello", &[public], Some(&private))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod keys;
pub mod packet;
mod provider;

pub use error::{Error, Result};
pub use keys::{armor_private_key, armor_public_key, parse_private_key, parse_public_key};
pub use provider::SealedCrypto;
