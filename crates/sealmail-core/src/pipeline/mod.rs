//! Per-message processing stages: decryption, verification and embedded
//! image resolution.

mod decrypt;
mod embedded;
mod verify;

pub use decrypt::{
    Decrypted, DecryptionOutcome, Decryptor, EMPTY_BODY_PLACEHOLDER, ExtractedAttachment,
};
pub use embedded::EmbeddedResolver;
pub use verify::{VerificationOutcome, Verifier};
