//! Attachment encryption, decryption and loading.

mod crypto;
mod error;
mod loader;

pub use crypto::{AttachmentCrypto, AttachmentFile};
pub use error::{AttachmentError, UploadError, ValidationError};
pub use loader::AttachmentLoader;
