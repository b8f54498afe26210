//! Session caches for decrypted content.
//!
//! Nothing here is persisted; both caches live for one session.

mod attachment;
mod blob;

pub use attachment::{AttachmentCache, CacheKey};
pub use blob::{BLOB_URL_PREFIX, Blob, BlobRegistry};
