//! Collaborators outside the pipeline: transport, key directory, notifier.
//!
//! Each comes with an in-memory implementation usable in process.

mod directory;
mod notify;
mod transport;

pub use directory::{
    DirectoryError, EncryptionPreferences, KeyDirectory, PgpScheme, StaticDirectory,
};
pub use notify::{LogNotifier, Notification, NotificationLevel, Notifier, RecordingNotifier};
pub use transport::{InMemoryTransport, Transport, TransportError, UploadRequest};
