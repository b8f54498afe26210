//! Sender key resolution and recipient send preferences.

mod preferences;
mod resolver;

pub use preferences::{DEFAULT_MIME_TYPE, SendPreferences, send_preferences};
pub use resolver::{KeyResolver, ResolvedKeys};
