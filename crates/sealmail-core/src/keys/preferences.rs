//! Send preferences derived from directory results.

use crate::crypto::PublicKey;
use crate::model::{Message, WireFormat};
use crate::remote::{EncryptionPreferences, PgpScheme};

/// Default MIME type when neither the directory nor the message sets one.
pub const DEFAULT_MIME_TYPE: &str = "text/html";

/// How an outgoing message to one recipient should be packaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendPreferences {
    /// Encrypt to the recipient.
    pub encrypt: bool,
    /// Sign the message.
    pub sign: bool,
    /// Packaging scheme.
    pub scheme: PgpScheme,
    /// Body MIME type.
    pub mime_type: String,
    /// The single key to encrypt to, if any.
    pub public_key: Option<PublicKey>,
    /// Whether `public_key` is pinned by the user.
    pub is_public_key_pinned: bool,
    /// Whether the directory published any key.
    pub has_api_keys: bool,
    /// Whether the user pinned any key.
    pub has_pinned_keys: bool,
    /// Whether the contact signature was verified.
    pub is_contact_signature_verified: Option<bool>,
    /// Non-fatal problems found while resolving.
    pub warnings: Vec<String>,
}

/// Derives send preferences for one recipient.
///
/// A message that asks to be signed overrides the directory's `sign`.
/// Scheme and MIME type fall back to the message's when the directory has
/// none. Only the first key is exposed, pinned keys first.
#[must_use]
pub fn send_preferences(prefs: &EncryptionPreferences, message: Option<&Message>) -> SendPreferences {
    let sign = prefs.sign || message.is_some_and(|m| m.sign);

    let scheme = prefs.scheme.unwrap_or_else(|| match message.map(|m| m.format) {
        Some(WireFormat::Legacy) => PgpScheme::PgpInline,
        Some(WireFormat::Mime) | None => PgpScheme::PgpMime,
    });

    let mime_type = prefs
        .mime_type
        .clone()
        .or_else(|| {
            message
                .map(|m| m.mime_type.clone())
                .filter(|mime| !mime.is_empty())
        })
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

    let public_key = prefs
        .pinned_keys
        .first()
        .or_else(|| prefs.api_keys.first())
        .cloned();

    SendPreferences {
        encrypt: prefs.encrypt,
        sign,
        scheme,
        mime_type,
        public_key,
        is_public_key_pinned: !prefs.pinned_keys.is_empty(),
        has_api_keys: !prefs.api_keys.is_empty(),
        has_pinned_keys: !prefs.pinned_keys.is_empty(),
        is_contact_signature_verified: prefs.is_contact_signature_verified,
        warnings: prefs.warnings.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::keypair;

    #[test]
    fn test_message_sign_flag_overrides() {
        let prefs = EncryptionPreferences::default();
        let message = Message {
            sign: true,
            ..Message::default()
        };

        assert!(send_preferences(&prefs, Some(&message)).sign);
        assert!(!send_preferences(&prefs, None).sign);
    }

    #[test]
    fn test_fallbacks_from_message() {
        let prefs = EncryptionPreferences::default();
        let message = Message {
            format: WireFormat::Legacy,
            mime_type: "text/plain".into(),
            ..Message::default()
        };

        let result = send_preferences(&prefs, Some(&message));
        assert_eq!(result.scheme, PgpScheme::PgpInline);
        assert_eq!(result.mime_type, "text/plain");

        let bare = send_preferences(&prefs, None);
        assert_eq!(bare.scheme, PgpScheme::PgpMime);
        assert_eq!(bare.mime_type, DEFAULT_MIME_TYPE);
    }

    #[test]
    fn test_only_first_key_exposed() {
        let (pinned, _) = keypair(1);
        let (api1, _) = keypair(2);
        let (api2, _) = keypair(3);

        let prefs = EncryptionPreferences {
            api_keys: vec![api1.clone(), api2],
            ..EncryptionPreferences::default()
        };
        let result = send_preferences(&prefs, None);
        assert_eq!(result.public_key, Some(api1));
        assert!(!result.is_public_key_pinned);

        let prefs = EncryptionPreferences {
            pinned_keys: vec![pinned.clone()],
            ..prefs
        };
        let result = send_preferences(&prefs, None);
        assert_eq!(result.public_key, Some(pinned));
        assert!(result.is_public_key_pinned);
        assert!(result.has_api_keys);
    }
}
