//! Message body decryption.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::crypto::{CryptoProvider, DecryptContext, PrivateKey};
use crate::model::{
    Attachment, AttachmentId, AttachmentSource, Message, MessageError, Plaintext, SignedPayload,
    WireFormat,
};

/// MIME type assumed for a legacy body that declares none.
const LEGACY_DEFAULT_MIME: &str = "text/plain";

/// Shown for a MIME payload without a text body, so it is not mistaken for
/// a failed decryption.
pub const EMPTY_BODY_PLACEHOLDER: &str = "Message content is empty";

/// An attachment found inside a decrypted MIME body, with its content.
#[derive(Debug, Clone)]
pub struct ExtractedAttachment {
    /// Metadata to add to the message.
    pub attachment: Attachment,
    /// Plaintext to seed the cache with.
    pub plaintext: Plaintext,
}

/// Successful decryption of a message body.
#[derive(Debug, Clone)]
pub struct Decrypted {
    /// Display body.
    pub body: String,
    /// MIME type of `body`.
    pub mime_type: String,
    /// Subject protected inside the payload.
    pub subject: Option<String>,
    /// Signature over the decrypted payload.
    pub signature: Option<SignedPayload>,
    /// Attachments extracted from a MIME body.
    pub attachments: Vec<ExtractedAttachment>,
}

/// Result of [`Decryptor::decrypt`].
#[derive(Debug, Clone)]
pub enum DecryptionOutcome {
    /// The body decrypted.
    Decrypted(Decrypted),
    /// The body did not decrypt.
    Failed(MessageError),
}

/// Turns an encrypted message body into display content.
#[derive(Clone)]
pub struct Decryptor {
    crypto: Arc<dyn CryptoProvider>,
}

impl Decryptor {
    /// Creates a decryptor over `crypto`.
    #[must_use]
    pub fn new(crypto: Arc<dyn CryptoProvider>) -> Self {
        Self { crypto }
    }

    /// Decrypts `message` with any of `private_keys`.
    ///
    /// MIME bodies are parsed for body, attachments and protected subject.
    /// Legacy bodies are used as they are.
    pub async fn decrypt(
        &self,
        message: &Message,
        private_keys: &[PrivateKey],
    ) -> DecryptionOutcome {
        let context = DecryptContext {
            date: message.date,
            sender: Some(message.sender.clone()).filter(|s| !s.is_empty()),
        };

        let decrypted = match self
            .crypto
            .decrypt_message(&message.body, private_keys, &context)
            .await
        {
            Ok(decrypted) => decrypted,
            Err(e) => {
                warn!("Failed to decrypt message from {}: {}", message.sender, e);
                return DecryptionOutcome::Failed(MessageError::Decryption(e.to_string()));
            }
        };

        let content = Bytes::from(decrypted.data);
        let signature = decrypted.signature.map(|signature| SignedPayload {
            signature,
            content: content.clone(),
        });

        match message.format {
            WireFormat::Legacy => {
                let mime_type = if message.mime_type.is_empty() {
                    LEGACY_DEFAULT_MIME.to_string()
                } else {
                    message.mime_type.clone()
                };
                DecryptionOutcome::Decrypted(Decrypted {
                    body: String::from_utf8_lossy(&content).into_owned(),
                    mime_type,
                    subject: None,
                    signature,
                    attachments: Vec::new(),
                })
            }
            WireFormat::Mime => match sealmail_mime::extract(&content) {
                Ok(extracted) => {
                    debug!(
                        "Extracted {} attachments from MIME body",
                        extracted.attachments.len()
                    );
                    let (body, mime_type) = if extracted.body.is_empty() {
                        (EMPTY_BODY_PLACEHOLDER.to_string(), LEGACY_DEFAULT_MIME.to_string())
                    } else {
                        (extracted.body, extracted.mime_type.to_string())
                    };
                    DecryptionOutcome::Decrypted(Decrypted {
                        body,
                        mime_type,
                        subject: extracted.protected_subject,
                        signature,
                        attachments: extracted
                            .attachments
                            .into_iter()
                            .enumerate()
                            .map(|(i, part)| to_extracted(i + 1, part))
                            .collect(),
                    })
                }
                Err(e) => {
                    warn!("Decrypted MIME body is invalid: {}", e);
                    DecryptionOutcome::Failed(MessageError::Decryption(format!(
                        "invalid MIME body: {e}"
                    )))
                }
            },
        }
    }
}

fn to_extracted(index: usize, part: sealmail_mime::MimeAttachment) -> ExtractedAttachment {
    let data = Bytes::from(part.data);
    ExtractedAttachment {
        attachment: Attachment {
            id: AttachmentId::embedded(index),
            name: part.filename,
            mime_type: part.mime_type.clone(),
            size: data.len() as u64,
            inline: part.inline,
            content_id: part.content_id,
            key_packets: None,
            signature: None,
            source: AttachmentSource::Embedded,
        },
        plaintext: Plaintext {
            data,
            mime_type: part.mime_type,
        },
    }
}
