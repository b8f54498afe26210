//! Extraction of displayable content from a decrypted MIME tree.

use std::fmt;

use crate::content_type::DispositionKind;
use crate::error::Result;
use crate::header::Headers;
use crate::part::Part;

/// Type of the extracted body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyType {
    /// `text/plain` body.
    #[default]
    PlainText,
    /// `text/html` body.
    Html,
}

impl BodyType {
    /// MIME type string for this body type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "text/plain",
            Self::Html => "text/html",
        }
    }
}

impl fmt::Display for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An attachment found inside a decrypted MIME tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeAttachment {
    /// Filename from the disposition or content type (may be generated).
    pub filename: String,
    /// Declared MIME type (`type/subtype`).
    pub mime_type: String,
    /// Content-ID without angle brackets.
    pub content_id: Option<String>,
    /// Whether the part is marked `inline`.
    pub inline: bool,
    /// Decoded bytes.
    pub data: Vec<u8>,
}

/// Everything extracted from one decrypted MIME payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecryptedContent {
    /// The preferred body (HTML when available).
    pub body: String,
    /// Type of `body`.
    pub mime_type: BodyType,
    /// Non-body leaves in document order.
    pub attachments: Vec<MimeAttachment>,
    /// Subject carried inside the encrypted payload, if any.
    pub protected_subject: Option<String>,
}

/// Extracts body, attachments and protected subject from a decrypted payload.
///
/// The first `text/html` body wins over the first `text/plain` body. Leaves
/// with an `attachment` disposition, a filename, or a non-text type become
/// attachments. A `text/rfc822-headers` leaf supplies the protected subject
/// and is not reported as an attachment; otherwise the top-level `Subject`
/// header is used when present.
///
/// # Errors
///
/// Returns an error if the MIME structure cannot be parsed or a body part
/// cannot be transfer-decoded.
pub fn extract(raw: &[u8]) -> Result<DecryptedContent> {
    let root = Part::parse(raw)?;
    let mut collector = Collector::default();
    collector.visit(&root)?;

    let protected_subject = collector
        .protected_subject
        .or_else(|| root.headers.get_decoded("subject"));

    let (body, mime_type) = match (collector.html, collector.plain) {
        (Some(html), _) => (html, BodyType::Html),
        (None, Some(plain)) => (plain, BodyType::PlainText),
        (None, None) => (String::new(), BodyType::PlainText),
    };

    Ok(DecryptedContent {
        body,
        mime_type,
        attachments: collector.attachments,
        protected_subject,
    })
}

#[derive(Default)]
struct Collector {
    html: Option<String>,
    plain: Option<String>,
    attachments: Vec<MimeAttachment>,
    protected_subject: Option<String>,
}

impl Collector {
    fn visit(&mut self, part: &Part) -> Result<()> {
        if part.content_type.is_multipart() {
            for child in &part.children {
                self.visit(child)?;
            }
            return Ok(());
        }

        if part.content_type.is("text", "rfc822-headers") {
            let headers = Headers::parse(&part.body_text()?);
            if self.protected_subject.is_none() {
                self.protected_subject = headers.get_decoded("subject");
            }
            return Ok(());
        }

        let disposition = part.disposition();
        let filename = part.filename();
        let is_body_type =
            part.content_type.is("text", "plain") || part.content_type.is("text", "html");
        let explicit_attachment = disposition
            .as_ref()
            .is_some_and(|d| d.kind == DispositionKind::Attachment);

        if is_body_type && !explicit_attachment && filename.is_none() {
            let text = part.body_text()?;
            let slot = if part.content_type.is("text", "html") {
                &mut self.html
            } else {
                &mut self.plain
            };
            if slot.is_none() {
                *slot = Some(text);
                return Ok(());
            }
        }

        let number = self.attachments.len() + 1;
        self.attachments.push(MimeAttachment {
            filename: filename.unwrap_or_else(|| format!("attachment-{number}")),
            mime_type: part.content_type.essence(),
            content_id: part.headers.content_id(),
            inline: disposition.is_some_and(|d| d.kind == DispositionKind::Inline),
            data: part.decode_body()?,
        });

        Ok(())
    }
}
