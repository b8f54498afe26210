//! MIME part tree parsing.

use crate::content_type::{ContentDisposition, ContentType};
use crate::encoding::{decode_base64, decode_quoted_printable};
use crate::error::{Error, Result};
use crate::header::Headers;

/// Maximum multipart nesting accepted by [`Part::parse`].
pub const MAX_DEPTH: usize = 32;

/// How a leaf body is transfer-encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// `7bit`, `8bit`, `binary` or an unknown value: the bytes are used as
    /// they are.
    Identity,
    /// `base64`.
    Base64,
    /// `quoted-printable`.
    QuotedPrintable,
}

impl TransferEncoding {
    /// Reads a `Content-Transfer-Encoding` header value.
    #[must_use]
    pub fn from_header(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case("base64") {
            Self::Base64
        } else if value.eq_ignore_ascii_case("quoted-printable") {
            Self::QuotedPrintable
        } else {
            Self::Identity
        }
    }

    /// Undoes the encoding of `body`.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` is not valid in this encoding.
    pub fn decode(self, body: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Identity => Ok(body.to_vec()),
            Self::Base64 => decode_base64(body),
            Self::QuotedPrintable => decode_quoted_printable(body),
        }
    }
}

/// A node of a parsed MIME tree.
///
/// Multipart nodes carry their children and an empty body; leaf nodes
/// carry their still-encoded body bytes.
#[derive(Debug, Clone)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Parsed content type (defaults to text/plain).
    pub content_type: ContentType,
    /// Raw (transfer-encoded) body of a leaf part.
    pub body: Vec<u8>,
    /// Children of a multipart part.
    pub children: Vec<Part>,
}

impl Part {
    /// Parses a raw MIME entity (headers, blank line, body).
    ///
    /// Input that does not start with a header block is treated as a
    /// headerless text/plain body.
    ///
    /// # Errors
    ///
    /// Returns an error if a multipart part lacks a boundary, contains no
    /// parts, or nests deeper than [`MAX_DEPTH`].
    pub fn parse(raw: &[u8]) -> Result<Self> {
        Self::parse_at_depth(raw, 0)
    }

    fn parse_at_depth(raw: &[u8], depth: usize) -> Result<Self> {
        if depth > MAX_DEPTH {
            return Err(Error::TooDeep(MAX_DEPTH));
        }

        let (header_block, body) = split_header_block(raw);
        let headers = Headers::parse(&String::from_utf8_lossy(header_block));

        // A malformed content type falls back to the RFC default
        let content_type = headers
            .get("content-type")
            .and_then(|ct| ContentType::parse(ct).ok())
            .unwrap_or_else(ContentType::text_plain);

        if !content_type.is_multipart() {
            return Ok(Self {
                headers,
                content_type,
                body: body.to_vec(),
                children: Vec::new(),
            });
        }

        let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;
        let children = split_multipart(body, boundary)?
            .into_iter()
            .map(|chunk| Self::parse_at_depth(chunk, depth + 1))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            headers,
            content_type,
            body: Vec::new(),
            children,
        })
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::Identity, TransferEncoding::from_header)
    }

    /// Gets the parsed `Content-Disposition`, if any.
    #[must_use]
    pub fn disposition(&self) -> Option<ContentDisposition> {
        self.headers
            .get("content-disposition")
            .map(ContentDisposition::parse)
    }

    /// Returns the filename from the disposition or the content type `name`.
    #[must_use]
    pub fn filename(&self) -> Option<String> {
        self.disposition()
            .and_then(|d| d.filename())
            .or_else(|| self.content_type.name())
            .filter(|name| !name.is_empty())
    }

    /// Decodes the body according to the transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode_body(&self) -> Result<Vec<u8>> {
        self.transfer_encoding().decode(&self.body)
    }

    /// Decodes the body as text, replacing invalid UTF-8 sequences.
    ///
    /// # Errors
    ///
    /// Returns an error if transfer decoding fails.
    pub fn body_text(&self) -> Result<String> {
        let decoded = self.decode_body()?;
        Ok(String::from_utf8_lossy(&decoded).into_owned())
    }
}

/// Splits an entity into its header block and body.
fn split_header_block(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(rest) = raw.strip_prefix(b"\r\n") {
        return (&[], rest);
    }
    if let Some(rest) = raw.strip_prefix(b"\n") {
        return (&[], rest);
    }
    if !starts_with_header_line(raw) {
        return (&[], raw);
    }

    if let Some(idx) = find(raw, b"\r\n\r\n") {
        (&raw[..idx], &raw[idx + 4..])
    } else if let Some(idx) = find(raw, b"\n\n") {
        (&raw[..idx], &raw[idx + 2..])
    } else {
        (raw, &[])
    }
}

/// Checks whether the first line looks like `Name: value`.
fn starts_with_header_line(raw: &[u8]) -> bool {
    let first_line = raw.split(|&b| b == b'\n').next().unwrap_or_default();
    first_line.iter().position(|&b| b == b':').is_some_and(|colon| {
        colon > 0
            && first_line[..colon]
                .iter()
                .all(|&b| b.is_ascii_graphic() && b != b':')
    })
}

/// Splits a multipart body into its parts using the boundary.
///
/// The preamble and epilogue are discarded. A missing closing delimiter is
/// tolerated; the last part then runs to the end of the body.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Result<Vec<&'a [u8]>> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();
    let mut start: Option<usize> = None;
    let mut closed = false;
    let mut pos = 0;

    while pos < body.len() {
        let line_end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |i| pos + i + 1);
        let line = trim_line_ending(&body[pos..line_end]);

        if let Some(rest) = line.strip_prefix(delimiter.as_bytes()) {
            let rest = rest.trim_ascii_end();
            if rest.is_empty() || rest == b"--" {
                if let Some(s) = start.take() {
                    parts.push(trim_line_ending(&body[s..pos]));
                }
                if rest == b"--" {
                    closed = true;
                    break;
                }
                start = Some(line_end);
            }
        }

        pos = line_end;
    }

    if !closed && let Some(s) = start {
        parts.push(&body[s.min(body.len())..]);
    }

    if parts.is_empty() {
        return Err(Error::InvalidMultipart(format!(
            "no parts found for boundary '{boundary}'"
        )));
    }

    Ok(parts)
}

/// Removes one trailing `\n` or `\r\n`.
fn trim_line_ending(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r\n")
        .or_else(|| line.strip_suffix(b"\n"))
        .unwrap_or(line)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
