//! Transfer and header decoding.
//!
//! Decrypted payloads only ever need to be read, so this module decodes
//! Base64, Quoted-Printable and RFC 2047 encoded words.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Decodes Base64 data, ignoring embedded whitespace and line breaks.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Decodes Quoted-Printable data (RFC 2045) into raw bytes.
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte != b'=' {
            result.push(byte);
            i += 1;
            continue;
        }

        // Soft line break
        match data.get(i + 1..) {
            Some([b'\r', b'\n', ..]) => {
                i += 3;
                continue;
            }
            Some([b'\n', ..]) => {
                i += 2;
                continue;
            }
            _ => {}
        }

        let hex = data
            .get(i + 1..i + 3)
            .ok_or_else(|| Error::InvalidEncoding("Incomplete escape sequence".to_string()))?;
        let hex = std::str::from_utf8(hex)
            .map_err(|_| Error::InvalidEncoding("Non-ASCII escape sequence".to_string()))?;
        let decoded = u8::from_str_radix(hex, 16)
            .map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))?;
        result.push(decoded);
        i += 3;
    }

    Ok(result)
}

/// Decodes every RFC 2047 encoded word in a header value.
///
/// Plain text between encoded words is kept; whitespace separating two
/// adjacent encoded words is dropped as the RFC requires.
///
/// # Errors
///
/// Returns an error if an encoded word uses an unknown encoding or
/// carries an invalid payload.
pub fn decode_rfc2047(text: &str) -> Result<String> {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    let mut previous_was_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        let Some((decoded, consumed)) = decode_encoded_word(candidate)? else {
            output.push_str(before);
            output.push_str("=?");
            rest = &candidate[2..];
            previous_was_word = false;
            continue;
        };

        if !(previous_was_word && before.trim().is_empty()) {
            output.push_str(before);
        }
        output.push_str(&decoded);
        rest = &candidate[consumed..];
        previous_was_word = true;
    }

    output.push_str(rest);
    Ok(output)
}

/// Decodes one `=?charset?enc?text?=` word at the start of `input`.
///
/// Returns the decoded text and the number of bytes consumed, or `None`
/// when `input` does not start with a well-formed encoded word.
fn decode_encoded_word(input: &str) -> Result<Option<(String, usize)>> {
    let inner = &input[2..];
    let mut fields = inner.splitn(3, '?');
    let (Some(_charset), Some(encoding), Some(tail)) = (fields.next(), fields.next(), fields.next())
    else {
        return Ok(None);
    };
    let Some(end) = tail.find("?=") else {
        return Ok(None);
    };
    let payload = &tail[..end];
    let consumed = input.len() - tail.len() + end + 2;

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => decode_base64(payload.as_bytes())?,
        "Q" => decode_quoted_printable(payload.replace('_', " ").as_bytes())?,
        other => {
            return Err(Error::InvalidEncoding(format!("Unknown encoding: {other}")));
        }
    };

    Ok(Some((String::from_utf8_lossy(&bytes).into_owned(), consumed)))
}
