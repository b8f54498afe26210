//! Map of resolved inline images.

use std::collections::HashMap;

use super::attachment::{Attachment, AttachmentId};

/// A resolved inline image.
#[derive(Debug, Clone)]
pub struct EmbeddedInfo {
    /// The attachment the image came from.
    pub attachment: Attachment,
    /// Local URL serving the decrypted bytes.
    pub url: String,
}

/// Resolved inline images keyed by content id.
///
/// Only successfully decrypted attachments appear here.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedMap {
    entries: HashMap<String, EmbeddedInfo>,
}

impl EmbeddedMap {
    /// Adds or replaces the entry for `cid`.
    pub fn insert(&mut self, cid: impl Into<String>, info: EmbeddedInfo) {
        self.entries.insert(cid.into(), info);
    }

    /// Entry for `cid`.
    #[must_use]
    pub fn get(&self, cid: &str) -> Option<&EmbeddedInfo> {
        self.entries.get(cid)
    }

    /// Whether `cid` is resolved.
    #[must_use]
    pub fn contains(&self, cid: &str) -> bool {
        self.entries.contains_key(cid)
    }

    /// Drops the entries backed by `attachment_id`, returning their URLs.
    pub fn remove_attachment(&mut self, attachment_id: &AttachmentId) -> Vec<String> {
        let mut urls = Vec::new();
        self.entries.retain(|_, info| {
            let keep = info.attachment.id != *attachment_id;
            if !keep {
                urls.push(info.url.clone());
            }
            keep
        });
        urls
    }

    /// Drops the entries whose attachment is not in `attachments`,
    /// returning their URLs.
    pub fn retain_attachments(&mut self, attachments: &[Attachment]) -> Vec<String> {
        let mut urls = Vec::new();
        self.entries.retain(|_, info| {
            let keep = attachments.iter().any(|a| a.id == info.attachment.id);
            if !keep {
                urls.push(info.url.clone());
            }
            keep
        });
        urls
    }

    /// Number of resolved images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no image is resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(cid, info)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EmbeddedInfo)> {
        self.entries.iter().map(|(cid, info)| (cid.as_str(), info))
    }

    /// Rewrites `cid:` references in `document` to their local URLs.
    ///
    /// Unresolved references are left as they are.
    #[must_use]
    pub fn apply(&self, document: &str) -> String {
        let mut out = String::with_capacity(document.len());
        let mut rest = document;

        while let Some((start, cid_end)) = next_cid(rest) {
            let cid = &rest[start + 4..cid_end];
            out.push_str(&rest[..start]);
            match self.entries.get(cid) {
                Some(info) => out.push_str(&info.url),
                None => out.push_str(&rest[start..cid_end]),
            }
            rest = &rest[cid_end..];
        }

        out.push_str(rest);
        out
    }
}

/// Content ids referenced by `cid:` URLs in `document`, in first-seen order.
#[must_use]
pub fn find_cid_references(document: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut rest = document;

    while let Some((start, cid_end)) = next_cid(rest) {
        let cid = &rest[start + 4..cid_end];
        if !cid.is_empty() && !found.iter().any(|seen| seen == cid) {
            found.push(cid.to_string());
        }
        rest = &rest[cid_end..];
    }

    found
}

/// Locates the next `cid:` reference, returning the offset of the scheme
/// and the end of the id.
fn next_cid(text: &str) -> Option<(usize, usize)> {
    let lower = text.to_ascii_lowercase();
    let start = lower.find("cid:")?;
    let id_start = start + 4;
    let id_len = text[id_start..]
        .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ')' | '>' | '<'))
        .unwrap_or(text.len() - id_start);
    Some((start, id_start + id_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str, url: &str) -> EmbeddedInfo {
        EmbeddedInfo {
            attachment: Attachment {
                id: AttachmentId::new(id),
                ..Attachment::default()
            },
            url: url.to_string(),
        }
    }

    #[test]
    fn test_find_cid_references() {
        let html = r#"<img src="cid:a@x"><img src='CID:b@x'><div style="background:url(cid:a@x)">"#;
        assert_eq!(find_cid_references(html), vec!["a@x", "b@x"]);
    }

    #[test]
    fn test_find_ignores_empty_reference() {
        assert!(find_cid_references(r#"<img src="cid:">"#).is_empty());
    }

    #[test]
    fn test_apply_rewrites_known_references() {
        let mut map = EmbeddedMap::default();
        map.insert("a@x", info("1", "blob:sealmail/1"));

        let html = r#"<img src="cid:a@x"><img src="cid:missing@x">"#;
        assert_eq!(
            map.apply(html),
            r#"<img src="blob:sealmail/1"><img src="cid:missing@x">"#
        );
    }

    #[test]
    fn test_remove_attachment() {
        let mut map = EmbeddedMap::default();
        map.insert("a@x", info("1", "blob:sealmail/1"));
        map.insert("b@x", info("2", "blob:sealmail/2"));

        let urls = map.remove_attachment(&AttachmentId::new("1"));

        assert_eq!(urls, vec!["blob:sealmail/1"]);
        assert_eq!(map.len(), 1);
        assert!(map.contains("b@x"));
    }

    #[test]
    fn test_retain_attachments_drops_removed() {
        let mut map = EmbeddedMap::default();
        map.insert("a@x", info("1", "blob:sealmail/1"));
        map.insert("b@x", info("2", "blob:sealmail/2"));
        let remaining = vec![Attachment {
            id: AttachmentId::new("2"),
            ..Attachment::default()
        }];

        let urls = map.retain_attachments(&remaining);

        assert_eq!(urls, vec!["blob:sealmail/1"]);
        assert!(!map.contains("a@x"));
        assert!(map.contains("b@x"));
    }
}
