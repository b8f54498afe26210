//! Resolution of `cid:` images to local URLs.

use futures::future::join_all;
use tracing::{debug, warn};

use crate::attachment::AttachmentLoader;
use crate::cache::BlobRegistry;
use crate::crypto::PrivateKey;
use crate::model::{Attachment, EmbeddedInfo, EmbeddedMap, LocalId, find_cid_references};

/// Builds the embedded-image map of a message.
#[derive(Clone)]
pub struct EmbeddedResolver {
    loader: AttachmentLoader,
    blobs: BlobRegistry,
}

impl EmbeddedResolver {
    /// Creates a resolver publishing decrypted images into `blobs`.
    #[must_use]
    pub const fn new(loader: AttachmentLoader, blobs: BlobRegistry) -> Self {
        Self { loader, blobs }
    }

    /// Resolves every `cid:` reference in `document` that names one of
    /// `attachments`.
    ///
    /// Nothing is fetched unless `show` is set. Each image loads
    /// independently; one that fails is left out of the map.
    pub async fn resolve(
        &self,
        local_id: &LocalId,
        document: &str,
        attachments: &[Attachment],
        private_keys: &[PrivateKey],
        show: bool,
    ) -> EmbeddedMap {
        let mut map = EmbeddedMap::default();
        if !show {
            debug!("Embedded images of {} are not shown", local_id);
            return map;
        }

        let wanted: Vec<(String, &Attachment)> = find_cid_references(document)
            .into_iter()
            .filter_map(|cid| {
                let attachment = attachments.iter().find(|a| a.matches_cid(&cid))?;
                Some((cid, attachment))
            })
            .collect();

        let loads = wanted.into_iter().map(|(cid, attachment)| async move {
            match self.loader.load(local_id, attachment, private_keys).await {
                Ok(plaintext) => {
                    let url = self
                        .blobs
                        .register(local_id, plaintext.data, &plaintext.mime_type);
                    Some((
                        cid,
                        EmbeddedInfo {
                            attachment: attachment.clone(),
                            url,
                        },
                    ))
                }
                Err(e) => {
                    warn!("Could not load embedded image {}: {}", cid, e);
                    None
                }
            }
        });

        for (cid, info) in join_all(loads).await.into_iter().flatten() {
            map.insert(cid, info);
        }

        debug!("Resolved {} embedded images for {}", map.len(), local_id);
        map
    }
}
