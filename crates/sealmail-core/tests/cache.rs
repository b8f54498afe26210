//! Single-flight attachment loading through the public cache API.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures::future::join_all;
use sealmail_core::cache::{AttachmentCache, CacheKey};
use sealmail_core::{AttachmentError, AttachmentId, LocalId, Plaintext};
use tokio::sync::Notify;

fn key(message: &str, attachment: &str) -> CacheKey {
    CacheKey::new(LocalId::new(message), AttachmentId::new(attachment))
}

fn plain(data: &'static [u8]) -> Plaintext {
    Plaintext {
        data: Bytes::from_static(data),
        mime_type: "image/png".into(),
    }
}

#[tokio::test]
async fn concurrent_requests_share_one_load() {
    let cache = AttachmentCache::new();
    let loads = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());

    let requests = (0..5).map(|_| {
        let (cache, loads, gate) = (cache.clone(), loads.clone(), gate.clone());
        tokio::spawn(async move {
            cache
                .get_or_load(key("m1", "a1"), move || async move {
                    loads.fetch_add(1, Ordering::SeqCst);
                    gate.notified().await;
                    Ok(plain(b"img"))
                })
                .await
        })
    });
    let requests: Vec<_> = requests.collect();
    tokio::task::yield_now().await;
    gate.notify_one();

    for result in join_all(requests).await {
        assert_eq!(result.unwrap().unwrap(), plain(b"img"));
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn failure_is_retried_on_next_request() {
    let cache = AttachmentCache::new();

    let failed = cache
        .get_or_load(key("m1", "a1"), || async {
            Err(AttachmentError::CorruptedData("bad packet".into()))
        })
        .await;
    assert!(failed.is_err());
    assert!(cache.is_empty());

    let loaded = cache
        .get_or_load(key("m1", "a1"), || async { Ok(plain(b"ok")) })
        .await
        .unwrap();
    assert_eq!(loaded, plain(b"ok"));
}

#[tokio::test]
async fn invalidation_discards_in_flight_result() {
    let cache = AttachmentCache::new();
    let gate = Arc::new(Notify::new());

    let pending = {
        let (cache, gate) = (cache.clone(), gate.clone());
        tokio::spawn(async move {
            cache
                .get_or_load(key("m1", "a1"), move || async move {
                    gate.notified().await;
                    Ok(plain(b"old"))
                })
                .await
        })
    };
    tokio::task::yield_now().await;

    cache.invalidate(&LocalId::new("m1"));
    gate.notify_one();

    assert_eq!(pending.await.unwrap().unwrap(), plain(b"old"));
    assert!(cache.get(&key("m1", "a1")).is_none());
}

#[tokio::test]
async fn invalidation_is_scoped_to_one_message() {
    let cache = AttachmentCache::new();
    cache.insert(key("m1", "a1"), plain(b"one"));
    cache.insert(key("m2", "a1"), plain(b"two"));

    cache.invalidate(&LocalId::new("m1"));

    assert!(cache.get(&key("m1", "a1")).is_none());
    assert_eq!(cache.get(&key("m2", "a1")), Some(plain(b"two")));
}
