//! Decrypted attachment cache with single-flight loading.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, trace};

use crate::attachment::AttachmentError;
use crate::model::{AttachmentId, LocalId, Plaintext};

/// Cache key: owning message plus attachment id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Owning message.
    pub local_id: LocalId,
    /// Attachment within the message.
    pub attachment_id: AttachmentId,
}

impl CacheKey {
    /// Creates a key.
    #[must_use]
    pub const fn new(local_id: LocalId, attachment_id: AttachmentId) -> Self {
        Self {
            local_id,
            attachment_id,
        }
    }
}

type LoadResult = Result<Plaintext, AttachmentError>;
type Flight = Shared<BoxFuture<'static, LoadResult>>;

#[derive(Default)]
struct Inner {
    ready: HashMap<CacheKey, Plaintext>,
    in_flight: HashMap<CacheKey, (u64, Flight)>,
    next_flight: u64,
}

/// Session-scoped cache of decrypted attachments.
///
/// Concurrent requests for the same key share one load. Failed loads are
/// not cached, so a later request retries.
#[derive(Clone, Default)]
pub struct AttachmentCache {
    inner: Arc<Mutex<Inner>>,
}

impl AttachmentCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached plaintext for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Plaintext> {
        self.lock().ready.get(key).cloned()
    }

    /// Stores plaintext known without a load.
    pub fn insert(&self, key: CacheKey, plaintext: Plaintext) {
        self.lock().ready.insert(key, plaintext);
    }

    /// Returns the cached plaintext, joining or starting a load on a miss.
    ///
    /// `load` runs at most once per key while a load is in flight.
    ///
    /// # Errors
    ///
    /// Returns the load's error, shared by every caller that joined it.
    pub async fn get_or_load<F, Fut>(&self, key: CacheKey, load: F) -> LoadResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LoadResult> + Send + 'static,
    {
        let (flight_id, flight) = {
            let mut inner = self.lock();
            if let Some(hit) = inner.ready.get(&key) {
                trace!("Cache hit for {}/{}", key.local_id, key.attachment_id);
                return Ok(hit.clone());
            }
            if let Some((id, flight)) = inner.in_flight.get(&key) {
                trace!("Joining load of {}/{}", key.local_id, key.attachment_id);
                (*id, flight.clone())
            } else {
                let id = inner.next_flight;
                inner.next_flight += 1;
                let flight = load().boxed().shared();
                inner.in_flight.insert(key.clone(), (id, flight.clone()));
                (id, flight)
            }
        };

        let result = flight.await;

        let mut inner = self.lock();
        // The entry may belong to a newer load if the key was invalidated.
        if inner
            .in_flight
            .get(&key)
            .is_some_and(|(id, _)| *id == flight_id)
        {
            inner.in_flight.remove(&key);
            if let Ok(plaintext) = &result {
                inner.ready.insert(key, plaintext.clone());
            }
        }

        result
    }

    /// Drops one entry.
    pub fn remove(&self, key: &CacheKey) {
        let mut inner = self.lock();
        inner.ready.remove(key);
        inner.in_flight.remove(key);
    }

    /// Drops every entry of a message. In-flight loads finish but are not
    /// stored.
    pub fn invalidate(&self, local_id: &LocalId) {
        let mut inner = self.lock();
        let before = inner.ready.len();
        inner.ready.retain(|key, _| key.local_id != *local_id);
        inner.in_flight.retain(|key, _| key.local_id != *local_id);
        debug!(
            "Invalidated {} cached attachments of {}",
            before - inner.ready.len(),
            local_id
        );
    }

    /// Number of cached plaintexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().ready.len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().ready.is_empty()
    }
}
