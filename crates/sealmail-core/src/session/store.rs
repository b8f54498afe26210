//! Session store of open messages.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use super::queue::ActionQueue;
use crate::cache::{AttachmentCache, BlobRegistry};
use crate::crypto::{PrivateKey, PublicKey};
use crate::model::{LocalId, Message, Overlay};

/// The user's own keys for the address a message belongs to.
#[derive(Debug, Clone, Default)]
pub struct AddressKeys {
    /// Private keys, primary first.
    pub private: Vec<PrivateKey>,
    /// Public keys, primary first.
    pub public: Vec<PublicKey>,
}

/// Everything the session knows about one message.
#[derive(Debug, Clone)]
pub struct MessageState {
    /// Wire record.
    pub data: Message,
    /// Processing results.
    pub overlay: Overlay,
    /// Keys of the owning address.
    pub keys: AddressKeys,
}

/// A message open in the session.
pub struct MessageEntity {
    local_id: LocalId,
    epoch: u64,
    queue: ActionQueue,
    state: Mutex<MessageState>,
}

impl MessageEntity {
    /// Local id.
    #[must_use]
    pub const fn local_id(&self) -> &LocalId {
        &self.local_id
    }

    /// Generation of this entity; a reopened message gets a new one.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The message's action queue.
    #[must_use]
    pub const fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    fn lock(&self) -> MutexGuard<'_, MessageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> MessageState {
        self.lock().clone()
    }
}

#[derive(Default)]
struct StoreInner {
    entities: HashMap<LocalId, Arc<MessageEntity>>,
    next_epoch: u64,
}

/// Open messages keyed by local id.
///
/// Long operations read a snapshot, work without holding any lock, and
/// write back through [`commit`](Self::commit), which drops the write if
/// the message was closed or reopened in the meantime.
#[derive(Clone, Default)]
pub struct MessageStore {
    inner: Arc<Mutex<StoreInner>>,
    cache: AttachmentCache,
    blobs: BlobRegistry,
}

impl MessageStore {
    /// Creates a store that evicts from `cache` and `blobs`.
    #[must_use]
    pub fn new(cache: AttachmentCache, blobs: BlobRegistry) -> Self {
        Self {
            inner: Arc::default(),
            cache,
            blobs,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a message, replacing any entity with the same id.
    pub fn open(&self, local_id: LocalId, data: Message, keys: AddressKeys) -> Arc<MessageEntity> {
        let (entity, replaced) = {
            let mut inner = self.lock();
            inner.next_epoch += 1;
            let entity = Arc::new(MessageEntity {
                local_id: local_id.clone(),
                epoch: inner.next_epoch,
                queue: ActionQueue::new(),
                state: Mutex::new(MessageState {
                    data,
                    overlay: Overlay::default(),
                    keys,
                }),
            });
            let replaced = inner.entities.insert(local_id.clone(), Arc::clone(&entity));
            (entity, replaced)
        };

        if let Some(old) = replaced {
            debug!("Reopened message {}", local_id);
            self.release(&old);
        }
        entity
    }

    /// Entity for `local_id`, if open.
    #[must_use]
    pub fn get(&self, local_id: &LocalId) -> Option<Arc<MessageEntity>> {
        self.lock().entities.get(local_id).cloned()
    }

    /// State copy for `local_id`, if it is still open at `epoch`.
    #[must_use]
    pub fn snapshot_at(&self, local_id: &LocalId, epoch: u64) -> Option<MessageState> {
        self.get(local_id)
            .filter(|e| e.epoch == epoch)
            .map(|e| e.snapshot())
    }

    /// Applies `update` if `local_id` is still open at `epoch`.
    ///
    /// Returns `None`, without calling `update`, for a stale write.
    pub fn commit<R>(
        &self,
        local_id: &LocalId,
        epoch: u64,
        update: impl FnOnce(&mut MessageState) -> R,
    ) -> Option<R> {
        let entity = self.get(local_id).filter(|e| e.epoch == epoch);
        let Some(entity) = entity else {
            trace!("Dropping stale write to {} (epoch {})", local_id, epoch);
            return None;
        };
        let mut state = entity.lock();
        Some(update(&mut state))
    }

    /// Closes a message: disposes its queue and drops its cached content.
    ///
    /// Returns whether the message was open.
    pub fn evict(&self, local_id: &LocalId) -> bool {
        let removed = self.lock().entities.remove(local_id);
        match removed {
            Some(entity) => {
                debug!("Evicted message {}", local_id);
                self.release(&entity);
                true
            }
            None => false,
        }
    }

    fn release(&self, entity: &MessageEntity) {
        entity.queue.dispose();
        self.cache.invalidate(&entity.local_id);
        self.blobs.revoke_owner(&entity.local_id);
    }

    /// Whether `local_id` is open.
    #[must_use]
    pub fn contains(&self, local_id: &LocalId) -> bool {
        self.lock().entities.contains_key(local_id)
    }

    /// Number of open messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entities.len()
    }

    /// Whether no message is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entities.is_empty()
    }

    /// Shared attachment cache.
    #[must_use]
    pub const fn cache(&self) -> &AttachmentCache {
        &self.cache
    }

    /// Shared blob registry.
    #[must_use]
    pub const fn blobs(&self) -> &BlobRegistry {
        &self.blobs
    }
}
