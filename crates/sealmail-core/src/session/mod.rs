//! Session state: open messages and their action queues.

mod queue;
mod store;

pub use queue::{ActionQueue, QueueError, QueueState};
pub use store::{AddressKeys, MessageEntity, MessageState, MessageStore};
