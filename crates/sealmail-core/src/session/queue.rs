//! Per-message FIFO of asynchronous actions.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::trace;

/// Errors from [`ActionQueue`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue was disposed before the action could run.
    #[error("message was closed before the action ran")]
    Disposed,
}

/// Whether an action is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Nothing is running.
    Idle,
    /// An action is running.
    Running,
}

#[derive(Default)]
struct Inner {
    running: bool,
    disposed: bool,
    waiting: VecDeque<oneshot::Sender<Turn>>,
}

/// Runs actions for one message strictly one at a time, in submission
/// order.
///
/// A failing action does not block the ones queued after it.
#[derive(Clone, Default)]
pub struct ActionQueue {
    inner: Arc<Mutex<Inner>>,
}

impl ActionQueue {
    /// Creates an idle queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> QueueState {
        if self.lock().running {
            QueueState::Running
        } else {
            QueueState::Idle
        }
    }

    /// Number of actions waiting for their turn.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().waiting.len()
    }

    /// Runs `action` once every earlier action has finished.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Disposed`] if the queue is disposed before the
    /// action starts. The action is then never run.
    pub async fn enqueue<F, Fut, T>(&self, action: F) -> Result<T, QueueError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _turn = self.acquire().await?;
        Ok(action().await)
    }

    async fn acquire(&self) -> Result<Turn, QueueError> {
        let receiver = {
            let mut inner = self.lock();
            if inner.disposed {
                return Err(QueueError::Disposed);
            }
            if !inner.running {
                inner.running = true;
                return Ok(Turn::new(self.clone()));
            }
            let (sender, receiver) = oneshot::channel();
            inner.waiting.push_back(sender);
            trace!("Queued action behind {} others", inner.waiting.len() - 1);
            receiver
        };

        let turn = receiver.await.map_err(|_| QueueError::Disposed)?;
        // Handed over just before the queue was disposed; dropping the
        // turn passes it on.
        if self.is_disposed() {
            return Err(QueueError::Disposed);
        }
        Ok(turn)
    }

    /// Hands the turn to the next live waiter, or goes idle.
    fn release(&self) {
        loop {
            // `running` stays set while the turn is in transit.
            let sender = {
                let mut inner = self.lock();
                let Some(sender) = inner.waiting.pop_front() else {
                    inner.running = false;
                    return;
                };
                sender
            };
            match sender.send(Turn::new(self.clone())) {
                Ok(()) => return,
                // Waiter went away; its turn is returned unused.
                Err(mut turn) => turn.disarm(),
            }
        }
    }

    /// Drops every waiting action. The running one finishes normally.
    pub fn dispose(&self) {
        let mut inner = self.lock();
        inner.disposed = true;
        let dropped = inner.waiting.len();
        inner.waiting.clear();
        trace!("Disposed queue, dropped {} waiting actions", dropped);
    }

    /// Whether [`dispose`](Self::dispose) was called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }
}

/// The right to run. Passes to the next waiter on drop, including when
/// it is dropped undelivered inside a channel.
struct Turn {
    queue: Option<ActionQueue>,
}

impl Turn {
    const fn new(queue: ActionQueue) -> Self {
        Self { queue: Some(queue) }
    }

    fn disarm(&mut self) {
        self.queue = None;
    }
}

impl Drop for Turn {
    fn drop(&mut self) {
        if let Some(queue) = self.queue.take() {
            queue.release();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;

    #[tokio::test]
    async fn test_runs_in_submission_order() {
        let queue = ActionQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let gate = Arc::new(Notify::new());

        let first = {
            let (queue, log, gate) = (queue.clone(), log.clone(), gate.clone());
            tokio::spawn(async move {
                queue
                    .enqueue(|| async move {
                        gate.notified().await;
                        log.lock().unwrap().push(1);
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(queue.state(), QueueState::Running);

        let mut later = Vec::new();
        for n in 2..=4 {
            let (queue, log) = (queue.clone(), log.clone());
            later.push(tokio::spawn(async move {
                queue
                    .enqueue(|| async move {
                        log.lock().unwrap().push(n);
                    })
                    .await
            }));
            tokio::task::yield_now().await;
        }
        assert_eq!(queue.pending(), 3);

        gate.notify_one();
        first.await.unwrap().unwrap();
        for task in later {
            task.await.unwrap().unwrap();
        }

        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(queue.state(), QueueState::Idle);
    }

    #[tokio::test]
    async fn test_failed_action_does_not_block_next() {
        let queue = ActionQueue::new();

        let failed: Result<Result<(), &str>, _> =
            queue.enqueue(|| async { Err("boom") }).await;
        assert_eq!(failed.unwrap(), Err("boom"));

        let next = queue.enqueue(|| async { 7 }).await.unwrap();
        assert_eq!(next, 7);
    }

    #[tokio::test]
    async fn test_dispose_drops_waiting_actions() {
        let queue = ActionQueue::new();
        let gate = Arc::new(Notify::new());
        let ran = Arc::new(Mutex::new(false));

        let running = {
            let (queue, gate) = (queue.clone(), gate.clone());
            tokio::spawn(async move { queue.enqueue(|| async move { gate.notified().await }).await })
        };
        tokio::task::yield_now().await;

        let waiting = {
            let (queue, ran) = (queue.clone(), ran.clone());
            tokio::spawn(async move {
                queue
                    .enqueue(|| async move {
                        *ran.lock().unwrap() = true;
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        queue.dispose();
        gate.notify_one();

        assert!(running.await.unwrap().is_ok());
        assert_eq!(waiting.await.unwrap(), Err(QueueError::Disposed));
        assert!(!*ran.lock().unwrap());
        assert_eq!(queue.enqueue(|| async {}).await, Err(QueueError::Disposed));
    }

    #[tokio::test]
    async fn test_dispose_after_handover_skips_action() {
        let queue = ActionQueue::new();
        let ran = AtomicBool::new(false);

        let held = queue.acquire().await.unwrap();
        let mut waiting = Box::pin(queue.enqueue(|| async { ran.store(true, Ordering::SeqCst) }));
        assert!(futures::poll!(&mut waiting).is_pending());

        drop(held);
        queue.dispose();

        assert_eq!(waiting.await, Err(QueueError::Disposed));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(queue.state(), QueueState::Idle);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_passes_turn_on() {
        let queue = ActionQueue::new();
        let gate = Arc::new(Notify::new());

        let running = {
            let (queue, gate) = (queue.clone(), gate.clone());
            tokio::spawn(async move { queue.enqueue(|| async move { gate.notified().await }).await })
        };
        tokio::task::yield_now().await;

        let cancelled = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue(|| async {}).await })
        };
        tokio::task::yield_now().await;
        cancelled.abort();

        gate.notify_one();
        running.await.unwrap().unwrap();

        let value = tokio::time::timeout(Duration::from_secs(1), queue.enqueue(|| async { 1 }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value, 1);
    }
}
