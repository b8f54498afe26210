//! Action queue ordering, polled by hand.

#![allow(clippy::unwrap_used)]

use sealmail_core::session::{ActionQueue, QueueError, QueueState};
use tokio::sync::oneshot;
use tokio_test::task;
use tokio_test::{assert_pending, assert_ready, assert_ready_eq};

#[test]
fn second_action_waits_for_first() {
    let queue = ActionQueue::new();
    let (release, gate) = oneshot::channel::<()>();

    let mut first = task::spawn(queue.enqueue(|| async move {
        gate.await.unwrap();
        "first"
    }));
    let mut second = task::spawn(queue.enqueue(|| async { "second" }));

    assert_pending!(first.poll());
    assert_pending!(second.poll());
    assert_eq!(queue.state(), QueueState::Running);
    assert_eq!(queue.pending(), 1);

    release.send(()).unwrap();
    assert!(first.is_woken());
    assert_ready_eq!(first.poll(), Ok("first"));

    assert!(second.is_woken());
    assert_ready_eq!(second.poll(), Ok("second"));
    assert_eq!(queue.state(), QueueState::Idle);
}

#[test]
fn dropped_waiter_does_not_stall_queue() {
    let queue = ActionQueue::new();
    let (release, gate) = oneshot::channel::<()>();

    let mut first = task::spawn(queue.enqueue(|| async move { gate.await.unwrap() }));
    let mut dropped = task::spawn(queue.enqueue(|| async {}));
    let mut third = task::spawn(queue.enqueue(|| async { 3 }));

    assert_pending!(first.poll());
    assert_pending!(dropped.poll());
    assert_pending!(third.poll());
    drop(dropped);

    release.send(()).unwrap();
    assert_ready!(first.poll()).unwrap();
    assert_ready_eq!(third.poll(), Ok(3));
}

#[test]
fn dispose_rejects_waiters_but_finishes_running() {
    let queue = ActionQueue::new();
    let (release, gate) = oneshot::channel::<()>();

    let mut running = task::spawn(queue.enqueue(|| async move {
        gate.await.unwrap();
        1
    }));
    let mut waiting = task::spawn(queue.enqueue(|| async { 2 }));
    assert_pending!(running.poll());
    assert_pending!(waiting.poll());

    queue.dispose();
    assert_ready_eq!(waiting.poll(), Err(QueueError::Disposed));

    release.send(()).unwrap();
    assert_ready_eq!(running.poll(), Ok(1));
    assert!(queue.is_disposed());
}

#[test]
fn queues_of_different_messages_are_independent() {
    let x = ActionQueue::new();
    let y = ActionQueue::new();
    let (_hold, gate) = oneshot::channel::<()>();

    let mut blocked = task::spawn(x.enqueue(|| async move { gate.await.is_ok() }));
    let mut behind = task::spawn(x.enqueue(|| async { "x" }));
    let mut other = task::spawn(y.enqueue(|| async { "y" }));

    assert_pending!(blocked.poll());
    assert_pending!(behind.poll());
    assert_ready_eq!(other.poll(), Ok("y"));
    assert_eq!(x.state(), QueueState::Running);
    assert_eq!(y.state(), QueueState::Idle);
}
