use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use futures::FutureExt;

use crate::error::CodecError;
use crate::gate::{BackpressureGate, DEFAULT_MAX_QUEUE_DEPTH};

#[test]
fn test_defaults() {
    let gate = BackpressureGate::default();
    assert_eq!(gate.queue_size(), 0);
    assert_eq!(gate.max_queue_depth(), DEFAULT_MAX_QUEUE_DEPTH);
    assert_eq!(gate.epoch(), 0);

    // zero is clamped at construction and rejected afterwards
    assert_eq!(BackpressureGate::new(0).max_queue_depth(), 1);
    assert!(matches!(
        gate.set_max_queue_depth(0),
        Err(CodecError::Configuration(_))
    ));
}

#[test]
fn test_counts_submissions_and_resolutions() {
    let gate = BackpressureGate::new(4);
    for expected in 1..=3 {
        assert_eq!(gate.increment(), expected);
    }
    assert!(gate.resolve(0));
    assert_eq!(gate.queue_size(), 2);
    assert!(gate.resolve(0));
    assert!(gate.resolve(0));
    // never negative
    assert!(!gate.resolve(0));
    assert_eq!(gate.queue_size(), 0);
}

#[test]
fn test_stale_epoch_resolutions_are_ignored() {
    let gate = BackpressureGate::new(4);
    gate.increment();
    gate.increment();
    assert_eq!(gate.advance_epoch(), (1, 2));
    assert_eq!(gate.queue_size(), 0);

    gate.increment();
    assert!(!gate.resolve(0));
    assert_eq!(gate.queue_size(), 1);
    assert!(gate.resolve(1));
    assert_eq!(gate.queue_size(), 0);
}

#[tokio::test]
async fn test_ready_is_immediate_below_threshold() {
    let gate = BackpressureGate::new(2);
    gate.increment();
    assert_eq!(gate.ready().now_or_never(), Some(()));
}

#[tokio::test]
async fn test_ready_waits_for_a_resolution() {
    let gate = BackpressureGate::new(2);
    gate.increment();
    gate.increment();

    let ready = gate.ready();
    tokio::pin!(ready);
    assert!(futures::poll!(ready.as_mut()).is_pending());

    gate.resolve(0);
    ready.await;
    assert_eq!(gate.queue_size(), 1);
}

#[tokio::test]
async fn test_ready_rechecks_after_threshold_change() {
    let gate = BackpressureGate::new(1);
    gate.increment();
    gate.increment();

    let ready = gate.ready();
    tokio::pin!(ready);
    assert!(futures::poll!(ready.as_mut()).is_pending());

    // still at the threshold: stays pending
    gate.set_max_queue_depth(2).unwrap();
    assert!(futures::poll!(ready.as_mut()).is_pending());

    gate.set_max_queue_depth(3).unwrap();
    ready.await;
}

#[tokio::test]
async fn test_drained_after_reset() {
    let gate = BackpressureGate::new(8);
    gate.increment();

    let drained = gate.drained();
    tokio::pin!(drained);
    assert!(futures::poll!(drained.as_mut()).is_pending());

    gate.advance_epoch();
    drained.await;
}

#[test]
fn test_dequeue_callback() {
    let gate = BackpressureGate::new(8);
    gate.notify_dequeue();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    gate.set_on_dequeue(Some(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })));
    gate.notify_dequeue();
    gate.notify_dequeue();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    gate.set_on_dequeue(None);
    gate.notify_dequeue();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_epoch_changes_wait_for_the_guard() {
    let gate = BackpressureGate::default();
    let held = gate.hold_epoch();

    let other = gate.clone();
    let waiter = std::thread::spawn(move || other.advance_epoch().0);
    std::thread::sleep(std::time::Duration::from_millis(20));
    assert_eq!(gate.epoch(), 0);

    // the holding thread itself is not blocked
    assert_eq!(gate.advance_epoch().0, 1);
    drop(held);
    assert_eq!(waiter.join().unwrap(), 2);
}
