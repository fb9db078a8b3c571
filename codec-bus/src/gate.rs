use std::{
    future::Future,
    sync::{Arc, Mutex},
};

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use tokio::sync::watch;

use crate::error::{CodecError, Result};

pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 16;

pub type DequeueCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GateState {
    queue_size: usize,
    max_depth: usize,
    epoch: u64,
}

/// Counts submitted-but-unresolved units for one codec instance.
///
/// The counter lives in a `watch` channel so every waiter re-checks its
/// condition whenever the counter or the threshold changes. The epoch is
/// stored next to the counter: `reset()`/`close()` bump it and zero the
/// counter in the same update, and a resolution from an older epoch is
/// ignored, so late deliveries can never steal a decrement from new work.
#[derive(Clone)]
pub struct BackpressureGate {
    state: Arc<watch::Sender<GateState>>,
    // reentrant: a callback running under it may reset its own codec
    epoch_guard: Arc<ReentrantMutex<()>>,
    on_dequeue: Arc<Mutex<Option<DequeueCallback>>>,
}

impl BackpressureGate {
    pub fn new(max_depth: usize) -> Self {
        let (state, _) = watch::channel(GateState {
            queue_size: 0,
            max_depth: max_depth.max(1),
            epoch: 0,
        });
        Self {
            state: Arc::new(state),
            epoch_guard: Arc::new(ReentrantMutex::new(())),
            on_dequeue: Arc::new(Mutex::new(None)),
        }
    }

    pub fn queue_size(&self) -> usize {
        self.state.borrow().queue_size
    }

    pub fn max_queue_depth(&self) -> usize {
        self.state.borrow().max_depth
    }

    pub fn epoch(&self) -> u64 {
        self.state.borrow().epoch
    }

    pub fn set_max_queue_depth(&self, max_depth: usize) -> Result<()> {
        if max_depth == 0 {
            return Err(CodecError::configuration("maxQueueDepth must be at least 1"));
        }
        self.state.send_if_modified(|s| {
            let changed = s.max_depth != max_depth;
            s.max_depth = max_depth;
            changed
        });
        Ok(())
    }

    /// One submission. Returns the new queue size.
    pub fn increment(&self) -> usize {
        let mut size = 0;
        self.state.send_modify(|s| {
            s.queue_size += 1;
            size = s.queue_size;
        });
        size
    }

    /// One terminal resolution (output, error or discard) of a unit
    /// submitted during `epoch`.
    pub fn resolve(&self, epoch: u64) -> bool {
        self.state.send_if_modified(|s| {
            if s.epoch != epoch {
                return false;
            }
            if s.queue_size == 0 {
                log::warn!("resolution without a matching submission in epoch {}", epoch);
                return false;
            }
            s.queue_size -= 1;
            true
        })
    }

    /// Blocks epoch changes from other threads while held.
    ///
    /// The delivery loop holds it from the epoch check until the callbacks
    /// return, so a `reset()` lands either before a delivery is accepted or
    /// after it has been handed over in full.
    pub fn hold_epoch(&self) -> ReentrantMutexGuard<'_, ()> {
        self.epoch_guard.lock()
    }

    /// Discards every outstanding unit and starts a new epoch.
    /// Returns the new epoch and how many units were discarded.
    pub fn advance_epoch(&self) -> (u64, usize) {
        let _held = self.hold_epoch();
        let mut result = (0, 0);
        self.state.send_modify(|s| {
            result = (s.epoch + 1, s.queue_size);
            s.epoch += 1;
            s.queue_size = 0;
        });
        result
    }

    /// Resolves once `queue_size < max_queue_depth`; immediately if that
    /// already holds.
    pub fn ready(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.state.subscribe();
        async move {
            // The sender is owned by the gate itself, so this only fails if
            // every gate handle is gone, and then nobody is waiting anymore.
            let _ = rx
                .wait_for(|s| s.queue_size < s.max_depth)
                .await
                .map(|_| ());
        }
    }

    /// Resolves once no unit is outstanding.
    pub fn drained(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.state.subscribe();
        async move {
            let _ = rx.wait_for(|s| s.queue_size == 0).await.map(|_| ());
        }
    }

    pub fn set_on_dequeue(&self, callback: Option<DequeueCallback>) {
        *self.on_dequeue.lock().unwrap_or_else(|e| e.into_inner()) = callback;
    }

    pub fn notify_dequeue(&self) {
        let callback = self
            .on_dequeue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl Default for BackpressureGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUEUE_DEPTH)
    }
}

#[cfg(test)]
#[path = "gate_test.rs"]
mod gate_test;
