use std::{
    collections::VecDeque,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard},
};

use futures::{FutureExt, future::BoxFuture};
use tokio::{runtime::Handle, sync::Notify};

use crate::{
    codec::ErrorCallback,
    error::{CodecError, Result},
};

/// A deferred public call. Nothing inside `run` executes until the message
/// reaches the head of its queue.
pub struct ControlMessage {
    label: &'static str,
    report_errors: bool,
    run: Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>,
}

impl ControlMessage {
    pub fn new<F, Fut>(label: &'static str, run: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            label,
            report_errors: true,
            run: Box::new(move || run().boxed()),
        }
    }

    /// Failures are logged instead of being routed to the error handler.
    pub fn silent(mut self) -> Self {
        self.report_errors = false;
        self
    }
}

struct QueueInner {
    messages: VecDeque<ControlMessage>,
    processing: bool,
}

/// Per-instance FIFO of control messages, run one at a time on the Tokio
/// runtime the codec was created on. Enqueueing never blocks the caller and
/// works from any thread.
#[derive(Clone)]
pub struct ControlQueue {
    inner: Arc<Mutex<QueueInner>>,
    quiescent: Arc<Notify>,
    on_error: ErrorCallback,
    runtime: Handle,
}

impl ControlQueue {
    pub fn new(runtime: Handle, on_error: ErrorCallback) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner {
                messages: VecDeque::new(),
                processing: false,
            })),
            quiescent: Arc::new(Notify::new()),
            on_error,
            runtime,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends to the tail. If the queue was idle, a processing task is
    /// spawned; it first runs on the runtime's next scheduling turn.
    pub fn enqueue(&self, message: ControlMessage) {
        let start = {
            let mut inner = self.lock();
            log::debug!(
                "enqueue control message {} (queued: {})",
                message.label,
                inner.messages.len()
            );
            inner.messages.push_back(message);
            !std::mem::replace(&mut inner.processing, true)
        };
        if start {
            self.runtime.spawn(self.clone().process());
        }
    }

    async fn process(self) {
        loop {
            let message = {
                let mut inner = self.lock();
                match inner.messages.pop_front() {
                    Some(message) => message,
                    None => {
                        inner.processing = false;
                        break;
                    }
                }
            };

            let label = message.label;
            let outcome = AssertUnwindSafe((message.run)())
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(CodecError::Engine(format!(
                        "control message {} panicked",
                        label
                    )))
                });
            if let Err(e) = outcome {
                if message.report_errors {
                    let on_error = &self.on_error;
                    if std::panic::catch_unwind(AssertUnwindSafe(|| on_error(e))).is_err() {
                        log::error!("error callback panicked handling {}", label);
                    }
                } else {
                    log::debug!("control message {} failed: {}", label, e);
                }
            }
        }
        self.quiescent.notify_waiters();
    }

    /// Resolves once the queue is empty and nothing is executing. Messages
    /// enqueued while waiting are waited for too.
    pub async fn flush(&self) {
        loop {
            let notified = self.quiescent.notified();
            tokio::pin!(notified);
            // register before checking so a wake-up between the check and
            // the await is not lost
            notified.as_mut().enable();
            if self.is_quiescent() {
                return;
            }
            notified.await;
        }
    }

    /// Drops every message that has not started. A message that is already
    /// executing runs to completion.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let dropped = inner.messages.len();
        inner.messages.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_quiescent(&self) -> bool {
        let inner = self.lock();
        inner.messages.is_empty() && !inner.processing
    }
}

#[cfg(test)]
#[path = "control_test.rs"]
mod control_test;
