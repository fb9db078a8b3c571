//! Hand-off between the engine's worker thread and the consumer runtime.
//!
//! ```text
//!  consumer (tokio)                         worker thread
//!  ────────────────                         ─────────────
//!  submit/flush/reset ── std mpsc ──────►  Engine::submit / flush / reset
//!                                               │
//!  delivery loop ◄──── tokio unbounded mpsc ────┘  Resolved / Flushed
//!     │
//!     ├─► output callback / error callback
//!     └─► BackpressureGate::resolve
//! ```
//!
//! The worker never blocks on the consumer: deliveries go through an
//! unbounded channel whose `send` is synchronous. The consumer drains the
//! channel in batches, one batch per wake-up.
//!
//! Every unit and every flush is tagged with the gate epoch current when it
//! was issued. `reset()`/`close()` advance the epoch, so the worker skips
//! units it has not started yet and the delivery loop drops anything that
//! arrives late.

use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    codec::{ErrorCallback, OutputCallback},
    engine::{Engine, WorkUnit},
    error::{CodecError, Result},
    gate::BackpressureGate,
    media::EncodeOptions,
};

/// Upper bound of deliveries handled per consumer wake-up.
const DELIVERY_BATCH: usize = 64;

enum Command<E: Engine> {
    Configure {
        config: E::Config,
        ack: oneshot::Sender<anyhow::Result<()>>,
    },
    Submit {
        unit: E::Input,
        options: EncodeOptions,
        epoch: u64,
    },
    Flush {
        epoch: u64,
        ack: oneshot::Sender<()>,
    },
    Reset,
    Close,
}

enum Delivery<O> {
    /// Exactly one per unit the engine consumed.
    Resolved {
        epoch: u64,
        timestamp: i64,
        outcome: anyhow::Result<Vec<O>>,
    },
    Flushed {
        epoch: u64,
        outcome: anyhow::Result<Vec<O>>,
        ack: oneshot::Sender<()>,
    },
}

/// Where the delivery loop sends results.
pub struct DeliveryTarget<O> {
    pub gate: BackpressureGate,
    pub output: OutputCallback<O>,
    pub error: ErrorCallback,
}

impl<O> DeliveryTarget<O> {
    /// Hands `outcome` to the callbacks if `epoch` is still current.
    /// Returns false when the delivery is late.
    ///
    /// The epoch guard is held throughout. A reset from a callback stops the
    /// remaining outputs; a reset from elsewhere waits until they are out.
    fn emit(&self, epoch: u64, outcome: anyhow::Result<Vec<O>>) -> bool {
        let _held = self.gate.hold_epoch();
        if self.gate.epoch() != epoch {
            return false;
        }
        match outcome {
            Ok(outputs) => {
                for output in outputs {
                    if self.gate.epoch() != epoch {
                        break;
                    }
                    guard_callback("output", || (self.output)(output));
                }
            }
            Err(e) => {
                log::warn!("engine error: {:#}", e);
                let err = CodecError::engine(&e);
                guard_callback("error", || (self.error)(err));
            }
        }
        true
    }

    /// Returns whether the queue size went down.
    fn deliver(&self, delivery: Delivery<O>, pending: &AtomicUsize) -> bool {
        match delivery {
            Delivery::Resolved {
                epoch,
                timestamp,
                outcome,
            } => {
                let resolved = if self.emit(epoch, outcome) {
                    self.gate.resolve(epoch)
                } else {
                    log::debug!(
                        "dropping late delivery for unit {} from epoch {}",
                        timestamp,
                        epoch
                    );
                    false
                };
                pending.fetch_sub(1, Ordering::AcqRel);
                resolved
            }
            Delivery::Flushed {
                epoch,
                outcome,
                ack,
            } => {
                if self.emit(epoch, outcome) {
                    pending.fetch_sub(1, Ordering::AcqRel);
                    let _ = ack.send(());
                } else {
                    // dropping the ack rejects the waiting flush
                    log::debug!("dropping late flush from epoch {}", epoch);
                    pending.fetch_sub(1, Ordering::AcqRel);
                }
                false
            }
        }
    }
}

fn guard_callback(label: &str, f: impl FnOnce()) {
    if std::panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        log::error!("{} callback panicked", label);
    }
}

fn guard_engine<T>(
    op: &str,
    f: impl FnOnce() -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    std::panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|_| Err(anyhow::anyhow!("engine panicked during {}", op)))
}

pub struct WorkerBridge<E: Engine> {
    commands: std::sync::mpsc::Sender<Command<E>>,
    gate: BackpressureGate,
    pending: Arc<AtomicUsize>,
    runtime: tokio::runtime::Handle,
}

impl<E: Engine> WorkerBridge<E> {
    /// Moves `engine` onto its own thread and starts the delivery loop on
    /// the current Tokio runtime.
    pub fn start(engine: E, target: DeliveryTarget<E::Output>) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| CodecError::state("codecs must be created inside a Tokio runtime"))?;

        let (commands, command_rx) = std::sync::mpsc::channel();
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let gate = target.gate.clone();

        let worker = EngineWorker {
            engine,
            commands: command_rx,
            deliveries: delivery_tx,
            gate: gate.clone(),
            pending: pending.clone(),
        };
        std::thread::Builder::new()
            .name("codec-engine".to_string())
            .spawn(move || worker.run())
            .map_err(|e| CodecError::Engine(format!("failed to spawn engine thread: {}", e)))?;

        runtime.spawn(Self::delivery_loop(delivery_rx, target, pending.clone()));

        Ok(Self {
            commands,
            gate,
            pending,
            runtime,
        })
    }

    /// The runtime the delivery loop was started on.
    pub fn runtime(&self) -> &tokio::runtime::Handle {
        &self.runtime
    }

    async fn delivery_loop(
        rx: mpsc::UnboundedReceiver<Delivery<E::Output>>,
        target: DeliveryTarget<E::Output>,
        pending: Arc<AtomicUsize>,
    ) {
        let mut batches = UnboundedReceiverStream::new(rx).ready_chunks(DELIVERY_BATCH);
        while let Some(batch) = batches.next().await {
            let mut dequeued = false;
            for delivery in batch {
                dequeued |= target.deliver(delivery, &pending);
            }
            if dequeued {
                guard_callback("dequeue", || target.gate.notify_dequeue());
            }
        }
        log::debug!("delivery loop finished");
    }

    fn send(&self, command: Command<E>) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| CodecError::state("engine thread has stopped"))
    }

    /// Configures the engine. Failures come back here and never travel
    /// through the delivery channel.
    pub async fn configure(&self, config: E::Config) -> anyhow::Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Configure { config, ack })?;
        done.await
            .map_err(|_| anyhow::anyhow!("engine thread stopped during configure"))?
    }

    /// Fire-and-forget. The result arrives later through the delivery loop.
    pub fn submit(&self, unit: E::Input, options: EncodeOptions, epoch: u64) -> Result<()> {
        self.send(Command::Submit {
            unit,
            options,
            epoch,
        })
    }

    /// Resolves once the engine has drained everything submitted before
    /// this call *and* every resulting delivery has been handed to the
    /// callbacks. Fails with `Aborted` if the epoch ends first.
    pub async fn flush(&self, epoch: u64) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Flush { epoch, ack })?;
        done.await
            .map_err(|_| CodecError::aborted("flush interrupted by reset or close"))
    }

    /// Starts a new epoch: units not yet handed to the engine are skipped
    /// and late deliveries are dropped. Returns how many outstanding units
    /// were discarded.
    pub fn reset(&self) -> usize {
        let (epoch, discarded) = self.gate.advance_epoch();
        log::debug!("bridge entering epoch {}", epoch);
        // nothing to reset if the worker is already gone
        let _ = self.send(Command::Reset);
        discarded
    }

    pub fn close(&self) -> usize {
        let discarded = self.reset();
        let _ = self.send(Command::Close);
        discarded
    }

    /// Deliveries produced by the worker but not yet handled by the
    /// consumer.
    pub fn pending_deliveries(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

impl<E: Engine> Drop for WorkerBridge<E> {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Close);
    }
}

struct EngineWorker<E: Engine> {
    engine: E,
    commands: std::sync::mpsc::Receiver<Command<E>>,
    deliveries: mpsc::UnboundedSender<Delivery<E::Output>>,
    gate: BackpressureGate,
    pending: Arc<AtomicUsize>,
}

impl<E: Engine> EngineWorker<E> {
    fn run(mut self) {
        log::info!("engine thread started");
        while let Ok(command) = self.commands.recv() {
            match command {
                Command::Configure { config, ack } => {
                    let engine = &mut self.engine;
                    let result = guard_engine("configure", || engine.configure(&config));
                    let _ = ack.send(result);
                }
                Command::Submit {
                    unit,
                    options,
                    epoch,
                } => {
                    let timestamp = unit.timestamp();
                    if epoch != self.gate.epoch() {
                        log::debug!("discarding unit {} queued before reset", timestamp);
                        continue;
                    }
                    let engine = &mut self.engine;
                    let outcome = guard_engine("submit", || engine.submit(unit, &options));
                    if !self.deliver(Delivery::Resolved {
                        epoch,
                        timestamp,
                        outcome,
                    }) {
                        break;
                    }
                }
                Command::Flush { epoch, ack } => {
                    if epoch != self.gate.epoch() {
                        continue;
                    }
                    let engine = &mut self.engine;
                    let outcome = guard_engine("flush", || engine.flush());
                    if !self.deliver(Delivery::Flushed {
                        epoch,
                        outcome,
                        ack,
                    }) {
                        break;
                    }
                }
                Command::Reset => {
                    let engine = &mut self.engine;
                    if let Err(e) = guard_engine("reset", || {
                        engine.reset();
                        Ok(())
                    }) {
                        log::error!("{:#}", e);
                    }
                }
                Command::Close => break,
            }
        }
        self.engine.close();
        log::info!("engine thread stopped");
    }

    /// False once the consumer side is gone.
    fn deliver(&self, delivery: Delivery<E::Output>) -> bool {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.deliveries.send(delivery).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            log::warn!("delivery channel closed, stopping engine thread");
            return false;
        }
        true
    }
}

#[cfg(test)]
#[path = "bridge_test.rs"]
mod bridge_test;
