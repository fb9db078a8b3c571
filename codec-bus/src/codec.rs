use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use futures::{
    FutureExt,
    future::{self, BoxFuture},
};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::{
    bridge::{DeliveryTarget, WorkerBridge},
    config::CodecConfig,
    control::{ControlMessage, ControlQueue},
    engine::{Engine, WorkUnit},
    error::{CodecError, Result},
    gate::{BackpressureGate, DequeueCallback},
    media::EncodeOptions,
    resource::{Reclaim, ResourceHandle, ResourceManager},
    state::{CodecKind, CodecState},
};

pub type OutputCallback<O> = Arc<dyn Fn(O) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(CodecError) + Send + Sync>;

/// The two callbacks every codec is constructed with.
pub struct CodecInit<O> {
    pub output: OutputCallback<O>,
    pub error: ErrorCallback,
}

impl<O> CodecInit<O> {
    pub fn new<F, G>(output: F, error: G) -> Self
    where
        F: Fn(O) + Send + Sync + 'static,
        G: Fn(CodecError) + Send + Sync + 'static,
    {
        Self {
            output: Arc::new(output),
            error: Arc::new(error),
        }
    }
}

struct Shared {
    state: CodecState,
    needs_sync: bool,
    // cancelled by reset/close to reject pending flushes
    abort: CancellationToken,
    submitted: u64,
    flushed_through: u64,
}

/// State shared by [`crate::Encoder`] and [`crate::Decoder`].
///
/// Lock order: the gate's epoch guard, `shared`, the control queue, then
/// the gate state. Application callbacks are never invoked with `shared`
/// held.
pub(crate) struct CodecCore<E: Engine> {
    kind: CodecKind,
    handle: ResourceHandle,
    shared: Mutex<Shared>,
    gate: BackpressureGate,
    queue: ControlQueue,
    bridge: WorkerBridge<E>,
    registry: ResourceManager,
}

impl<E: Engine> CodecCore<E> {
    /// Internal constructor used by the public codec types once they have
    /// picked their kind.
    pub(crate) fn from_engine(
        kind: CodecKind,
        engine: E,
        init: CodecInit<E::Output>,
        registry: &ResourceManager,
    ) -> Result<Arc<Self>> {
        let gate = BackpressureGate::default();
        let bridge = WorkerBridge::start(
            engine,
            DeliveryTarget {
                gate: gate.clone(),
                output: init.output,
                error: init.error.clone(),
            },
        )?;
        let queue = ControlQueue::new(bridge.runtime().clone(), init.error.clone());

        let core = Arc::new_cyclic(|weak: &Weak<Self>| {
            let target: Weak<dyn Reclaim> = weak.clone();
            let handle = registry.register(target, kind, init.error.clone());
            Self {
                kind,
                handle,
                shared: Mutex::new(Shared {
                    state: CodecState::Unconfigured,
                    needs_sync: false,
                    abort: CancellationToken::new(),
                    submitted: 0,
                    flushed_through: 0,
                }),
                gate,
                queue,
                bridge,
                registry: registry.clone(),
            }
        });
        log::info!("{} created ({:?})", core.handle, kind);
        Ok(core)
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn kind(&self) -> CodecKind {
        self.kind
    }

    pub(crate) fn handle(&self) -> ResourceHandle {
        self.handle
    }

    pub(crate) fn state(&self) -> CodecState {
        self.lock().state
    }

    pub(crate) fn queue_size(&self) -> usize {
        self.gate.queue_size()
    }

    pub(crate) fn max_queue_depth(&self) -> usize {
        self.gate.max_queue_depth()
    }

    pub(crate) fn set_max_queue_depth(&self, max_depth: usize) -> Result<()> {
        self.gate.set_max_queue_depth(max_depth)
    }

    pub(crate) fn ready(&self) -> impl Future<Output = ()> + Send + 'static {
        self.gate.ready()
    }

    pub(crate) fn set_on_dequeue(&self, callback: Option<DequeueCallback>) {
        self.gate.set_on_dequeue(callback);
    }

    pub(crate) fn set_background(&self, background: bool) {
        self.registry.set_background(self.handle, background);
    }

    #[cfg(test)]
    pub(crate) fn pending_deliveries(&self) -> usize {
        self.bridge.pending_deliveries()
    }

    pub(crate) fn configure(self: &Arc<Self>, config: E::Config) -> Result<()> {
        let epoch = {
            let mut shared = self.lock();
            shared.state.ensure_configurable()?;
            config.validate()?;
            shared.state = CodecState::Configured;
            shared.needs_sync = self.kind == CodecKind::Decoder;
            self.gate.epoch()
        };
        log::info!("{} configured", self.handle);

        let core = Arc::clone(self);
        self.queue
            .enqueue(ControlMessage::new("configure", move || async move {
                if core.gate.epoch() != epoch {
                    return Ok(());
                }
                if let Err(e) = core.bridge.configure(config).await {
                    log::error!("{} engine rejected configuration: {:#}", core.handle, e);
                    core.close_with(Some(CodecError::configuration(format!("{:#}", e))));
                }
                Ok(())
            }));
        Ok(())
    }

    /// Shared body of encode() and decode().
    pub(crate) fn submit(
        self: &Arc<Self>,
        op: &'static str,
        unit: E::Input,
        options: EncodeOptions,
    ) -> Result<()> {
        let (epoch, size, rejected) = {
            let mut shared = self.lock();
            shared.state.ensure_configured(op)?;
            shared.submitted += 1;
            // decided in call order: units queued before a configure() or
            // reset() must not satisfy the key chunk requirement after it
            let rejected = shared.needs_sync && !unit.is_sync();
            if !rejected {
                shared.needs_sync = false;
            }
            (self.gate.epoch(), self.gate.increment(), rejected)
        };
        log::debug!(
            "{} {} unit {} queued (queue size {})",
            self.handle,
            op,
            unit.timestamp(),
            size
        );

        let core = Arc::clone(self);
        self.queue.enqueue(ControlMessage::new(op, move || async move {
            core.run_submit(unit, options, epoch, rejected)
        }));
        Ok(())
    }

    fn run_submit(
        &self,
        unit: E::Input,
        options: EncodeOptions,
        epoch: u64,
        rejected: bool,
    ) -> Result<()> {
        // held so a reset cannot slip between the epoch check and the hand-off
        let shared = self.lock();
        if self.gate.epoch() != epoch {
            return Ok(());
        }

        if rejected {
            drop(shared);
            self.discard(epoch);
            return Err(CodecError::data(format!(
                "unit {} is not a key chunk; a key chunk is required after configure() or reset()",
                unit.timestamp()
            )));
        }

        if let Err(e) = self.bridge.submit(unit, options, epoch) {
            drop(shared);
            self.discard(epoch);
            return Err(e);
        }
        drop(shared);

        self.registry.record_activity(self.handle);
        Ok(())
    }

    // a unit that will never reach the engine still resolves exactly once
    fn discard(&self, epoch: u64) {
        if self.gate.resolve(epoch) {
            self.gate.notify_dequeue();
        }
    }

    pub(crate) fn flush(self: &Arc<Self>) -> BoxFuture<'static, Result<()>> {
        let (abort, epoch, through) = {
            let shared = self.lock();
            if let Err(e) = shared.state.ensure_configured("flush") {
                return future::ready(Err(e)).boxed();
            }
            if shared.submitted == shared.flushed_through
                && self.gate.queue_size() == 0
                && self.queue.is_quiescent()
                && self.bridge.pending_deliveries() == 0
            {
                return future::ready(Ok(())).boxed();
            }
            (shared.abort.clone(), self.gate.epoch(), shared.submitted)
        };

        let (done_tx, done_rx) = oneshot::channel::<()>();
        let core = Arc::clone(self);
        self.queue.enqueue(
            ControlMessage::new("flush", move || async move {
                if core.gate.epoch() != epoch {
                    return Ok(());
                }
                core.bridge.flush(epoch).await?;
                {
                    let mut shared = core.lock();
                    shared.flushed_through = shared.flushed_through.max(through);
                }
                let _ = done_tx.send(());
                Ok(())
            })
            .silent(),
        );

        let core = Arc::clone(self);
        async move {
            let drained = async {
                done_rx
                    .await
                    .map_err(|_| CodecError::aborted("flush interrupted by reset or close"))?;
                core.queue.flush().await;
                core.gate.drained().await;
                Ok::<(), CodecError>(())
            };
            tokio::select! {
                biased;
                _ = abort.cancelled() => Err(CodecError::aborted("flush interrupted by reset or close")),
                result = drained => result,
            }
        }
        .boxed()
    }

    pub(crate) fn reset(&self) -> Result<()> {
        let abort = {
            let _epoch = self.gate.hold_epoch();
            let mut shared = self.lock();
            if !shared.state.ensure_resettable(self.kind)? {
                log::debug!("{} reset ignored on a closed decoder", self.handle);
                return Ok(());
            }
            shared.state = CodecState::Unconfigured;
            shared.needs_sync = self.kind == CodecKind::Decoder;
            shared.flushed_through = shared.submitted;
            let dropped = self.queue.clear();
            let discarded = self.bridge.reset();
            log::info!(
                "{} reset: dropped {} control messages, discarded {} units",
                self.handle,
                dropped,
                discarded
            );
            std::mem::replace(&mut shared.abort, CancellationToken::new())
        };
        abort.cancel();
        Ok(())
    }

    pub(crate) fn close(&self) {
        self.close_with(None);
    }

    fn close_with(&self, reason: Option<CodecError>) {
        let abort = {
            let _epoch = self.gate.hold_epoch();
            let mut shared = self.lock();
            if shared.state == CodecState::Closed {
                return;
            }
            shared.state = CodecState::Closed;
            let dropped = self.queue.clear();
            let discarded = self.bridge.close();
            log::info!(
                "{} closed: dropped {} control messages, discarded {} units",
                self.handle,
                dropped,
                discarded
            );
            std::mem::replace(&mut shared.abort, CancellationToken::new())
        };
        abort.cancel();
        self.registry.unregister(self.handle);
        if let Some(err) = reason {
            self.queue_error(err);
        }
    }

    // reported from the queue so it lands after the message that caused it
    fn queue_error(&self, err: CodecError) {
        self.queue
            .enqueue(ControlMessage::new("error", move || async move { Err(err) }));
    }
}

impl<E: Engine> Reclaim for CodecCore<E> {
    fn force_close(&self) {
        self.close();
    }
}

#[cfg(test)]
#[path = "codec_test.rs"]
mod codec_test;
