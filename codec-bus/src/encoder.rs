use std::{future::Future, sync::Arc};

use futures::future::BoxFuture;

use crate::{
    codec::{CodecCore, CodecInit},
    engine::Engine,
    error::Result,
    gate::DequeueCallback,
    media::{EncodeOptions, VideoFrame},
    resource::{ResourceHandle, ResourceManager},
    state::{CodecKind, CodecState},
};

/// Encoder instance driving an [`Engine`] that turns frames into chunks.
///
/// Every method returns without waiting on the engine. Outputs and
/// asynchronous faults arrive through the callbacks given to [`Encoder::new`].
/// Dropping the encoder closes it.
pub struct Encoder<E: Engine<Input = VideoFrame>> {
    core: Arc<CodecCore<E>>,
}

impl<E: Engine<Input = VideoFrame>> Encoder<E> {
    /// Must be called inside a Tokio runtime.
    pub fn new(engine: E, init: CodecInit<E::Output>, registry: &ResourceManager) -> Result<Self> {
        Ok(Self {
            core: CodecCore::from_engine(CodecKind::Encoder, engine, init, registry)?,
        })
    }

    pub fn configure(&self, config: E::Config) -> Result<()> {
        self.core.configure(config)
    }

    pub fn encode(&self, frame: VideoFrame, options: EncodeOptions) -> Result<()> {
        self.core.submit("encode", frame, options)
    }

    /// Resolves once every frame encoded so far has been resolved and its
    /// outputs delivered. Fails with an abort error if `reset()` or
    /// `close()` happens first.
    pub fn flush(&self) -> BoxFuture<'static, Result<()>> {
        self.core.flush()
    }

    /// Fails on a closed encoder.
    pub fn reset(&self) -> Result<()> {
        self.core.reset()
    }

    pub fn close(&self) {
        self.core.close();
    }

    pub fn state(&self) -> CodecState {
        self.core.state()
    }

    pub fn kind(&self) -> CodecKind {
        self.core.kind()
    }

    pub fn handle(&self) -> ResourceHandle {
        self.core.handle()
    }

    pub fn queue_size(&self) -> usize {
        self.core.queue_size()
    }

    pub fn max_queue_depth(&self) -> usize {
        self.core.max_queue_depth()
    }

    pub fn set_max_queue_depth(&self, max_depth: usize) -> Result<()> {
        self.core.set_max_queue_depth(max_depth)
    }

    pub fn ready(&self) -> impl Future<Output = ()> + Send + 'static {
        self.core.ready()
    }

    pub fn set_on_dequeue(&self, callback: Option<DequeueCallback>) {
        self.core.set_on_dequeue(callback);
    }

    pub fn set_background(&self, background: bool) {
        self.core.set_background(background);
    }

    #[cfg(test)]
    pub(crate) fn core(&self) -> &Arc<CodecCore<E>> {
        &self.core
    }
}

impl<E: Engine<Input = VideoFrame>> Drop for Encoder<E> {
    fn drop(&mut self) {
        self.core.close();
    }
}
