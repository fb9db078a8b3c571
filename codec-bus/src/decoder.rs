use std::{future::Future, sync::Arc};

use futures::future::BoxFuture;

use crate::{
    codec::{CodecCore, CodecInit},
    engine::Engine,
    error::Result,
    gate::DequeueCallback,
    media::{EncodeOptions, EncodedChunk},
    resource::{ResourceHandle, ResourceManager},
    state::{CodecKind, CodecState},
};

/// Decoder instance driving an [`Engine`] that turns chunks into frames.
///
/// After `configure()` and after `reset()` the first chunk must be a key
/// chunk. Anything else is rejected with a data error on the error
/// callback and decoding carries on with the next chunk.
pub struct Decoder<E: Engine<Input = EncodedChunk>> {
    core: Arc<CodecCore<E>>,
}

impl<E: Engine<Input = EncodedChunk>> Decoder<E> {
    /// Must be called inside a Tokio runtime.
    pub fn new(engine: E, init: CodecInit<E::Output>, registry: &ResourceManager) -> Result<Self> {
        Ok(Self {
            core: CodecCore::from_engine(CodecKind::Decoder, engine, init, registry)?,
        })
    }

    pub fn configure(&self, config: E::Config) -> Result<()> {
        self.core.configure(config)
    }

    pub fn decode(&self, chunk: EncodedChunk) -> Result<()> {
        self.core.submit("decode", chunk, EncodeOptions::default())
    }

    pub fn flush(&self) -> BoxFuture<'static, Result<()>> {
        self.core.flush()
    }

    /// A no-op on a closed decoder.
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

impl<E: Engine<Input = EncodedChunk>> Drop for Decoder<E> {
    fn drop(&mut self) {
        self.core.close();
    }
}
