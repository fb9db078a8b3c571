//! Helpers shared by the unit tests.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use tokio::sync::mpsc;

use crate::{
    codec::CodecInit,
    config::VideoEncoderConfig,
    engine::{Engine, loopback::LoopbackEncoder},
    error::CodecError,
    media::{EncodeOptions, EncodedChunk, VideoFrame},
};

pub fn frame(ts: i64) -> VideoFrame {
    VideoFrame::new(ts, 4, 4, vec![ts as u8; 16])
}

pub fn encoder_config() -> VideoEncoderConfig {
    VideoEncoderConfig::new("loopback", 4, 4)
}

/// Collects everything a codec hands to its callbacks.
pub struct Recorder<O> {
    outputs: Arc<Mutex<Vec<O>>>,
    errors: Arc<Mutex<Vec<CodecError>>>,
}

impl<O: Clone + Send + 'static> Recorder<O> {
    pub fn new() -> Self {
        Self {
            outputs: Arc::new(Mutex::new(Vec::new())),
            errors: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn init(&self) -> CodecInit<O> {
        let outputs = self.outputs.clone();
        let errors = self.errors.clone();
        CodecInit::new(
            move |o: O| outputs.lock().unwrap().push(o),
            move |e: CodecError| errors.lock().unwrap().push(e),
        )
    }

    pub fn outputs(&self) -> Vec<O> {
        self.outputs.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<CodecError> {
        self.errors.lock().unwrap().clone()
    }
}

/// Loopback encoder whose `submit` blocks until the test releases it.
pub struct ValveEncoder {
    inner: LoopbackEncoder,
    permits: std::sync::mpsc::Receiver<()>,
    entered: mpsc::UnboundedSender<i64>,
    handed: Arc<AtomicUsize>,
}

/// Test side of a [`ValveEncoder`].
pub struct Valve {
    permits: std::sync::mpsc::Sender<()>,
    entered: mpsc::UnboundedReceiver<i64>,
    handed: Arc<AtomicUsize>,
}

impl ValveEncoder {
    pub fn new(inner: LoopbackEncoder) -> (Self, Valve) {
        let (permit_tx, permit_rx) = std::sync::mpsc::channel();
        let (entered_tx, entered_rx) = mpsc::unbounded_channel();
        let handed = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                permits: permit_rx,
                entered: entered_tx,
                handed: handed.clone(),
            },
            Valve {
                permits: permit_tx,
                entered: entered_rx,
                handed,
            },
        )
    }
}

impl Valve {
    pub fn release(&self, n: usize) {
        for _ in 0..n {
            let _ = self.permits.send(());
        }
    }

    /// Timestamp of the next unit that reached the engine.
    pub async fn wait_entered(&mut self) -> Option<i64> {
        self.entered.recv().await
    }

    /// Units handed to the engine so far.
    pub fn handed(&self) -> usize {
        self.handed.load(Ordering::SeqCst)
    }
}

impl Engine for ValveEncoder {
    type Config = VideoEncoderConfig;
    type Input = VideoFrame;
    type Output = EncodedChunk;

    fn configure(&mut self, config: &VideoEncoderConfig) -> anyhow::Result<()> {
        self.inner.configure(config)
    }

    fn submit(
        &mut self,
        frame: VideoFrame,
        options: &EncodeOptions,
    ) -> anyhow::Result<Vec<EncodedChunk>> {
        self.handed.fetch_add(1, Ordering::SeqCst);
        let _ = self.entered.send(frame.timestamp);
        // a dropped valve opens for good
        let _ = self.permits.recv();
        self.inner.submit(frame, options)
    }

    fn flush(&mut self) -> anyhow::Result<Vec<EncodedChunk>> {
        self.inner.flush()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

/// Polls `condition` on the runtime until it holds, for at most a second.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}
