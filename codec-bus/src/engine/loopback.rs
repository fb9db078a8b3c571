//! In-process engines that copy payloads straight through.
//!
//! They do no real compression but behave like a real engine from the
//! control plane's point of view: they run on the worker thread, can be
//! slow, can hold outputs back and release them out of submission order,
//! and can fail individual units.

use std::{collections::HashSet, time::Duration};

use crate::{
    config::{VideoDecoderConfig, VideoEncoderConfig},
    engine::Engine,
    media::{ChunkKind, EncodeOptions, EncodedChunk, VideoFrame},
};

pub const CODEC_PREFIX: &str = "loopback";
pub const DEFAULT_KEY_FRAME_INTERVAL: u64 = 30;

#[derive(Debug, Clone, Default)]
pub struct LoopbackSettings {
    /// Outputs held back before being released in reverse order.
    /// 0 releases every output immediately.
    pub reorder_window: usize,
    /// Per-unit processing time, spent on the worker thread.
    pub delay: Duration,
    /// Units with these timestamps fail with an engine error.
    pub fail_timestamps: HashSet<i64>,
}

impl LoopbackSettings {
    pub fn with_reorder_window(mut self, window: usize) -> Self {
        self.reorder_window = window;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_at(mut self, timestamp: i64) -> Self {
        self.fail_timestamps.insert(timestamp);
        self
    }

    fn process(&self, timestamp: i64) -> anyhow::Result<()> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail_timestamps.contains(&timestamp) {
            anyhow::bail!("injected failure at timestamp {}", timestamp);
        }
        Ok(())
    }
}

fn check_codec(codec: &str) -> anyhow::Result<()> {
    if !codec.starts_with(CODEC_PREFIX) {
        anyhow::bail!("unsupported codec: {}", codec);
    }
    Ok(())
}

/// Holds up to `window` outputs, then releases the whole group newest
/// first.
struct ReorderBuffer<T> {
    window: usize,
    held: Vec<T>,
}

impl<T> ReorderBuffer<T> {
    fn new(window: usize) -> Self {
        Self {
            window,
            held: Vec::new(),
        }
    }

    fn push(&mut self, item: T) -> Vec<T> {
        self.held.push(item);
        if self.held.len() > self.window {
            self.drain()
        } else {
            Vec::new()
        }
    }

    fn drain(&mut self) -> Vec<T> {
        let mut out = std::mem::take(&mut self.held);
        out.reverse();
        out
    }

    fn clear(&mut self) {
        self.held.clear();
    }
}

pub struct LoopbackEncoder {
    settings: LoopbackSettings,
    config: Option<VideoEncoderConfig>,
    frame_index: u64,
    reorder: ReorderBuffer<EncodedChunk>,
}

impl LoopbackEncoder {
    pub fn new(settings: LoopbackSettings) -> Self {
        let reorder = ReorderBuffer::new(settings.reorder_window);
        Self {
            settings,
            config: None,
            frame_index: 0,
            reorder,
        }
    }
}

impl Default for LoopbackEncoder {
    fn default() -> Self {
        Self::new(LoopbackSettings::default())
    }
}

impl Engine for LoopbackEncoder {
    type Config = VideoEncoderConfig;
    type Input = VideoFrame;
    type Output = EncodedChunk;

    fn configure(&mut self, config: &VideoEncoderConfig) -> anyhow::Result<()> {
        check_codec(&config.codec)?;
        log::debug!(
            "loopback encoder configured: {} {}x{}",
            config.codec,
            config.width,
            config.height
        );
        self.config = Some(config.clone());
        self.frame_index = 0;
        Ok(())
    }

    fn submit(
        &mut self,
        frame: VideoFrame,
        options: &EncodeOptions,
    ) -> anyhow::Result<Vec<EncodedChunk>> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("encoder is not configured"))?;
        self.settings.process(frame.timestamp)?;

        let interval = config
            .key_frame_interval
            .unwrap_or(DEFAULT_KEY_FRAME_INTERVAL);
        let kind = if options.key_frame || self.frame_index % interval == 0 {
            ChunkKind::Key
        } else {
            ChunkKind::Delta
        };
        self.frame_index += 1;

        Ok(self.reorder.push(EncodedChunk {
            kind,
            timestamp: frame.timestamp,
            duration: frame.duration,
            data: frame.data,
        }))
    }

    fn flush(&mut self) -> anyhow::Result<Vec<EncodedChunk>> {
        Ok(self.reorder.drain())
    }

    fn reset(&mut self) {
        self.reorder.clear();
        self.config = None;
        self.frame_index = 0;
    }
}

pub struct LoopbackDecoder {
    settings: LoopbackSettings,
    config: Option<VideoDecoderConfig>,
    reorder: ReorderBuffer<VideoFrame>,
}

impl LoopbackDecoder {
    pub fn new(settings: LoopbackSettings) -> Self {
        let reorder = ReorderBuffer::new(settings.reorder_window);
        Self {
            settings,
            config: None,
            reorder,
        }
    }
}

impl Default for LoopbackDecoder {
    fn default() -> Self {
        Self::new(LoopbackSettings::default())
    }
}

impl Engine for LoopbackDecoder {
    type Config = VideoDecoderConfig;
    type Input = EncodedChunk;
    type Output = VideoFrame;

    fn configure(&mut self, config: &VideoDecoderConfig) -> anyhow::Result<()> {
        check_codec(&config.codec)?;
        log::debug!("loopback decoder configured: {}", config.codec);
        self.config = Some(config.clone());
        Ok(())
    }

    fn submit(
        &mut self,
        chunk: EncodedChunk,
        _options: &EncodeOptions,
    ) -> anyhow::Result<Vec<VideoFrame>> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("decoder is not configured"))?;
        self.settings.process(chunk.timestamp)?;

        Ok(self.reorder.push(VideoFrame {
            timestamp: chunk.timestamp,
            duration: chunk.duration,
            width: config.coded_width.unwrap_or(0),
            height: config.coded_height.unwrap_or(0),
            data: chunk.data,
        }))
    }

    fn flush(&mut self) -> anyhow::Result<Vec<VideoFrame>> {
        Ok(self.reorder.drain())
    }

    fn reset(&mut self) {
        self.reorder.clear();
        self.config = None;
    }
}

#[cfg(test)]
#[path = "loopback_test.rs"]
mod loopback_test;
