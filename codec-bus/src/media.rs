use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::engine::WorkUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Key,
    Delta,
}

/// Compressed unit: decoder input, encoder output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub kind: ChunkKind,
    /// microseconds
    pub timestamp: i64,
    pub duration: Option<i64>,
    pub data: Bytes,
}

impl EncodedChunk {
    pub fn key(timestamp: i64, data: impl Into<Bytes>) -> Self {
        Self {
            kind: ChunkKind::Key,
            timestamp,
            duration: None,
            data: data.into(),
        }
    }

    pub fn delta(timestamp: i64, data: impl Into<Bytes>) -> Self {
        Self {
            kind: ChunkKind::Delta,
            timestamp,
            duration: None,
            data: data.into(),
        }
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn is_key(&self) -> bool {
        self.kind == ChunkKind::Key
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl WorkUnit for EncodedChunk {
    fn is_sync(&self) -> bool {
        self.is_key()
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Uncompressed picture: encoder input, decoder output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// microseconds
    pub timestamp: i64,
    pub duration: Option<i64>,
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

impl VideoFrame {
    pub fn new(timestamp: i64, width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self {
            timestamp,
            duration: None,
            width,
            height,
            data: data.into(),
        }
    }
}

impl WorkUnit for VideoFrame {
    // every raw frame can start an encode
    fn is_sync(&self) -> bool {
        true
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    pub key_frame: bool,
}

impl EncodeOptions {
    pub fn key_frame() -> Self {
        Self { key_frame: true }
    }
}
