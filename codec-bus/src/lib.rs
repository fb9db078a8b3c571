//! Control plane for browser-style video codecs running on a thread-based
//! engine: per-instance lifecycle, ordered control messages, backpressure,
//! the engine-to-runtime delivery bridge and on-demand reclamation of
//! forgotten instances.

pub mod bridge;
mod codec;
pub mod config;
pub mod control;
pub mod decoder;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod gate;
pub mod media;
pub mod resource;
pub mod state;

#[cfg(test)]
mod test_support;

pub use codec::{CodecInit, ErrorCallback, OutputCallback};
pub use config::{CodecConfig, VideoDecoderConfig, VideoEncoderConfig};
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use engine::{Engine, WorkUnit};
pub use error::{CodecError, Result};
pub use gate::{DEFAULT_MAX_QUEUE_DEPTH, DequeueCallback};
pub use media::{ChunkKind, EncodeOptions, EncodedChunk, VideoFrame};
pub use resource::{ReclaimPolicy, ReclamationRecord, ResourceHandle, ResourceManager};
pub use state::{CodecKind, CodecState};
