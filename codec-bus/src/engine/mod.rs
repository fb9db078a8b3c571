//! Contract between the control plane and the thread-based codec engine.
//!
//! An engine is owned by exactly one worker thread (see [`crate::bridge`]).
//! Every call below happens on that thread, in the order the control plane
//! issued them, so implementations never need their own locking.

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod loopback;

use crate::{config::CodecConfig, media::EncodeOptions};

/// One unit of input work.
pub trait WorkUnit: Send + 'static {
    /// Whether the unit can be processed without any prior state
    /// (a key chunk for decoders).
    fn is_sync(&self) -> bool;

    /// Stable key consumers can use to restore presentation order.
    fn timestamp(&self) -> i64;
}

pub trait Engine: Send + 'static {
    type Config: CodecConfig;
    type Input: WorkUnit;
    type Output: Send + 'static;

    fn configure(&mut self, config: &Self::Config) -> anyhow::Result<()>;

    /// Consumes one unit and returns whatever output became available.
    ///
    /// The returned outputs need not belong to `unit`: an engine that
    /// reorders may hold outputs back and release them on a later call or
    /// on `flush`.
    fn submit(&mut self, unit: Self::Input, options: &EncodeOptions)
    -> anyhow::Result<Vec<Self::Output>>;

    /// Drains every buffered output.
    fn flush(&mut self) -> anyhow::Result<Vec<Self::Output>>;

    /// Drops buffered state; the engine must accept a new `configure`.
    fn reset(&mut self);

    fn close(&mut self) {}
}
