use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};

/// Configuration accepted by `configure()`. `validate` runs synchronously
/// inside the call; an error there leaves the codec state untouched.
pub trait CodecConfig: Clone + Send + 'static {
    fn validate(&self) -> Result<()>;
}

fn validate_codec_string(codec: &str) -> Result<()> {
    if codec.is_empty() {
        return Err(CodecError::configuration("codec string is empty"));
    }
    if codec.trim() != codec {
        return Err(CodecError::configuration(format!(
            "codec string {:?} has surrounding whitespace",
            codec
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoEncoderConfig {
    // "avc1.42001f", "vp8", "loopback", ...
    pub codec: String,
    pub width: u32,
    pub height: u32,
    // bps
    pub bitrate: Option<u64>,
    pub framerate: Option<f64>,
    // None = engine decides
    pub key_frame_interval: Option<u64>,
}

impl VideoEncoderConfig {
    pub fn new(codec: &str, width: u32, height: u32) -> Self {
        Self {
            codec: codec.to_string(),
            width,
            height,
            bitrate: None,
            framerate: None,
            key_frame_interval: None,
        }
    }

    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    pub fn with_framerate(mut self, framerate: f64) -> Self {
        self.framerate = Some(framerate);
        self
    }

    pub fn with_key_frame_interval(mut self, interval: u64) -> Self {
        self.key_frame_interval = Some(interval);
        self
    }
}

impl CodecConfig for VideoEncoderConfig {
    fn validate(&self) -> Result<()> {
        validate_codec_string(&self.codec)?;
        if self.width == 0 || self.height == 0 {
            return Err(CodecError::configuration(format!(
                "invalid video size {}x{}",
                self.width, self.height
            )));
        }
        if self.bitrate == Some(0) {
            return Err(CodecError::configuration("bitrate must be positive"));
        }
        if let Some(framerate) = self.framerate {
            if !(framerate.is_finite() && framerate > 0.0) {
                return Err(CodecError::configuration(format!(
                    "invalid framerate {}",
                    framerate
                )));
            }
        }
        if self.key_frame_interval == Some(0) {
            return Err(CodecError::configuration(
                "key frame interval must be positive",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDecoderConfig {
    pub codec: String,
    pub coded_width: Option<u32>,
    pub coded_height: Option<u32>,
    // codec specific extradata (avcC, hvcC, ...)
    #[serde(skip)]
    pub description: Option<Bytes>,
}

impl VideoDecoderConfig {
    pub fn new(codec: &str) -> Self {
        Self {
            codec: codec.to_string(),
            coded_width: None,
            coded_height: None,
            description: None,
        }
    }

    pub fn with_coded_size(mut self, width: u32, height: u32) -> Self {
        self.coded_width = Some(width);
        self.coded_height = Some(height);
        self
    }

    pub fn with_description(mut self, description: impl Into<Bytes>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl CodecConfig for VideoDecoderConfig {
    fn validate(&self) -> Result<()> {
        validate_codec_string(&self.codec)?;
        match (self.coded_width, self.coded_height) {
            (None, None) => Ok(()),
            (Some(w), Some(h)) if w > 0 && h > 0 => Ok(()),
            (w, h) => Err(CodecError::configuration(format!(
                "invalid coded size {:?}x{:?}",
                w, h
            ))),
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
