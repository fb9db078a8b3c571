//! Video decoding through libavcodec.

use bytes::Bytes;
use ffmpeg_next::{Rational, codec::packet::Flags};

use crate::{
    config::VideoDecoderConfig,
    engine::Engine,
    media::{EncodeOptions, EncodedChunk, VideoFrame},
};

/// Registers FFmpeg components. Call once at startup.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

// timestamps are carried in microseconds end to end
const TIME_BASE: Rational = Rational(1, 1_000_000);

/// Maps a codec string ("avc1.42001f", "vp09.00.10.08", ...) to the name of
/// the libavcodec decoder.
fn decoder_name(codec: &str) -> &str {
    let family = codec.split('.').next().unwrap_or(codec);
    match family {
        "avc1" | "avc3" => "h264",
        "hev1" | "hvc1" => "hevc",
        "vp09" => "vp9",
        "av01" => "av1",
        other => other,
    }
}

#[derive(Default)]
pub struct FfmpegVideoDecoder {
    decoder: Option<ffmpeg_next::codec::decoder::Video>,
}

impl FfmpegVideoDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn decoder(&mut self) -> anyhow::Result<&mut ffmpeg_next::codec::decoder::Video> {
        self.decoder
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("decoder is not configured"))
    }

    fn receive_frames(&mut self) -> anyhow::Result<Vec<VideoFrame>> {
        let decoder = self.decoder()?;
        let mut frames = Vec::new();
        loop {
            let mut frame = ffmpeg_next::frame::Video::empty();
            match decoder.receive_frame(&mut frame) {
                Ok(()) => frames.push(VideoFrame {
                    timestamp: frame.timestamp().or(frame.pts()).unwrap_or(0),
                    duration: None,
                    width: frame.width(),
                    height: frame.height(),
                    data: Bytes::copy_from_slice(frame.data(0)),
                }),
                Err(ffmpeg_next::Error::Eof) => break,
                Err(ffmpeg_next::Error::Other { errno })
                    if errno == ffmpeg_next::util::error::EAGAIN =>
                {
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(frames)
    }
}

impl Engine for FfmpegVideoDecoder {
    type Config = VideoDecoderConfig;
    type Input = EncodedChunk;
    type Output = VideoFrame;

    fn configure(&mut self, config: &VideoDecoderConfig) -> anyhow::Result<()> {
        let name = decoder_name(&config.codec);
        let codec = ffmpeg_next::decoder::find_by_name(name)
            .ok_or_else(|| anyhow::anyhow!("no decoder for codec {}", config.codec))?;

        let mut ctx = ffmpeg_next::codec::Context::new();
        unsafe {
            (*ctx.as_mut_ptr()).time_base = TIME_BASE.into();
            if let (Some(w), Some(h)) = (config.coded_width, config.coded_height) {
                (*ctx.as_mut_ptr()).width = w as i32;
                (*ctx.as_mut_ptr()).height = h as i32;
            }
        }
        if config.description.is_some() {
            log::warn!("{}: out-of-band description is not supported, expecting Annex B", name);
        }

        let decoder = ctx.decoder().open_as(codec)?.video()?;
        log::info!("ffmpeg decoder {} opened for {}", name, config.codec);
        self.decoder = Some(decoder);
        Ok(())
    }

    fn submit(
        &mut self,
        chunk: EncodedChunk,
        _options: &EncodeOptions,
    ) -> anyhow::Result<Vec<VideoFrame>> {
        let mut packet = ffmpeg_next::Packet::copy(&chunk.data);
        packet.set_pts(Some(chunk.timestamp));
        packet.set_dts(Some(chunk.timestamp));
        if let Some(duration) = chunk.duration {
            packet.set_duration(duration);
        }
        if chunk.is_key() {
            packet.set_flags(Flags::KEY);
        }
        self.decoder()?.send_packet(&packet)?;
        self.receive_frames()
    }

    fn flush(&mut self) -> anyhow::Result<Vec<VideoFrame>> {
        self.decoder()?.send_eof()?;
        let frames = self.receive_frames()?;
        // back to a state that accepts packets again
        self.decoder()?.flush();
        Ok(frames)
    }

    fn reset(&mut self) {
        self.decoder = None;
    }

    fn close(&mut self) {
        self.decoder = None;
    }
}
