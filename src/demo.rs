//! Loopback workload run at startup so the control plane can be watched in
//! the logs and through the HTTP surface.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use codec_bus::{
    CodecError, CodecInit, Decoder, EncodeOptions, EncodedChunk, Encoder, ResourceManager,
    VideoDecoderConfig, VideoEncoderConfig, VideoFrame,
    engine::loopback::{LoopbackDecoder, LoopbackEncoder, LoopbackSettings},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{DemoConfig, config};

// 30 fps in microseconds
const FRAME_INTERVAL_US: i64 = 33_333;

pub(crate) fn start_demo(cancel: CancellationToken, registry: ResourceManager) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("demo stopped");
            }
            result = run(&config().demo, config().max_queue_depth, registry) => {
                if let Err(e) = result {
                    log::error!("demo failed: {:#}", e);
                }
            }
        }
    });
}

fn synthetic_frame(index: u32, width: u32, height: u32) -> VideoFrame {
    let luma = vec![(index % 256) as u8; (width * height) as usize];
    VideoFrame::new(
        index as i64 * FRAME_INTERVAL_US,
        width,
        height,
        Bytes::from(luma),
    )
}

fn build_encoder(
    demo: &DemoConfig,
    settings: &LoopbackSettings,
    max_queue_depth: usize,
    registry: &ResourceManager,
    chunks: mpsc::UnboundedSender<EncodedChunk>,
) -> anyhow::Result<Encoder<LoopbackEncoder>> {
    let encoder = Encoder::new(
        LoopbackEncoder::new(settings.clone()),
        CodecInit::new(
            move |chunk: EncodedChunk| {
                let _ = chunks.send(chunk);
            },
            |e: CodecError| log::warn!("encoder error: {}", e),
        ),
        registry,
    )?;
    encoder.configure(
        VideoEncoderConfig::new("loopback", demo.width, demo.height)
            .with_key_frame_interval(demo.key_frame_interval),
    )?;
    encoder.set_max_queue_depth(max_queue_depth)?;
    Ok(encoder)
}

fn build_decoder(
    demo: &DemoConfig,
    settings: &LoopbackSettings,
    max_queue_depth: usize,
    registry: &ResourceManager,
    decoded: Arc<AtomicUsize>,
) -> anyhow::Result<Decoder<LoopbackDecoder>> {
    let decoder = Decoder::new(
        LoopbackDecoder::new(settings.clone()),
        CodecInit::new(
            move |_: VideoFrame| {
                decoded.fetch_add(1, Ordering::Relaxed);
            },
            |e: CodecError| log::warn!("decoder error: {}", e),
        ),
        registry,
    )?;
    decoder.configure(
        VideoDecoderConfig::new("loopback").with_coded_size(demo.width, demo.height),
    )?;
    decoder.set_max_queue_depth(max_queue_depth)?;
    Ok(decoder)
}

async fn run(
    demo: &DemoConfig,
    max_queue_depth: usize,
    registry: ResourceManager,
) -> anyhow::Result<()> {
    let settings = LoopbackSettings::default()
        .with_reorder_window(demo.reorder_window)
        .with_delay(Duration::from_millis(demo.frame_delay_ms));

    let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<EncodedChunk>();
    let encoder = build_encoder(demo, &settings, max_queue_depth, &registry, chunk_tx)?;

    let mut throttled = 0;
    for index in 0..demo.frames {
        if encoder.queue_size() >= encoder.max_queue_depth() {
            throttled += 1;
        }
        encoder.ready().await;
        encoder.encode(
            synthetic_frame(index, demo.width, demo.height),
            EncodeOptions::default(),
        )?;
    }
    encoder.flush().await?;

    let mut chunks = Vec::new();
    while let Ok(chunk) = chunk_rx.try_recv() {
        chunks.push(chunk);
    }
    let keys = chunks.iter().filter(|c| c.is_key()).count();
    let bytes: usize = chunks.iter().map(EncodedChunk::size).sum();
    log::info!(
        "{} encoded {} chunks ({} key, {} bytes), waited on backpressure {} times",
        encoder.handle(),
        chunks.len(),
        keys,
        bytes,
        throttled
    );
    // the engine reorders; decode in presentation order
    chunks.sort_by_key(|c| c.timestamp);

    let decoded = Arc::new(AtomicUsize::new(0));
    let decoder = build_decoder(demo, &settings, max_queue_depth, &registry, decoded.clone())?;
    for chunk in chunks {
        decoder.ready().await;
        decoder.decode(chunk)?;
    }
    decoder.flush().await?;
    log::info!(
        "{} decoded {} frames",
        decoder.handle(),
        decoded.load(Ordering::Relaxed)
    );

    // queue work and drop it again
    for index in 0..8 {
        encoder.encode(
            synthetic_frame(demo.frames + index, demo.width, demo.height),
            EncodeOptions::default(),
        )?;
    }
    let queued = encoder.queue_size();
    encoder.reset()?;
    log::info!(
        "{} reset with {} units queued, queue size now {}",
        encoder.handle(),
        queued,
        encoder.queue_size()
    );
    encoder.close();

    decoder.set_background(true);
    log::info!(
        "{} left idle in the background; POST /memory-pressure reclaims it",
        decoder.handle()
    );
    // keeps the decoder alive until shutdown
    futures::future::pending::<()>().await;
    Ok(())
}

#[cfg(test)]
#[path = "demo_test.rs"]
mod demo_test;
