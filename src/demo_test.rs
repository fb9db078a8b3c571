use std::sync::{Arc, atomic::AtomicUsize};

use codec_bus::{ResourceManager, engine::loopback::LoopbackSettings};
use tokio::sync::mpsc;

use super::{build_decoder, build_encoder};
use crate::config::AppConfig;

#[tokio::test]
async fn test_queue_depth_applies_to_both_codecs() -> anyhow::Result<()> {
    let config = AppConfig::from_json(r#"{ "max_queue_depth": 4 }"#)?;
    let registry = ResourceManager::default();
    let settings = LoopbackSettings::default();

    let (chunk_tx, _chunk_rx) = mpsc::unbounded_channel();
    let encoder = build_encoder(
        &config.demo,
        &settings,
        config.max_queue_depth,
        &registry,
        chunk_tx,
    )?;
    let decoder = build_decoder(
        &config.demo,
        &settings,
        config.max_queue_depth,
        &registry,
        Arc::new(AtomicUsize::new(0)),
    )?;

    assert_eq!(encoder.max_queue_depth(), 4);
    assert_eq!(decoder.max_queue_depth(), 4);
    assert_eq!(registry.len(), 2);
    Ok(())
}
