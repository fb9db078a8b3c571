use codec_bus::{ReclaimPolicy, ResourceManager};
use tokio_util::sync::CancellationToken;

mod api;
mod config;
mod demo;
mod handler;

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("codec_bus", log::LevelFilter::Debug)
        .filter_module("lite_codecs", log::LevelFilter::Debug)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> ! {
    init_logging();
    #[cfg(feature = "ffmpeg")]
    codec_bus::engine::ffmpeg::init().unwrap_or_else(|e| {
        eprintln!("Error initializing ffmpeg: {}", e);
        std::process::exit(1);
    });
    let config = config::config();

    let registry = ResourceManager::new(ReclaimPolicy::new(config.inactivity_window()));
    let cancel = CancellationToken::new();

    api::start_api_server(cancel.clone(), registry.clone());
    if config.demo.enabled {
        demo::start_demo(cancel.clone(), registry.clone());
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            },
        }
    }

    log::info!("shutting down, {} codecs still registered", registry.len());
    std::process::exit(0);
}
