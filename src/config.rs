use std::{path::Path, sync::LazyLock, time::Duration};

use codec_bus::DEFAULT_MAX_QUEUE_DEPTH;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub listen: String,
    /// Idle time after which a codec may be reclaimed.
    pub inactivity_window_ms: u64,
    pub max_queue_depth: usize,
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub enabled: bool,
    pub frames: u32,
    pub width: u32,
    pub height: u32,
    pub key_frame_interval: u64,
    /// Outputs the loopback engine holds back and releases reversed.
    pub reorder_window: usize,
    /// Simulated engine time per unit.
    pub frame_delay_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            inactivity_window_ms: 10_000,
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
            demo: DemoConfig::default(),
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frames: 120,
            width: 320,
            height: 240,
            key_frame_interval: 30,
            reorder_window: 2,
            frame_delay_ms: 2,
        }
    }
}

impl AppConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        if config.max_queue_depth == 0 {
            anyhow::bail!("max_queue_depth must be at least 1");
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("read {}: {}", path.display(), e))?;
        Self::from_json(&json)
    }

    pub fn inactivity_window(&self) -> Duration {
        Duration::from_millis(self.inactivity_window_ms)
    }
}

/// Loaded from the JSON file named by the first argument, defaults
/// otherwise.
pub fn config() -> &'static AppConfig {
    static CONFIG: LazyLock<AppConfig> = LazyLock::new(|| match std::env::args().nth(1) {
        Some(path) => AppConfig::load(&path).unwrap_or_else(|e| {
            eprintln!("Error loading config {}: {:#}", path, e);
            std::process::exit(1);
        }),
        None => AppConfig::default(),
    });
    &CONFIG
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
