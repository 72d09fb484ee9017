//! Importer configuration.
//!
//! Loaded from a TOML file (`--config` path, or `./logjam-importer.toml` if
//! present) with compiled defaults for everything. All fields are read-only
//! after startup.
//!
//! ```toml
//! endpoints = ["tcp://logjam-device-1:9606", "tcp://logjam-device-2:9606"]
//! num_subscribers = 2
//! rcv_hwm = 100000
//! pull_port = 9605
//! router_port = 9604
//! subscriptions = ["my-app", "other-app"]
//! heart_beat_interval = 5
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "logjam-importer.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImporterConfig {
    /// Upstream device PUB endpoints. Sharded across subscribers by index
    /// modulo `num_subscribers`.
    pub endpoints: Vec<String>,
    /// Number of parallel subscriber actors.
    pub num_subscribers: usize,
    /// Receive high-water-mark on each SUB socket.
    pub rcv_hwm: i32,
    /// TCP port for the direct-submission PULL socket (subscriber 0).
    pub pull_port: u16,
    /// TCP port for the direct-submission ROUTER socket (subscriber 0).
    pub router_port: u16,
    /// Topic prefixes to subscribe to. Empty means subscribe to everything.
    pub subscriptions: Vec<String>,
    /// Ticks between device-tracker maintenance runs; also sets the stale
    /// threshold (interval x 1s).
    pub heart_beat_interval: u64,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["tcp://localhost:9606".to_string()],
            num_subscribers: 1,
            rcv_hwm: 100_000,
            pull_port: 9605,
            router_port: 9604,
            subscriptions: Vec::new(),
            heart_beat_interval: 5,
        }
    }
}

impl ImporterConfig {
    pub fn pull_endpoint(&self) -> String {
        format!("tcp://*:{}", self.pull_port)
    }

    pub fn router_endpoint(&self) -> String {
        format!("tcp://*:{}", self.router_port)
    }

    /// Milliseconds after which a silent device counts as stale.
    pub fn stale_after_ms(&self) -> i64 {
        self.heart_beat_interval as i64 * 1_000
    }
}

/// Load configuration.
///
/// An explicit path must exist; the default path is optional and compiled
/// defaults apply when it is absent.
pub fn load(path: Option<&Path>) -> Result<ImporterConfig> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (DEFAULT_CONFIG_FILE.into(), false),
    };
    if !path.exists() {
        if required {
            anyhow::bail!("config file {} does not exist", path.display());
        }
        return Ok(ImporterConfig::default());
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let mut config: ImporterConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    if config.num_subscribers == 0 {
        config.num_subscribers = 1;
    }
    if config.endpoints.is_empty() {
        config.endpoints = ImporterConfig::default().endpoints;
    }
    Ok(config)
}
