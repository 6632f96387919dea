// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manager configuration, loaded from `server_config.json`.
//!
//! Every field defaults, so a partial file overrides only the sections it
//! names and a missing or corrupt file yields a fully-default config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9999,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub root_dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./squelch_data"),
        }
    }
}

/// Z-Score strategy parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ZScoreParams {
    /// Sliding window, seconds.
    pub window_size: f64,
    /// Mute above this many standard deviations.
    pub threshold: f64,
}

impl Default for ZScoreParams {
    fn default() -> Self {
        Self {
            window_size: 180.0,
            threshold: 3.0,
        }
    }
}

/// Weighted-entropy strategy parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EntropyParams {
    pub window_size: f64,
    /// Z-Score gate for the high-frequency candidate set.
    pub threshold: f64,
    /// Mute candidates whose Shannon entropy falls below this.
    pub min_entropy: f64,
    /// Samples required before entropy is considered at all.
    pub min_samples: usize,
}

impl Default for EntropyParams {
    fn default() -> Self {
        Self {
            window_size: 180.0,
            threshold: 3.0,
            min_entropy: 0.8,
            min_samples: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgoSection {
    pub enable: bool,
    /// `zscore` or `weighted_entropy`; anything else falls back to zscore.
    pub active: String,
    pub zscore: ZScoreParams,
    pub weighted_entropy: EntropyParams,
}

impl Default for AlgoSection {
    fn default() -> Self {
        Self {
            enable: true,
            active: "zscore".to_string(),
            zscore: ZScoreParams::default(),
            weighted_entropy: EntropyParams::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub server: ServerSection,
    pub storage: StorageSection,
    pub algo: AlgoSection,
}

impl ManagerConfig {
    /// Load from `path`. Missing file is normal (defaults); a corrupt file
    /// is reported and ignored.
    pub fn load(path: &Path) -> ManagerConfig {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "config load error, using defaults");
                    ManagerConfig::default()
                }
            },
            Err(_) => ManagerConfig::default(),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
