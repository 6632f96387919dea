// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent configuration handle.
//!
//! The agent only knows *where* to send logs, not how they are analyzed.
//! Unknown values coerce to safe defaults rather than erroring — a bad knob
//! must never take the host application down.

use parking_lot::RwLock;
use sq_protocol::PayloadKind;
use std::path::PathBuf;
use std::sync::Arc;

/// Default local output directory for the registry and fallback log.
pub const DEFAULT_OUTPUT_DIR: &str = "./squelch_output";

/// Where payloads go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkMode {
    /// Console output.
    #[default]
    Dev,
    /// Local file append.
    File,
    /// Network socket to the manager.
    Remote,
}

impl std::str::FromStr for SinkMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" => Ok(SinkMode::Dev),
            "file" => Ok(SinkMode::File),
            "remote" => Ok(SinkMode::Remote),
            _ => Err(()),
        }
    }
}

#[derive(Debug)]
struct Inner {
    mode: SinkMode,
    payload: PayloadKind,
    output_dir: PathBuf,
    app_name: String,
    manager_ip: String,
    manager_port: u16,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            mode: SinkMode::Dev,
            payload: PayloadKind::Compress,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            app_name: "root".to_string(),
            manager_ip: "127.0.0.1".to_string(),
            manager_port: 9999,
        }
    }
}

/// Cheaply-cloneable configuration shared across the agent's parts.
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    inner: Arc<RwLock<Inner>>,
}

impl AgentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one configuration knob. Unknown enum values coerce to their
    /// defaults; unknown keys are ignored.
    pub fn apply(&self, key: &str, value: &str) {
        match key {
            "mode" => self.set_mode(value.parse().unwrap_or_default()),
            "logtype" => self.set_payload(value.parse().unwrap_or_default()),
            "output" => self.set_output_dir(PathBuf::from(value)),
            "app_name" => self.inner.write().app_name = value.to_string(),
            "manager_ip" => self.inner.write().manager_ip = value.to_string(),
            "manager_port" => {
                if let Ok(port) = value.parse() {
                    self.inner.write().manager_port = port;
                }
            }
            _ => {}
        }
    }

    pub fn mode(&self) -> SinkMode {
        self.inner.read().mode
    }

    pub fn set_mode(&self, mode: SinkMode) {
        self.inner.write().mode = mode;
    }

    pub fn payload(&self) -> PayloadKind {
        self.inner.read().payload
    }

    pub fn set_payload(&self, payload: PayloadKind) {
        self.inner.write().payload = payload;
    }

    pub fn output_dir(&self) -> PathBuf {
        self.inner.read().output_dir.clone()
    }

    pub fn set_output_dir(&self, dir: PathBuf) {
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot create output dir");
        }
        self.inner.write().output_dir = dir;
    }

    pub fn app_name(&self) -> String {
        self.inner.read().app_name.clone()
    }

    pub fn set_app_name(&self, name: impl Into<String>) {
        self.inner.write().app_name = name.into();
    }

    pub fn set_manager(&self, ip: impl Into<String>, port: u16) {
        let mut inner = self.inner.write();
        inner.manager_ip = ip.into();
        inner.manager_port = port;
    }

    pub fn manager_addr(&self) -> String {
        let inner = self.inner.read();
        format!("{}:{}", inner.manager_ip, inner.manager_port)
    }

    /// `<output_dir>/<app_name>.json` — the persisted registry.
    pub fn registry_path(&self) -> PathBuf {
        let inner = self.inner.read();
        inner.output_dir.join(format!("{}.json", inner.app_name))
    }

    /// `<output_dir>/<app_name>.log` — the local fallback log.
    pub fn log_path(&self) -> PathBuf {
        let inner = self.inner.read();
        inner.output_dir.join(format!("{}.log", inner.app_name))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
