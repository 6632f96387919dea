// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The sink worker: drains queued payloads into the console, a local file,
//! or the manager, batching as it goes.
//!
//! Payloads of differing kinds never share a batch. When a remote send
//! fails, the batch lands in the local file instead; "normal" JSON wire
//! records are re-expanded to human-readable lines on the way down.

use crate::config::{AgentConfig, SinkMode};
use crate::transport::Transport;
use sq_protocol::PayloadKind;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Flush when a batch reaches this many items...
const BATCH_SIZE: usize = 100;

/// ...or when this much time has passed since the last flush.
const FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// Bounded wait for the queue to drain at shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

/// Handle to the sink worker task.
pub struct Sink {
    tx: parking_lot::Mutex<Option<mpsc::UnboundedSender<(String, PayloadKind)>>>,
    worker: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Sink {
    /// Spawn the worker. Must be called within a tokio runtime.
    pub fn start(config: AgentConfig, transport: Arc<Transport>) -> Sink {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(async move {
            Worker::new(config, transport).run(rx).await;
        });
        Sink {
            tx: parking_lot::Mutex::new(Some(tx)),
            worker: parking_lot::Mutex::new(Some(worker)),
        }
    }

    /// Enqueue one payload. Returns `false` after shutdown has begun.
    pub fn push(&self, payload: String, kind: PayloadKind) -> bool {
        match &*self.tx.lock() {
            Some(tx) => tx.send((payload, kind)).is_ok(),
            None => false,
        }
    }

    /// Stop accepting items, drain the queue within a bounded wait, then
    /// stop the worker.
    pub async fn shutdown(&self) {
        // Dropping the sender lets the worker observe end-of-queue after the
        // remaining items.
        drop(self.tx.lock().take());

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let abort = handle.abort_handle();
            if tokio::time::timeout(SHUTDOWN_DRAIN, handle).await.is_err() {
                tracing::warn!("sink worker did not drain in time, aborting");
                abort.abort();
            }
        }
    }
}

struct Worker {
    config: AgentConfig,
    transport: Arc<Transport>,
    batch: Vec<String>,
    batch_kind: Option<PayloadKind>,
    file: Option<std::fs::File>,
    file_path: Option<PathBuf>,
    last_mode: SinkMode,
}

impl Worker {
    fn new(config: AgentConfig, transport: Arc<Transport>) -> Worker {
        let last_mode = config.mode();
        Worker {
            config,
            transport,
            batch: Vec::new(),
            batch_kind: None,
            file: None,
            file_path: None,
            last_mode,
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<(String, PayloadKind)>) {
        let mut last_flush = Instant::now();
        let mut closed = false;

        loop {
            match tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
                Ok(Some((payload, kind))) => {
                    if self.batch_kind.is_some_and(|k| k != kind) {
                        self.flush().await;
                        last_flush = Instant::now();
                    }
                    self.batch_kind = Some(kind);
                    self.batch.push(payload);
                }
                Ok(None) => closed = true,
                Err(_) => {}
            }

            let due = self.batch.len() >= BATCH_SIZE
                || last_flush.elapsed() >= FLUSH_INTERVAL
                || closed;
            if !self.batch.is_empty() && due {
                self.flush().await;
                last_flush = Instant::now();
            }

            if closed && self.batch.is_empty() {
                break;
            }
        }
        // File handle closes on drop.
    }

    async fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        let kind = self.batch_kind.unwrap_or_default();
        let batch = std::mem::take(&mut self.batch);
        let mode = self.config.mode();

        // Leaving FILE mode releases the handle; fallback writes reopen it.
        if self.last_mode == SinkMode::File && mode != SinkMode::File {
            self.file = None;
            self.file_path = None;
        }
        self.last_mode = mode;

        match mode {
            SinkMode::Dev => {
                for item in &batch {
                    println!("{item}");
                }
            }
            SinkMode::File => self.write_local(&batch, kind),
            SinkMode::Remote => {
                if !self.transport.send_log(batch.clone(), kind).await {
                    self.write_local(&batch, kind);
                }
            }
        }
    }

    fn write_local(&mut self, batch: &[String], kind: PayloadKind) {
        let path = self.config.log_path();
        if self.file.is_none() || self.file_path.as_deref() != Some(path.as_path()) {
            self.file = None;
            match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => {
                    self.file = Some(file);
                    self.file_path = Some(path);
                }
                Err(e) => {
                    tracing::warn!(path = %self.config.log_path().display(), error = %e, "cannot open local log");
                    return;
                }
            }
        }

        if let Some(file) = self.file.as_mut() {
            for item in batch {
                let line = match kind {
                    PayloadKind::Normal => expand_normal(item),
                    PayloadKind::Compress => item.clone(),
                };
                if let Err(e) = writeln!(file, "{line}") {
                    tracing::warn!(error = %e, "local log write failed");
                    self.file = None;
                    self.file_path = None;
                    return;
                }
            }
        }
    }
}

/// Re-expand a "normal" JSON wire record to its human-readable line.
/// Non-JSON payloads pass through untouched — better raw than lost.
fn expand_normal(msg: &str) -> String {
    if !msg.trim_start().starts_with('{') {
        return msg.to_string();
    }
    match serde_json::from_str::<serde_json::Value>(msg) {
        Ok(obj) => {
            let (ts, text) = match (obj.get("ts"), obj.get("msg")) {
                (Some(ts), Some(text)) => (ts, text),
                _ => return msg.to_string(),
            };
            let lvl = obj.get("lvl").and_then(|v| v.as_str()).unwrap_or("INFO");
            let name = obj.get("name").and_then(|v| v.as_str()).unwrap_or("root");
            format!(
                "{} [{}] {}: {}",
                ts.as_str().unwrap_or_default(),
                name,
                lvl,
                text.as_str().unwrap_or_default()
            )
        }
        Err(_) => msg.to_string(),
    }
}

#[cfg(test)]
#[path = "sink_tests.rs"]
mod tests;
