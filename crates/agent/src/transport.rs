// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP transport to the manager.
//!
//! One long-lived connection. A handshake carrying the registry snapshot is
//! sent on every successful connect; three background tasks (sender,
//! heartbeat, receiver) are spawned on the first one and live across
//! reconnects. Frame emission goes through one write lock so concurrent
//! senders cannot interleave bytes. Any I/O error just flips `connected` to
//! false; the next `send_log` retries.

use crate::config::AgentConfig;
use crate::registry::Registry;
use sq_protocol::{
    read_packet, write_packet, ConfigReply, Handshake, Heartbeat, LogBatch, LogData, PacketKind,
    PayloadKind,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};

/// Outbound queue capacity; overflow means drop-with-`false`.
const QUEUE_CAPACITY: usize = 50_000;

/// Connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Short send timeout so a stalled peer cannot wedge the senders.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default heartbeat interval.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Heartbeat interval override (`SQUELCH_HEARTBEAT_MS`), for tests.
fn heartbeat_interval() -> Duration {
    std::env::var("SQUELCH_HEARTBEAT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(HEARTBEAT_INTERVAL)
}

/// TCP client side of the agent↔manager link.
pub struct Transport {
    config: AgentConfig,
    registry: Arc<Registry>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    reader: Mutex<Option<OwnedReadHalf>>,
    connected: AtomicBool,
    queue_tx: mpsc::Sender<LogData>,
    queue_rx: parking_lot::Mutex<Option<mpsc::Receiver<LogData>>>,
    tasks_started: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl Transport {
    pub fn new(config: AgentConfig, registry: Arc<Registry>) -> Arc<Transport> {
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Transport {
            config,
            registry,
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            connected: AtomicBool::new(false),
            queue_tx,
            queue_rx: parking_lot::Mutex::new(Some(queue_rx)),
            tasks_started: AtomicBool::new(false),
            shutdown_tx,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Open the connection and send the handshake. Returns `false` on any
    /// failure, leaving the transport disconnected.
    pub async fn connect(self: &Arc<Self>) -> bool {
        if *self.shutdown_tx.borrow() {
            return false;
        }

        let addr = self.config.manager_addr();
        let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::debug!(addr, error = %e, "manager connect failed");
                return false;
            }
            Err(_) => {
                tracing::debug!(addr, "manager connect timed out");
                return false;
            }
        };

        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);
        *self.reader.lock().await = Some(read_half);
        self.connected.store(true, Ordering::Relaxed);

        self.start_tasks();

        if !self.send_handshake().await {
            return false;
        }

        tracing::debug!(addr, "connected to manager");
        true
    }

    /// Identity sync: snapshot + pending block stats, persisting the
    /// registry at the same moment.
    pub async fn send_handshake(&self) -> bool {
        let handshake = Handshake {
            app_name: self.config.app_name(),
            config: self.registry.snapshot(),
            blocked_stats: self.registry.get_and_clear_stats(),
        };
        let sent = self.write_frame(PacketKind::Handshake, &handshake).await;
        self.registry.save(&self.config.registry_path());
        sent
    }

    /// Signal all tasks to stop and close the socket.
    pub async fn disconnect(&self) {
        let _ = self.shutdown_tx.send(true);
        self.connected.store(false, Ordering::Relaxed);
        *self.writer.lock().await = None;
        *self.reader.lock().await = None;
    }

    /// Non-blocking enqueue of one batch. `false` means the caller should
    /// fall back to the local file: either we are disconnected and the
    /// reconnect failed, or the outbound queue is full.
    pub async fn send_log(self: &Arc<Self>, batch: Vec<String>, kind: PayloadKind) -> bool {
        if !self.is_connected() && !self.connect().await {
            return false;
        }
        let body = LogData {
            log: LogBatch::Many(batch),
            kind,
        };
        match self.queue_tx.try_send(body) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!("outbound queue full, dropping batch");
                false
            }
        }
    }

    /// Serialize and write one frame under the write lock.
    async fn write_frame<T: serde::Serialize>(&self, kind: PacketKind, body: &T) -> bool {
        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(writer) => {
                match tokio::time::timeout(WRITE_TIMEOUT, write_packet(writer, kind, body)).await {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        tracing::debug!(error = %e, "frame write failed");
                        *guard = None;
                        self.connected.store(false, Ordering::Relaxed);
                        false
                    }
                    Err(_) => {
                        tracing::debug!("frame write timed out");
                        *guard = None;
                        self.connected.store(false, Ordering::Relaxed);
                        false
                    }
                }
            }
            None => {
                self.connected.store(false, Ordering::Relaxed);
                false
            }
        }
    }

    fn start_tasks(self: &Arc<Self>) {
        if self.tasks_started.swap(true, Ordering::SeqCst) {
            return;
        }

        // Sender: drains the outbound queue into LOG_DATA frames.
        let transport = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut queue_rx = match self.queue_rx.lock().take() {
            Some(rx) => rx,
            None => return,
        };
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    item = queue_rx.recv() => match item {
                        Some(body) => {
                            // Best-effort: a failed write drops the batch and
                            // marks the link down.
                            transport.write_frame(PacketKind::LogData, &body).await;
                        }
                        None => break,
                    }
                }
            }
        });

        // Heartbeat: liveness plus pending block stats.
        let transport = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(heartbeat_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        if transport.is_connected() {
                            let body = Heartbeat {
                                timestamp: epoch_now(),
                                app_name: transport.config.app_name(),
                                blocked_stats: transport.registry.get_and_clear_stats(),
                            };
                            transport.write_frame(PacketKind::Heartbeat, &body).await;
                        }
                    }
                }
            }
        });

        // Receiver: applies manager config pushed back on heartbeats. Each
        // connect hands the new read half over through the slot; the
        // receiver owns it while reading so reconnects never contend with a
        // blocked read.
        let transport = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                let taken = transport.reader.lock().await.take();
                match taken {
                    Some(mut reader) => loop {
                        let result = tokio::select! {
                            _ = shutdown.changed() => return,
                            r = read_packet(&mut reader) => r,
                        };
                        match result {
                            Ok((kind, body)) => transport.handle_packet(kind, &body),
                            Err(e) => {
                                tracing::debug!(error = %e, "receive loop ended");
                                transport.connected.store(false, Ordering::Relaxed);
                                break;
                            }
                        }
                    },
                    None => {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                }
            }
        });
    }

    fn handle_packet(&self, kind: PacketKind, body: &[u8]) {
        if kind != PacketKind::Heartbeat {
            return;
        }
        // Replies are heartbeat-framed; a body without `config` is not for us.
        if let Ok(reply) = sq_protocol::decode_body::<ConfigReply>(body) {
            self.registry.sync_from_server(&reply.config);
            self.registry.save(&self.config.registry_path());
        }
    }
}

fn epoch_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
