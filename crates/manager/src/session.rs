// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection session handler.
//!
//! One task per accepted agent connection. The only per-session state is
//! the app name, set by the first HANDSHAKE (or HEARTBEAT). Malformed JSON
//! bodies are skipped; an EOF or I/O error ends the session.

use crate::balancer::Balancer;
use crate::monitor::TrafficMonitor;
use crate::storage::Storage;
use sq_core::{Clock, FuncId, ParsedRecord};
use sq_protocol::{
    decode_body, read_packet, write_packet, ConfigReply, Handshake, Heartbeat, LogData, PacketKind,
    PayloadKind, ProtocolError,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpStream;

/// Shared manager context handed to every session.
pub struct SessionCtx {
    pub storage: Arc<Storage>,
    pub balancer: Arc<Balancer>,
    pub monitor: Arc<TrafficMonitor>,
    pub clock: Arc<dyn Clock>,
}

/// Errors that terminate a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Run one session to completion.
pub async fn handle_session(stream: TcpStream, ctx: Arc<SessionCtx>) -> Result<(), SessionError> {
    let (mut reader, mut writer) = stream.into_split();
    let mut app_name = "unknown".to_string();

    loop {
        let (kind, body) = match read_packet(&mut reader).await {
            Ok(packet) => packet,
            Err(ProtocolError::ConnectionClosed) => {
                tracing::debug!(app = %app_name, "agent disconnected");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match kind {
            PacketKind::Handshake => {
                let Ok(handshake) = decode_body::<Handshake>(&body) else {
                    continue;
                };
                app_name = handshake.app_name.clone();
                tracing::info!(app = %app_name, "agent handshake");
                if app_name != "unknown" {
                    ctx.storage.sync_config(&app_name, &handshake.config);
                    ctx.storage.update_stats(&app_name, &handshake.blocked_stats);
                    reply_config(&mut writer, &ctx, &app_name).await?;
                }
            }

            PacketKind::LogData => {
                let Ok(data) = decode_body::<LogData>(&body) else {
                    continue;
                };
                ctx.monitor.tick(data.log.len() as u64);
                if app_name == "unknown" {
                    continue;
                }
                for item in data.log.items() {
                    let line = ingest_item(&ctx, &app_name, item, data.kind);
                    ctx.storage.write_log(&app_name, &line);
                }
            }

            PacketKind::Heartbeat => {
                let Ok(heartbeat) = decode_body::<Heartbeat>(&body) else {
                    continue;
                };
                if app_name == "unknown" {
                    app_name = heartbeat.app_name.clone();
                }
                if app_name != "unknown" {
                    ctx.storage.update_stats(&app_name, &heartbeat.blocked_stats);
                    ctx.balancer.run_analysis_cycle(&app_name, &ctx.storage);
                    reply_config(&mut writer, &ctx, &app_name).await?;
                }
            }
        }
    }
}

/// Feed one payload into the analyzer and return the line to persist.
fn ingest_item(ctx: &SessionCtx, app: &str, item: &str, kind: PayloadKind) -> String {
    match kind {
        PayloadKind::Compress => {
            match ParsedRecord::parse(item) {
                Ok(record) => {
                    ctx.balancer.record_traffic(app, record.func_id, &record.values);
                }
                Err(e) => tracing::debug!(app, error = %e, "unparseable compressed record"),
            }
            item.to_string()
        }
        PayloadKind::Normal => {
            // JSON wire form: expand to the human-readable line and pull
            // out the fid for the analyzer. Anything else is stored raw.
            match serde_json::from_str::<serde_json::Value>(item) {
                Ok(obj) if obj.get("ts").is_some() && obj.get("msg").is_some() => {
                    if let Some(fid) = obj.get("fid").and_then(|v| v.as_u64()) {
                        if fid != 0 {
                            ctx.balancer.record_traffic(app, FuncId(fid), &[]);
                        }
                    }
                    format!(
                        "{} [{}] {}: {}",
                        obj.get("ts").and_then(|v| v.as_str()).unwrap_or_default(),
                        obj.get("name").and_then(|v| v.as_str()).unwrap_or("root"),
                        obj.get("lvl").and_then(|v| v.as_str()).unwrap_or("INFO"),
                        obj.get("msg").and_then(|v| v.as_str()).unwrap_or_default(),
                    )
                }
                _ => item.to_string(),
            }
        }
    }
}

/// Reply with the authoritative config, framed as a heartbeat.
async fn reply_config<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    ctx: &SessionCtx,
    app: &str,
) -> Result<(), ProtocolError> {
    let reply = ConfigReply {
        timestamp: ctx.clock.now_epoch(),
        config: ctx.storage.get_app_config(app),
    };
    write_packet(writer, PacketKind::Heartbeat, &reply).await
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
