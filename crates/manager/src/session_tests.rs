// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::balancer::Balancer;
use crate::config::AlgoSection;
use crate::monitor::TrafficMonitor;
use crate::storage::Storage;
use sq_core::{FakeClock, FunctionEntry, MutedBy, RegistryDoc, TraceRecord};
use sq_protocol::LogBatch;
use std::collections::HashMap;
use tokio::net::TcpListener;

struct Harness {
    _dir: tempfile::TempDir,
    ctx: Arc<SessionCtx>,
    clock: Arc<FakeClock>,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(FakeClock::at(1000.0));
    let storage = Arc::new(Storage::new(dir.path()));
    let balancer = Arc::new(Balancer::from_config(
        &AlgoSection::default(),
        clock.clone(),
    ));
    let monitor = Arc::new(TrafficMonitor::new(clock.clone()));
    Harness {
        _dir: dir,
        ctx: Arc::new(SessionCtx {
            storage,
            balancer,
            monitor,
            clock: clock.clone(),
        }),
        clock,
    }
}

async fn connect_session(ctx: Arc<SessionCtx>) -> TcpStream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ = handle_session(stream, ctx).await;
    });
    TcpStream::connect(addr).await.unwrap()
}

fn client_doc() -> RegistryDoc {
    let mut doc = RegistryDoc::new("shop");
    doc.functions
        .insert(FuncId(1), FunctionEntry::new("shop.py:checkout"));
    doc
}

#[tokio::test]
async fn handshake_syncs_config_and_replies_authoritatively() {
    let h = harness();
    // Manual mute created before the agent connects.
    h.ctx.storage.sync_config("shop", &client_doc());
    h.ctx
        .storage
        .update_control("shop", FuncId(1), None, false, MutedBy::Manual);

    let mut stream = connect_session(Arc::clone(&h.ctx)).await;
    let handshake = Handshake {
        app_name: "shop".to_string(),
        config: client_doc(), // optimistic enabled=true
        blocked_stats: HashMap::from([("1".to_string(), 4)]),
    };
    write_packet(&mut stream, PacketKind::Handshake, &handshake)
        .await
        .unwrap();

    let (kind, body) = read_packet(&mut stream).await.unwrap();
    assert_eq!(kind, PacketKind::Heartbeat);
    let reply: ConfigReply = decode_body(&body).unwrap();

    // The sticky manual mute survived the optimistic handshake.
    let func = &reply.config.functions[&FuncId(1)];
    assert!(!func.enabled);
    assert_eq!(func.muted_by, Some(MutedBy::Manual));

    // Handshake stats were accumulated.
    assert_eq!(h.ctx.storage.blocked_stats("shop").get("1"), Some(&4));
}

#[tokio::test]
async fn log_data_ticks_monitor_and_persists_raw_lines() {
    let h = harness();
    let mut stream = connect_session(Arc::clone(&h.ctx)).await;

    let handshake = Handshake {
        app_name: "shop".to_string(),
        config: client_doc(),
        blocked_stats: HashMap::new(),
    };
    write_packet(&mut stream, PacketKind::Handshake, &handshake)
        .await
        .unwrap();
    let _ = read_packet(&mut stream).await.unwrap();

    let record = TraceRecord::new(1000.0, 1.5, FuncId(1));
    let line = record.encode_line("shop").unwrap();
    let data = LogData {
        log: LogBatch::Many(vec![line.clone(), line.clone()]),
        kind: PayloadKind::Compress,
    };
    write_packet(&mut stream, PacketKind::LogData, &data)
        .await
        .unwrap();

    // Raw lines land in the app's log file.
    let log_path = h.ctx.storage.root().join("shop").join("shop.log");
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    loop {
        let content = std::fs::read_to_string(&log_path).unwrap_or_default();
        if content.lines().count() == 2 {
            assert!(content.lines().all(|l| l == line));
            break;
        }
        assert!(std::time::Instant::now() < deadline, "log never written");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    assert_eq!(h.ctx.monitor.snapshot().total_logs, 2);
}

#[tokio::test]
async fn log_data_from_unknown_app_only_ticks() {
    let h = harness();
    let mut stream = connect_session(Arc::clone(&h.ctx)).await;

    let data = LogData {
        log: LogBatch::One("1.0000 ghost 1 0.10 [] []".to_string()),
        kind: PayloadKind::Compress,
    };
    write_packet(&mut stream, PacketKind::LogData, &data)
        .await
        .unwrap();

    // Heartbeat afterwards proves the session survived and the counter grew.
    let heartbeat = Heartbeat {
        timestamp: 1000.0,
        app_name: "ghost".to_string(),
        blocked_stats: HashMap::new(),
    };
    write_packet(&mut stream, PacketKind::Heartbeat, &heartbeat)
        .await
        .unwrap();
    let _ = read_packet(&mut stream).await.unwrap();

    assert_eq!(h.ctx.monitor.snapshot().total_logs, 1);
    assert!(!h.ctx.storage.root().join("ghost").join("ghost.log").exists());
}

#[tokio::test]
async fn heartbeat_accumulates_stats_and_reports_balancer_mutes() {
    let h = harness();
    let mut stream = connect_session(Arc::clone(&h.ctx)).await;

    let handshake = Handshake {
        app_name: "shop".to_string(),
        config: client_doc(),
        blocked_stats: HashMap::new(),
    };
    write_packet(&mut stream, PacketKind::Handshake, &handshake)
        .await
        .unwrap();
    let _ = read_packet(&mut stream).await.unwrap();

    // Spam enough compressed records to trip the absolute safeguard.
    let record = TraceRecord::new(1000.0, 0.1, FuncId(1));
    let line = record.encode_line("shop").unwrap();
    let data = LogData {
        log: LogBatch::Many(vec![line; 150]),
        kind: PayloadKind::Compress,
    };
    write_packet(&mut stream, PacketKind::LogData, &data)
        .await
        .unwrap();

    h.clock.advance(5.0);
    let heartbeat = Heartbeat {
        timestamp: 1005.0,
        app_name: "shop".to_string(),
        blocked_stats: HashMap::from([("1".to_string(), 50)]),
    };
    write_packet(&mut stream, PacketKind::Heartbeat, &heartbeat)
        .await
        .unwrap();

    let (kind, body) = read_packet(&mut stream).await.unwrap();
    assert_eq!(kind, PacketKind::Heartbeat);
    let reply: ConfigReply = decode_body(&body).unwrap();

    let func = &reply.config.functions[&FuncId(1)];
    assert!(!func.enabled);
    assert_eq!(func.muted_by, Some(MutedBy::Balancer));
    assert_eq!(h.ctx.storage.blocked_stats("shop").get("1"), Some(&50));

    // A second heartbeat's stats accumulate on top.
    let heartbeat = Heartbeat {
        timestamp: 1006.0,
        app_name: "shop".to_string(),
        blocked_stats: HashMap::from([("1".to_string(), 30)]),
    };
    write_packet(&mut stream, PacketKind::Heartbeat, &heartbeat)
        .await
        .unwrap();
    let _ = read_packet(&mut stream).await.unwrap();
    assert_eq!(h.ctx.storage.blocked_stats("shop").get("1"), Some(&80));
}

#[tokio::test]
async fn malformed_body_is_skipped_and_session_continues() {
    let h = harness();
    let mut stream = connect_session(Arc::clone(&h.ctx)).await;

    // Hand-roll a frame whose body is not valid JSON.
    use tokio::io::AsyncWriteExt;
    let garbage = b"{ not json";
    let mut frame = vec![sq_protocol::PROTO_VERSION, PacketKind::Handshake as u8];
    frame.extend_from_slice(&(garbage.len() as u32).to_be_bytes());
    frame.extend_from_slice(garbage);
    stream.write_all(&frame).await.unwrap();

    // The session is still alive and processes the next packet.
    let handshake = Handshake {
        app_name: "shop".to_string(),
        config: client_doc(),
        blocked_stats: HashMap::new(),
    };
    write_packet(&mut stream, PacketKind::Handshake, &handshake)
        .await
        .unwrap();
    let (kind, _) = read_packet(&mut stream).await.unwrap();
    assert_eq!(kind, PacketKind::Heartbeat);
}

#[tokio::test]
async fn normal_json_records_are_expanded_before_persisting() {
    let h = harness();
    let mut stream = connect_session(Arc::clone(&h.ctx)).await;

    let handshake = Handshake {
        app_name: "shop".to_string(),
        config: client_doc(),
        blocked_stats: HashMap::new(),
    };
    write_packet(&mut stream, PacketKind::Handshake, &handshake)
        .await
        .unwrap();
    let _ = read_packet(&mut stream).await.unwrap();

    let wire = r#"{"ts":"2026-08-01 10:00:00,123","lvl":"INFO","name":"orders","msg":"placed","fid":1,"tid":1}"#;
    let data = LogData {
        log: LogBatch::One(wire.to_string()),
        kind: PayloadKind::Normal,
    };
    write_packet(&mut stream, PacketKind::LogData, &data)
        .await
        .unwrap();

    let log_path = h.ctx.storage.root().join("shop").join("shop.log");
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    loop {
        let content = std::fs::read_to_string(&log_path).unwrap_or_default();
        if !content.is_empty() {
            assert_eq!(content, "2026-08-01 10:00:00,123 [orders] INFO: placed\n");
            break;
        }
        assert!(std::time::Instant::now() < deadline, "log never written");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}
