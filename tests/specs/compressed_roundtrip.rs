//! S1: a traced call's compressed record reaches the manager's raw log
//! byte-for-byte, and its IDs resolve against the synced registry.

use crate::prelude::*;
use serde_json::json;
use sq_agent::{PayloadKind, TraceSite};
use sq_core::{FuncId, Level, ParsedRecord, TplId};

#[tokio::test]
async fn compressed_record_roundtrips_to_manager_log() {
    let manager = ManagerHarness::start().await;
    let agent_dir = tempfile::tempdir().unwrap();
    let agent = remote_agent("demo", manager.addr, agent_dir.path(), PayloadKind::Compress);

    let tracer = agent.tracer();
    let logger = agent.logger("demo");
    let site = TraceSite::new("demo.rs", "f");

    tracer.call(&site, &[json!(1)], || {
        logger.info("x=%s", vec![json!(1)]);
    });

    let log_path = manager.dir.path().join("demo").join("demo.log");
    wait_until("manager raw log line", || {
        std::fs::read_to_string(&log_path)
            .map(|s| s.lines().count() == 1)
            .unwrap_or(false)
    })
    .await;

    let raw = std::fs::read_to_string(&log_path).unwrap();
    let line = raw.lines().next().unwrap();
    let parsed = ParsedRecord::parse(line).unwrap();

    assert_eq!(parsed.app_id, "demo");
    assert_eq!(parsed.func_id, FuncId(1));
    assert_eq!(parsed.entries, vec![(Level::Info, TplId(1))]);
    assert_eq!(parsed.values, vec![json!(1)]);

    // The handshake synced the identities, so the manager can resolve the
    // template the entry refers to.
    wait_until("manager registry sync", || {
        manager
            .ctx
            .storage
            .get_app_config("demo")
            .template(FuncId(1), TplId(1))
            .is_some()
    })
    .await;
    let config = manager.ctx.storage.get_app_config("demo");
    assert_eq!(
        config.template(FuncId(1), TplId(1)).map(|t| t.content.as_str()),
        Some("x=%s")
    );

    agent.shutdown().await;
    manager.stop();
}
