//! S2: with the manager port closed, remote-mode payloads land in the
//! agent's local fallback file within a flush interval.

use crate::prelude::*;
use serde_json::json;
use sq_agent::{PayloadKind, TraceSite};

#[tokio::test]
async fn payloads_fall_back_to_local_file_when_manager_is_down() {
    // Bind-then-drop guarantees a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let agent_dir = tempfile::tempdir().unwrap();
    let agent = remote_agent("offline", addr, agent_dir.path(), PayloadKind::Compress);
    let tracer = agent.tracer();
    let logger = agent.logger("offline");
    let site = TraceSite::new("offline.rs", "emit");

    for i in 0..10 {
        tracer.call(&site, &[], || {
            logger.info("i=%s", vec![json!(i)]);
        });
    }

    let fallback = agent.config().log_path();
    wait_until("10 fallback lines", || {
        std::fs::read_to_string(&fallback)
            .map(|s| s.lines().count() == 10)
            .unwrap_or(false)
    })
    .await;

    agent.shutdown().await;
}
