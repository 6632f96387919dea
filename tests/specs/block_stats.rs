//! S6: block statistics accumulate across reports and drop to zero when the
//! entry is re-enabled.

use crate::prelude::*;
use serde_json::json;
use sq_agent::{PayloadKind, TraceSite};
use sq_core::{FuncId, MutedBy};

#[tokio::test]
async fn block_stats_accumulate_and_clear_on_reenable() {
    let manager = ManagerHarness::start().await;
    let agent_dir = tempfile::tempdir().unwrap();

    // Register the function, then mute it server-side.
    {
        let agent = remote_agent("stats", manager.addr, agent_dir.path(), PayloadKind::Compress);
        let tracer = agent.tracer();
        let logger = agent.logger("stats");
        let site = TraceSite::new("stats.rs", "noisy");
        tracer.call(&site, &[], || {
            logger.info("n=%s", vec![json!(0)]);
        });
        wait_until("identity synced", || {
            manager
                .ctx
                .storage
                .get_app_config("stats")
                .functions
                .contains_key(&FuncId(1))
        })
        .await;
        agent.shutdown().await;
    }
    manager
        .ctx
        .storage
        .update_control("stats", FuncId(1), None, false, MutedBy::Manual);

    // Two sessions, each reporting blocked calls through its shutdown
    // handshake; the server sums the deltas.
    for round in 0..2u32 {
        let agent = remote_agent("stats", manager.addr, agent_dir.path(), PayloadKind::Compress);
        let tracer = agent.tracer();
        let logger = agent.logger("stats");
        let site = TraceSite::new("stats.rs", "noisy");

        // Open the link so the mute arrives, then generate blocked traffic.
        tracer.call(&site, &[], || {
            logger.info("n=%s", vec![json!(round)]);
        });
        wait_until("mute applied on agent", || {
            agent.policy().should_mute(FuncId(1), None)
        })
        .await;
        // The wait above already counted one block; add four more.
        for _ in 0..4 {
            tracer.call(&site, &[], || {});
        }
        // An unmuted payload outside any trace scope keeps the link alive
        // even when every traced call is muted, so the shutdown handshake
        // has a connection to report the stats over.
        logger.info("round %s done", vec![json!(round)]);
        agent.shutdown().await;
    }

    wait_until("stats accumulated", || {
        manager.ctx.storage.blocked_stats("stats").get("1").copied() >= Some(10)
    })
    .await;

    // Re-enabling clears the counter for the dashboard.
    manager
        .ctx
        .storage
        .update_control("stats", FuncId(1), None, true, MutedBy::Manual);
    assert_eq!(manager.ctx.storage.blocked_stats("stats").get("1"), None);

    manager.stop();
}
