//! S3 and invariant 9: a manual mute on the manager sticks across an agent
//! reconnect, and a pushed config gates the agent's next policy check.

use crate::prelude::*;
use serde_json::json;
use sq_agent::{PayloadKind, TraceSite};
use sq_core::{FuncId, MutedBy};

#[tokio::test]
async fn manual_mute_sticks_across_reconnect() {
    let manager = ManagerHarness::start().await;
    let agent_dir = tempfile::tempdir().unwrap();

    // First session: register the function with the manager.
    {
        let agent = remote_agent("sticky", manager.addr, agent_dir.path(), PayloadKind::Compress);
        let tracer = agent.tracer();
        let logger = agent.logger("sticky");
        let site = TraceSite::new("sticky.rs", "chatty");
        tracer.call(&site, &[], || {
            logger.info("n=%s", vec![json!(1)]);
        });

        wait_until("identity synced", || {
            manager
                .ctx
                .storage
                .get_app_config("sticky")
                .functions
                .contains_key(&FuncId(1))
        })
        .await;
        agent.shutdown().await;
    }

    // Dashboard mutes the function manually while the agent is away.
    manager
        .ctx
        .storage
        .update_control("sticky", FuncId(1), None, false, MutedBy::Manual);

    // Second session: the agent's handshake optimistically reports
    // enabled=true, but the reply re-imposes the mute.
    let agent = remote_agent("sticky", manager.addr, agent_dir.path(), PayloadKind::Compress);
    let tracer = agent.tracer();
    let logger = agent.logger("sticky");
    let site = TraceSite::new("sticky.rs", "chatty");

    // Traffic forces a connect (and with it the handshake + reply).
    tracer.call(&site, &[], || {
        logger.info("n=%s", vec![json!(2)]);
    });

    wait_until("mute applied on agent", || {
        agent.policy().should_mute(FuncId(1), None)
    })
    .await;

    // The server side still shows the sticky manual mute.
    let config = manager.ctx.storage.get_app_config("sticky");
    let func = &config.functions[&FuncId(1)];
    assert!(!func.enabled);
    assert_eq!(func.muted_by, Some(MutedBy::Manual));

    agent.shutdown().await;
    manager.stop();
}
