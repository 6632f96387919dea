//! Shared harness for the end-to-end specs.

use sq_agent::{Agent, AgentConfig, PayloadKind, SinkMode};
use sq_core::{Clock, SystemClock};
use sq_manager::config::AlgoSection;
use sq_manager::{Balancer, Server, SessionCtx, Storage, TrafficMonitor};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub struct ManagerHarness {
    pub dir: tempfile::TempDir,
    pub ctx: Arc<SessionCtx>,
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
}

impl ManagerHarness {
    pub async fn start() -> ManagerHarness {
        let dir = tempfile::tempdir().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ctx = Arc::new(SessionCtx {
            storage: Arc::new(Storage::new(dir.path())),
            balancer: Arc::new(Balancer::from_config(
                &AlgoSection::default(),
                Arc::clone(&clock),
            )),
            monitor: Arc::new(TrafficMonitor::new(Arc::clone(&clock))),
            clock,
        });

        let server = Server::bind("127.0.0.1:0", Arc::clone(&ctx)).await.unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        tokio::spawn(server.run(Arc::clone(&shutdown)));

        ManagerHarness {
            dir,
            ctx,
            addr,
            shutdown,
        }
    }

    pub fn stop(&self) {
        self.shutdown.notify_one();
    }
}

/// A remote-mode agent pointed at the harness, with its own output dir.
pub fn remote_agent(
    app: &str,
    addr: SocketAddr,
    output: &std::path::Path,
    payload: PayloadKind,
) -> Agent {
    let config = AgentConfig::new();
    config.set_app_name(app);
    config.set_output_dir(output.to_path_buf());
    config.set_mode(SinkMode::Remote);
    config.set_payload(payload);
    config.set_manager("127.0.0.1", addr.port());
    Agent::new(config)
}

/// Poll `check` until it passes or the deadline expires.
pub async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
