// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent assembly: one per process, created at startup and injected where
//! needed — no hidden global state.

use crate::config::AgentConfig;
use crate::interceptor::Tracer;
use crate::logger::Logger;
use crate::policy::PolicyController;
use crate::registry::Registry;
use crate::sink::Sink;
use crate::transport::Transport;
use std::sync::Arc;

/// Internals shared by [`Tracer`] and [`Logger`] handles.
pub(crate) struct Shared {
    pub(crate) config: AgentConfig,
    pub(crate) registry: Arc<Registry>,
    pub(crate) policy: PolicyController,
    pub(crate) sink: Sink,
    pub(crate) transport: Arc<Transport>,
}

/// The in-process agent. Must be created within a tokio runtime: the sink
/// worker and transport tasks are spawned on it.
pub struct Agent {
    shared: Arc<Shared>,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Agent {
        let registry = Arc::new(Registry::load(
            config.app_name(),
            &config.registry_path(),
        ));
        let policy = PolicyController::new(Arc::clone(&registry));
        let transport = Transport::new(config.clone(), Arc::clone(&registry));
        let sink = Sink::start(config.clone(), Arc::clone(&transport));

        Agent {
            shared: Arc::new(Shared {
                config,
                registry,
                policy,
                sink,
                transport,
            }),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.shared.registry
    }

    pub fn policy(&self) -> &PolicyController {
        &self.shared.policy
    }

    /// Handle for the instrumentation layer.
    pub fn tracer(&self) -> Tracer {
        Tracer::new(Arc::clone(&self.shared))
    }

    /// Named logging handle for host code.
    pub fn logger(&self, name: &str) -> Logger {
        Logger::new(name, Arc::clone(&self.shared))
    }

    /// Graceful shutdown: stop intake and drain the sink (bounded), persist
    /// the registry, flush identity and stats to the manager while the link
    /// is still up, then disconnect.
    pub async fn shutdown(&self) {
        self.shared.sink.shutdown().await;
        self.shared.registry.save(&self.shared.config.registry_path());
        if self.shared.transport.is_connected() {
            self.shared.transport.send_handshake().await;
        }
        self.shared.transport.disconnect().await;
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
