// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Accept loop: one spawned session task per inbound agent connection.

use crate::session::{self, SessionCtx, SessionError};
use sq_protocol::ProtocolError;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

/// The manager's TCP front door.
pub struct Server {
    listener: TcpListener,
    ctx: Arc<SessionCtx>,
}

impl Server {
    pub async fn bind(addr: &str, ctx: Arc<SessionCtx>) -> std::io::Result<Server> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Server { listener, ctx })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept until `shutdown` fires, spawning a task per connection.
    pub async fn run(self, shutdown: Arc<Notify>) {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("server shutting down");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "agent connected");
                        let ctx = Arc::clone(&self.ctx);
                        tokio::spawn(async move {
                            match session::handle_session(stream, ctx).await {
                                Ok(()) => {}
                                Err(SessionError::Protocol(ProtocolError::ConnectionClosed)) => {
                                    debug!(%peer, "session closed");
                                }
                                Err(e) => warn!(%peer, error = %e, "session error"),
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "accept error");
                    }
                }
            }
        }
    }
}
