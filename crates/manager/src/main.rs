// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Squelch manager daemon (squelchd)
//!
//! Background process that ingests agent log traffic, persists per-app
//! policy trees and raw logs, and pushes mute decisions back on heartbeats.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use sq_manager::balancer::Balancer;
use sq_manager::config::ManagerConfig;
use sq_manager::monitor::TrafficMonitor;
use sq_manager::server::Server;
use sq_manager::session::SessionCtx;
use sq_manager::storage::Storage;

use fs2::FileExt;
use sq_core::SystemClock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before touching config or the lock file
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("squelchd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("squelchd {}", env!("CARGO_PKG_VERSION"));
                println!("Squelch manager daemon - ingests agent log traffic and");
                println!("pushes adaptive mute decisions back to agents");
                println!();
                println!("USAGE:");
                println!("    squelchd");
                println!();
                println!("Configuration is read from ./server_config.json when present.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: squelchd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = ManagerConfig::load(Path::new("server_config.json"));
    let root = config.storage.root_dir.clone();
    std::fs::create_dir_all(&root)?;

    // Single instance per storage root
    let _lock = match acquire_lock(&root) {
        Ok(lock) => lock,
        Err(_) => {
            eprintln!("squelchd is already running for {}", root.display());
            std::process::exit(1);
        }
    };

    let _log_guard = setup_logging(&root)?;
    info!("starting manager");

    let clock: Arc<dyn sq_core::Clock> = Arc::new(SystemClock);
    let ctx = Arc::new(SessionCtx {
        storage: Arc::new(Storage::new(root)),
        balancer: Arc::new(Balancer::from_config(&config.algo, Arc::clone(&clock))),
        monitor: Arc::new(TrafficMonitor::new(Arc::clone(&clock))),
        clock,
    });

    let shutdown = Arc::new(Notify::new());
    let server = Server::bind(&config.listen_addr(), ctx).await?;
    let addr = server.local_addr()?;

    info!(%addr, "manager ready");
    println!("squelchd listening on {addr}");

    let server_task = tokio::spawn(server.run(Arc::clone(&shutdown)));

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    shutdown.notify_one();
    if let Err(e) = server_task.await {
        error!(error = %e, "server task failed");
    }
    info!("manager stopped");
    Ok(())
}

/// Take the exclusive daemon lock under the storage root.
fn acquire_lock(root: &Path) -> std::io::Result<std::fs::File> {
    let path: PathBuf = root.join("squelchd.lock");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)?;
    file.try_lock_exclusive()?;
    Ok(file)
}

fn setup_logging(
    root: &Path,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let file_appender = tracing_appender::rolling::never(root, "squelchd.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
