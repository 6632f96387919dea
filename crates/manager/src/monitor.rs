// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide ingestion counters for the dashboard.
//!
//! QPS is recomputed whenever a tick or snapshot crosses a second boundary;
//! there is no background task. `snapshot()` rolls the window forward too,
//! so an idle manager reports a decaying rate rather than the last burst.

use parking_lot::Mutex;
use serde::Serialize;
use sq_core::Clock;
use std::sync::Arc;

#[derive(Debug)]
struct Inner {
    total_logs: u64,
    qps: f64,
    window_sec: f64,
    window_count: u64,
}

impl Inner {
    /// Recompute QPS when `now` has crossed into a later second.
    fn roll(&mut self, now: f64) {
        let sec = now.floor();
        if sec > self.window_sec {
            let elapsed = sec - self.window_sec;
            self.qps = self.window_count as f64 / elapsed;
            self.window_count = 0;
            self.window_sec = sec;
        }
    }
}

/// Dashboard-facing counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    pub uptime_secs: u64,
    pub total_logs: u64,
    pub qps: f64,
}

/// One per manager process, fed from the session handlers' LOG_DATA path.
pub struct TrafficMonitor {
    clock: Arc<dyn Clock>,
    started_at: f64,
    inner: Mutex<Inner>,
}

impl TrafficMonitor {
    pub fn new(clock: Arc<dyn Clock>) -> TrafficMonitor {
        let started_at = clock.now_epoch();
        TrafficMonitor {
            clock,
            started_at,
            inner: Mutex::new(Inner {
                total_logs: 0,
                qps: 0.0,
                window_sec: started_at.floor(),
                window_count: 0,
            }),
        }
    }

    /// Record `count` ingested log items.
    pub fn tick(&self, count: u64) {
        let now = self.clock.now_epoch();
        let mut inner = self.inner.lock();
        inner.roll(now);
        inner.total_logs += count;
        inner.window_count += count;
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let now = self.clock.now_epoch();
        let mut inner = self.inner.lock();
        inner.roll(now);
        MonitorSnapshot {
            uptime_secs: (now - self.started_at).max(0.0) as u64,
            total_logs: inner.total_logs,
            qps: (inner.qps * 100.0).round() / 100.0,
        }
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
