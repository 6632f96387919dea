// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction so window-based logic is testable.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time as fractional seconds since epoch.
pub trait Clock: Send + Sync {
    fn now_epoch(&self) -> f64;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

/// Manually-advanced clock for tests.
#[derive(Debug, Clone, Default)]
pub struct FakeClock {
    now: Arc<Mutex<f64>>,
}

impl FakeClock {
    pub fn at(epoch: f64) -> Self {
        Self {
            now: Arc::new(Mutex::new(epoch)),
        }
    }

    pub fn advance(&self, secs: f64) {
        *self.now.lock() += secs;
    }

    pub fn set(&self, epoch: f64) {
        *self.now.lock() = epoch;
    }
}

impl Clock for FakeClock {
    fn now_epoch(&self) -> f64 {
        *self.now.lock()
    }
}
