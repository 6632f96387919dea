// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adaptive rate-limiting: sliding-window traffic analysis per (app, fid).
//!
//! Two interchangeable strategies sit behind [`Strategy`]. Z-Score mutes
//! pure frequency outliers; Weighted Entropy additionally requires the
//! traffic to carry little information before muting, so a burst of unique
//! transaction IDs survives while `status=OK` spam does not.

use crate::config::{AlgoSection, EntropyParams, ZScoreParams};
use crate::storage::Storage;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use sq_core::{Clock, FuncId, MutedBy};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Mute regardless of distribution shape once a single fid exceeds this
/// count inside the window.
const ABSOLUTE_MUTE_COUNT: usize = 100;

/// A mute-decision strategy over per-(app, fid) traffic windows.
pub trait Strategy: Send + Sync {
    /// Record one traffic event.
    fn record(&self, app: &str, fid: FuncId, ts: f64, vars: &[Value]);

    /// Prune expired events and return the fids to mute.
    fn analyze(&self, app: &str, now: f64) -> Vec<FuncId>;
}

/// Sample mean and standard deviation; `None` below two samples or at zero
/// spread.
fn mean_stdev(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let stdev = var.sqrt();
    if stdev == 0.0 {
        None
    } else {
        Some((mean, stdev))
    }
}

/// Shannon entropy of a value distribution, in bits.
fn shannon_entropy<'a>(samples: impl ExactSizeIterator<Item = &'a str>) -> f64 {
    let total = samples.len();
    if total == 0 {
        return 0.0;
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for sample in samples {
        *counts.entry(sample).or_insert(0) += 1;
    }
    let total = total as f64;
    counts
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Pure frequency outlier detection.
pub struct ZScoreStrategy {
    params: ZScoreParams,
    data: Mutex<HashMap<String, HashMap<FuncId, VecDeque<f64>>>>,
}

impl ZScoreStrategy {
    pub fn new(params: ZScoreParams) -> ZScoreStrategy {
        ZScoreStrategy {
            params,
            data: Mutex::new(HashMap::new()),
        }
    }
}

impl Strategy for ZScoreStrategy {
    fn record(&self, app: &str, fid: FuncId, ts: f64, _vars: &[Value]) {
        self.data
            .lock()
            .entry(app.to_string())
            .or_default()
            .entry(fid)
            .or_default()
            .push_back(ts);
    }

    fn analyze(&self, app: &str, now: f64) -> Vec<FuncId> {
        let cutoff = now - self.params.window_size;

        let counts: HashMap<FuncId, usize> = {
            let mut data = self.data.lock();
            let Some(app_data) = data.get_mut(app) else {
                return Vec::new();
            };
            app_data.retain(|_, timestamps| {
                while timestamps.front().is_some_and(|&t| t < cutoff) {
                    timestamps.pop_front();
                }
                !timestamps.is_empty()
            });
            app_data.iter().map(|(fid, ts)| (*fid, ts.len())).collect()
        };

        let mut muted = Vec::new();
        match mean_stdev(&counts.values().map(|&c| c as f64).collect::<Vec<_>>()) {
            Some((mean, stdev)) => {
                for (fid, count) in &counts {
                    let z = (*count as f64 - mean) / stdev;
                    if z > self.params.threshold {
                        tracing::info!(app, fid = %fid, count, z, "frequency burst detected");
                        muted.push(*fid);
                    }
                }
            }
            None => {
                // Degenerate window (lone fid or zero spread): only the
                // absolute safeguard applies.
                for (fid, count) in &counts {
                    if *count > ABSOLUTE_MUTE_COUNT {
                        tracing::info!(app, fid = %fid, count, "absolute threshold exceeded");
                        muted.push(*fid);
                    }
                }
            }
        }
        muted.sort();
        muted
    }
}

/// Frequency outlier detection gated on information content.
pub struct EntropyStrategy {
    params: EntropyParams,
    #[allow(clippy::type_complexity)]
    data: Mutex<HashMap<String, HashMap<FuncId, VecDeque<(f64, String)>>>>,
}

impl EntropyStrategy {
    pub fn new(params: EntropyParams) -> EntropyStrategy {
        EntropyStrategy {
            params,
            data: Mutex::new(HashMap::new()),
        }
    }
}

impl Strategy for EntropyStrategy {
    fn record(&self, app: &str, fid: FuncId, ts: f64, vars: &[Value]) {
        let vars_repr = serde_json::to_string(vars).unwrap_or_default();
        self.data
            .lock()
            .entry(app.to_string())
            .or_default()
            .entry(fid)
            .or_default()
            .push_back((ts, vars_repr));
    }

    fn analyze(&self, app: &str, now: f64) -> Vec<FuncId> {
        let cutoff = now - self.params.window_size;

        let windows: HashMap<FuncId, Vec<String>> = {
            let mut data = self.data.lock();
            let Some(app_data) = data.get_mut(app) else {
                return Vec::new();
            };
            app_data.retain(|_, entries| {
                while entries.front().is_some_and(|&(t, _)| t < cutoff) {
                    entries.pop_front();
                }
                !entries.is_empty()
            });
            app_data
                .iter()
                .map(|(fid, entries)| (*fid, entries.iter().map(|(_, v)| v.clone()).collect()))
                .collect()
        };

        let stats = mean_stdev(
            &windows
                .values()
                .map(|samples| samples.len() as f64)
                .collect::<Vec<_>>(),
        );

        let mut muted = Vec::new();
        for (fid, samples) in &windows {
            let count = samples.len();
            let is_outlier = count > ABSOLUTE_MUTE_COUNT
                || stats.is_some_and(|(mean, stdev)| {
                    (count as f64 - mean) / stdev > self.params.threshold
                });
            if !is_outlier || count < self.params.min_samples {
                continue;
            }

            let entropy = shannon_entropy(samples.iter().map(String::as_str));
            if entropy < self.params.min_entropy {
                tracing::info!(app, fid = %fid, count, entropy, "low-entropy spam detected");
                muted.push(*fid);
            } else {
                tracing::debug!(app, fid = %fid, count, entropy, "high-frequency but informative, kept");
            }
        }
        muted.sort();
        muted
    }
}

/// Strategy selection plus the glue into [`Storage`].
pub struct Balancer {
    enable: bool,
    clock: Arc<dyn Clock>,
    strategy: RwLock<Box<dyn Strategy>>,
}

impl Balancer {
    /// Build from the `algo` config section. Unknown strategy names fall
    /// back to zscore.
    pub fn from_config(algo: &AlgoSection, clock: Arc<dyn Clock>) -> Balancer {
        let strategy = Self::make_strategy(algo, &algo.active);
        Balancer {
            enable: algo.enable,
            clock,
            strategy: RwLock::new(strategy),
        }
    }

    fn make_strategy(algo: &AlgoSection, name: &str) -> Box<dyn Strategy> {
        match name {
            "weighted_entropy" => Box::new(EntropyStrategy::new(algo.weighted_entropy)),
            _ => Box::new(ZScoreStrategy::new(algo.zscore)),
        }
    }

    /// Swap the active strategy, discarding accumulated windows.
    pub fn set_strategy(&self, algo: &AlgoSection, name: &str) {
        tracing::info!(strategy = name, "switching balancer strategy");
        *self.strategy.write() = Self::make_strategy(algo, name);
    }

    /// Feed one traffic event from the ingest path.
    pub fn record_traffic(&self, app: &str, fid: FuncId, vars: &[Value]) {
        if !self.enable || app == "unknown" {
            return;
        }
        self.strategy
            .read()
            .record(app, fid, self.clock.now_epoch(), vars);
    }

    /// Analyze one app's windows; returns the fids muted this cycle.
    pub fn run_analysis_cycle(&self, app: &str, storage: &Storage) -> Vec<FuncId> {
        if !self.enable || app == "unknown" {
            return Vec::new();
        }
        let muted = self.strategy.read().analyze(app, self.clock.now_epoch());
        for fid in &muted {
            storage.update_control(app, *fid, None, false, MutedBy::Balancer);
        }
        muted
    }
}

#[cfg(test)]
#[path = "balancer_tests.rs"]
mod tests;
