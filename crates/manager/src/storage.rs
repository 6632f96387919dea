// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-app policy trees and raw log files on disk.
//!
//! Layout: `<root>/<app>/<app>.json` (policy + accumulated block stats) and
//! `<root>/<app>/<app>.log` (raw log sink). The in-memory cache is loaded
//! lazily per app and persisted after every mutation with a tmp+rename.
//!
//! Merge rule that everything else hangs off: an entry the server has muted
//! (`muted_by` present) keeps `enabled = false` no matter what the agent's
//! optimistic handshake claims.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sq_core::{block_key, FuncId, MutedBy, RegistryDoc, TplId};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Authoritative per-app state: the policy tree plus block statistics
/// accumulated from agent heartbeats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppPolicy {
    pub config: RegistryDoc,
    #[serde(default)]
    pub blocked_stats: BTreeMap<String, u64>,
    /// When this tree last changed.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Default for AppPolicy {
    fn default() -> Self {
        Self {
            config: RegistryDoc::default(),
            blocked_stats: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Manager-side storage. One instance per process; one lock per instance —
/// operations are short and never on the ingest hot path's critical section
/// longer than a map merge plus a small file write.
pub struct Storage {
    root: PathBuf,
    apps: Mutex<HashMap<String, AppPolicy>>,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Storage {
        Storage {
            root: root.into(),
            apps: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn app_dir(&self, app: &str) -> PathBuf {
        self.root.join(app)
    }

    fn policy_path(&self, app: &str) -> PathBuf {
        self.app_dir(app).join(format!("{app}.json"))
    }

    fn log_path(&self, app: &str) -> PathBuf {
        self.app_dir(app).join(format!("{app}.log"))
    }

    /// Lazy-load hook; callers hold the lock.
    fn ensure_loaded(&self, apps: &mut HashMap<String, AppPolicy>, app: &str) {
        if apps.contains_key(app) {
            return;
        }
        let policy = match std::fs::read_to_string(self.policy_path(app)) {
            Ok(raw) => match serde_json::from_str::<AppPolicy>(&raw) {
                Ok(policy) => policy,
                Err(e) => {
                    tracing::warn!(app, error = %e, "corrupt policy file, starting fresh");
                    AppPolicy::default()
                }
            },
            Err(_) => AppPolicy::default(),
        };
        apps.insert(app.to_string(), policy);
    }

    fn persist(&self, app: &str, policy: &AppPolicy) {
        let path = self.policy_path(app);
        if let Err(e) = save_json(&path, policy) {
            tracing::warn!(app, path = %path.display(), error = %e, "policy save failed");
        }
    }

    /// Merge a client registry document into the app's policy tree.
    ///
    /// Identities flow client → server; mute decisions flow the other way.
    /// Idempotent: applying the same document twice changes nothing.
    pub fn sync_config(&self, app: &str, client: &RegistryDoc) {
        let mut apps = self.apps.lock();
        self.ensure_loaded(&mut apps, app);
        let Some(policy) = apps.get_mut(app) else {
            return;
        };
        policy.config.app_name = app.to_string();

        for (fid, c_func) in &client.functions {
            match policy.config.functions.get_mut(fid) {
                Some(s_func) => {
                    // A server-side mute survives the agent's optimistic
                    // `enabled = true`.
                    if s_func.muted_by.is_none() {
                        s_func.enabled = c_func.enabled;
                    } else {
                        s_func.enabled = false;
                    }
                    for (tid, c_tpl) in &c_func.templates {
                        match s_func.templates.get_mut(tid) {
                            Some(s_tpl) => {
                                if s_tpl.muted_by.is_none() {
                                    s_tpl.enabled = c_tpl.enabled;
                                } else {
                                    s_tpl.enabled = false;
                                }
                            }
                            None => {
                                let mut tpl = c_tpl.clone();
                                tpl.muted_by = None;
                                s_func.templates.insert(*tid, tpl);
                            }
                        }
                    }
                }
                None => {
                    let mut func = c_func.clone();
                    func.muted_by = None;
                    for tpl in func.templates.values_mut() {
                        tpl.muted_by = None;
                    }
                    policy.config.functions.insert(*fid, func);
                }
            }
        }

        policy.updated_at = Utc::now();
        let snapshot = policy.clone();
        drop(apps);
        self.persist(app, &snapshot);
    }

    /// Flip one entry's `enabled`, tracking provenance.
    ///
    /// Disabling tags the entry with `source`; at function level the mute
    /// cascades to all templates with the same tag. Enabling clears the tag
    /// and the matching block-stat entries so the dashboard reflects reality.
    pub fn update_control(
        &self,
        app: &str,
        fid: FuncId,
        tid: Option<TplId>,
        enable: bool,
        source: MutedBy,
    ) {
        let mut apps = self.apps.lock();
        self.ensure_loaded(&mut apps, app);
        let Some(policy) = apps.get_mut(app) else {
            return;
        };
        let Some(func) = policy.config.functions.get_mut(&fid) else {
            return;
        };

        match tid {
            Some(tid) => {
                let Some(tpl) = func.templates.get_mut(&tid) else {
                    return;
                };
                tpl.enabled = enable;
                tpl.muted_by = (!enable).then_some(source);
                if enable {
                    policy.blocked_stats.remove(&block_key(fid, Some(tid)));
                }
            }
            None => {
                func.enabled = enable;
                func.muted_by = (!enable).then_some(source);
                if enable {
                    policy.blocked_stats.remove(&block_key(fid, None));
                } else {
                    for tpl in func.templates.values_mut() {
                        tpl.enabled = false;
                        tpl.muted_by = Some(source);
                    }
                }
            }
        }

        policy.updated_at = Utc::now();
        let snapshot = policy.clone();
        drop(apps);
        self.persist(app, &snapshot);
    }

    /// Accumulate block-count deltas reported by an agent.
    pub fn update_stats(&self, app: &str, deltas: &HashMap<String, u64>) {
        if deltas.is_empty() {
            return;
        }
        let mut apps = self.apps.lock();
        self.ensure_loaded(&mut apps, app);
        let Some(policy) = apps.get_mut(app) else {
            return;
        };
        for (key, delta) in deltas {
            let counter = policy.blocked_stats.entry(key.clone()).or_insert(0);
            *counter = counter.saturating_add(*delta);
        }

        policy.updated_at = Utc::now();
        let snapshot = policy.clone();
        drop(apps);
        self.persist(app, &snapshot);
    }

    /// The authoritative config returned on handshakes and heartbeats.
    pub fn get_app_config(&self, app: &str) -> RegistryDoc {
        let mut apps = self.apps.lock();
        self.ensure_loaded(&mut apps, app);
        apps.get(app).map(|p| p.config.clone()).unwrap_or_default()
    }

    /// Current block statistics, for the dashboard surface.
    pub fn blocked_stats(&self, app: &str) -> BTreeMap<String, u64> {
        let mut apps = self.apps.lock();
        self.ensure_loaded(&mut apps, app);
        apps.get(app)
            .map(|p| p.blocked_stats.clone())
            .unwrap_or_default()
    }

    /// Append one line to the app's raw log file. Writes for a given app
    /// are sequenced by the storage lock.
    pub fn write_log(&self, app: &str, msg: &str) {
        let _guard = self.apps.lock();
        let path = self.log_path(app);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| writeln!(file, "{msg}"));
        if let Err(e) = result {
            tracing::warn!(app, error = %e, "raw log write failed");
        }
    }
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(value).map_err(std::io::Error::other)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
