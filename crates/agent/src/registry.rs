// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unified registry: function and template identities plus their mute state.
//!
//! IDs are assigned in first-seen order under the write guard; repeated
//! lookups hit the reverse maps through the read guard. Block counters live
//! under their own small lock and tolerate lost updates — the dashboard
//! needs approximate visibility, not exact accounting.

use parking_lot::{Mutex, RwLock};
use sq_core::{block_key, FuncId, FunctionEntry, RegistryDoc, TemplateEntry, TplId};
use std::collections::HashMap;
use std::path::Path;

struct Inner {
    doc: RegistryDoc,
    func_name_to_id: HashMap<String, FuncId>,
    tpl_content_to_id: HashMap<(FuncId, String), TplId>,
    next_func_id: FuncId,
    next_tpl_id: TplId,
}

impl Inner {
    fn empty(app_name: String) -> Self {
        Self {
            doc: RegistryDoc::new(app_name),
            func_name_to_id: HashMap::new(),
            tpl_content_to_id: HashMap::new(),
            next_func_id: FuncId(1),
            next_tpl_id: TplId(1),
        }
    }

    /// Rebuild reverse maps and next-ID counters from `doc`.
    fn index(&mut self) {
        self.func_name_to_id.clear();
        self.tpl_content_to_id.clear();
        for (fid, func) in &self.doc.functions {
            self.func_name_to_id.insert(func.name.clone(), *fid);
            for (tid, tpl) in &func.templates {
                self.tpl_content_to_id
                    .insert((*fid, tpl.content.clone()), *tid);
            }
        }
        let (max_fid, max_tid) = self.doc.max_ids();
        self.next_func_id = max_fid.next();
        self.next_tpl_id = max_tid.next();
    }
}

/// Per-application identity and policy registry, agent side.
pub struct Registry {
    inner: RwLock<Inner>,
    stats: Mutex<HashMap<String, u64>>,
}

impl Registry {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(Inner::empty(app_name.into())),
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Load from disk, tolerantly: a missing or unreadable file yields an
    /// empty registry.
    pub fn load(app_name: impl Into<String>, path: &Path) -> Self {
        let app_name = app_name.into();
        let registry = Self::new(app_name.clone());
        if let Ok(raw) = std::fs::read_to_string(path) {
            match serde_json::from_str::<RegistryDoc>(&raw) {
                Ok(mut doc) => {
                    doc.app_name = app_name;
                    let mut inner = registry.inner.write();
                    inner.doc = doc;
                    inner.index();
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt registry file");
                }
            }
        }
        registry
    }

    /// Persist as pretty JSON, atomically (tmp + rename).
    pub fn save(&self, path: &Path) {
        let doc = self.inner.read().doc.clone();
        if let Err(e) = save_doc(&doc, path) {
            tracing::warn!(path = %path.display(), error = %e, "registry save failed");
        }
    }

    /// Assign or look up the ID for a function name.
    pub fn get_func_id(&self, name: &str) -> FuncId {
        if let Some(id) = self.inner.read().func_name_to_id.get(name) {
            return *id;
        }
        let mut inner = self.inner.write();
        if let Some(id) = inner.func_name_to_id.get(name) {
            return *id;
        }
        let id = inner.next_func_id;
        inner.next_func_id = id.next();
        inner
            .doc
            .functions
            .insert(id, FunctionEntry::new(name.to_string()));
        inner.func_name_to_id.insert(name.to_string(), id);
        id
    }

    /// Assign or look up the ID for a template under `func_id`.
    ///
    /// Returns [`TplId::INVALID`] when `func_id` is not registered — a
    /// template cannot be attached to an unknown function.
    pub fn get_tpl_id(&self, func_id: FuncId, content: &str) -> TplId {
        {
            let inner = self.inner.read();
            if let Some(id) = inner.tpl_content_to_id.get(&(func_id, content.to_string())) {
                return *id;
            }
        }
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if let Some(id) = inner.tpl_content_to_id.get(&(func_id, content.to_string())) {
            return *id;
        }
        let id = inner.next_tpl_id;
        match inner.doc.functions.get_mut(&func_id) {
            Some(func) => {
                inner.next_tpl_id = id.next();
                func.templates
                    .insert(id, TemplateEntry::new(content.to_string()));
                inner
                    .tpl_content_to_id
                    .insert((func_id, content.to_string()), id);
                id
            }
            None => TplId::INVALID,
        }
    }

    /// Two map lookups: function level first, then template level. A `false`
    /// result counts a block against the corresponding key.
    pub fn is_enabled(&self, func_id: FuncId, tpl_id: Option<TplId>) -> bool {
        let inner = self.inner.read();
        let func = inner.doc.functions.get(&func_id);

        if let Some(func) = func {
            if !func.enabled {
                drop(inner);
                self.record_block(func_id, None);
                return false;
            }
            if let Some(tid) = tpl_id {
                if let Some(tpl) = func.templates.get(&tid) {
                    if !tpl.enabled {
                        drop(inner);
                        self.record_block(func_id, Some(tid));
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Count one suppressed emission.
    pub fn record_block(&self, func_id: FuncId, tpl_id: Option<TplId>) {
        let key = block_key(func_id, tpl_id);
        *self.stats.lock().entry(key).or_insert(0) += 1;
    }

    /// Drain the block counters for a handshake or heartbeat body.
    pub fn get_and_clear_stats(&self) -> HashMap<String, u64> {
        std::mem::take(&mut *self.stats.lock())
    }

    /// Clone of the current document, for handshakes and persistence.
    pub fn snapshot(&self) -> RegistryDoc {
        self.inner.read().doc.clone()
    }

    /// Merge an authoritative server document.
    ///
    /// For IDs both sides know, the server's `enabled` flag wins; flipping an
    /// entry back to enabled clears its block counter so the dashboard
    /// reflects reality. IDs only the server knows (e.g. from another agent
    /// instance) are inserted wholesale, reverse maps included.
    pub fn sync_from_server(&self, server: &RegistryDoc) {
        let mut inner = self.inner.write();
        let mut cleared: Vec<String> = Vec::new();

        for (fid, s_func) in &server.functions {
            match inner.doc.functions.get_mut(fid) {
                Some(l_func) => {
                    l_func.enabled = s_func.enabled;
                    l_func.muted_by = s_func.muted_by;
                    if s_func.enabled {
                        cleared.push(block_key(*fid, None));
                    }
                    for (tid, s_tpl) in &s_func.templates {
                        match l_func.templates.get_mut(tid) {
                            Some(l_tpl) => {
                                l_tpl.enabled = s_tpl.enabled;
                                l_tpl.muted_by = s_tpl.muted_by;
                                if s_tpl.enabled {
                                    cleared.push(block_key(*fid, Some(*tid)));
                                }
                            }
                            None => {
                                l_func.templates.insert(*tid, s_tpl.clone());
                            }
                        }
                    }
                }
                None => {
                    inner.doc.functions.insert(*fid, s_func.clone());
                }
            }
        }

        // Registering server-side identities must also refresh the reverse
        // maps and keep future assignments above every known ID.
        inner.index();

        drop(inner);
        if !cleared.is_empty() {
            let mut stats = self.stats.lock();
            for key in cleared {
                stats.remove(&key);
            }
        }
    }
}

fn save_doc(doc: &RegistryDoc, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(doc).map_err(std::io::Error::other)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
