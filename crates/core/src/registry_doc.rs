// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The registry document shared by agent persistence, handshake bodies, and
//! the manager's per-app policy tree.
//!
//! The agent authors identities (names, template contents); the manager
//! authors policy (`enabled` flags and their provenance). Merge rules keep
//! the two from clobbering each other.

use crate::ids::{FuncId, TplId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provenance of a mute decision. `Manual` mutes are sticky; `Balancer`
/// mutes may be reverted automatically when traffic normalizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutedBy {
    Manual,
    Balancer,
}

impl std::fmt::Display for MutedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutedBy::Manual => write!(f, "manual"),
            MutedBy::Balancer => write!(f, "balancer"),
        }
    }
}

/// One log template owned by a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateEntry {
    /// The printf-style template string. Immutable once assigned an ID.
    pub content: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted_by: Option<MutedBy>,
}

impl TemplateEntry {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            enabled: true,
            muted_by: None,
        }
    }
}

/// One traced function and its templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionEntry {
    /// Qualified name + source location. Immutable once assigned an ID.
    pub name: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted_by: Option<MutedBy>,
    #[serde(default)]
    pub templates: BTreeMap<TplId, TemplateEntry>,
}

impl FunctionEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            muted_by: None,
            templates: BTreeMap::new(),
        }
    }
}

/// The per-application registry document.
///
/// BTreeMaps keep the JSON stable across saves, which the manager relies on
/// when diffing persisted policy trees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryDoc {
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub functions: BTreeMap<FuncId, FunctionEntry>,
}

impl RegistryDoc {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            functions: BTreeMap::new(),
        }
    }

    /// Highest assigned IDs, for restoring `next_*` counters after a load.
    pub fn max_ids(&self) -> (FuncId, TplId) {
        let max_fid = self.functions.keys().max().copied().unwrap_or_default();
        let max_tid = self
            .functions
            .values()
            .flat_map(|f| f.templates.keys())
            .max()
            .copied()
            .unwrap_or_default();
        (max_fid, max_tid)
    }

    pub fn function(&self, fid: FuncId) -> Option<&FunctionEntry> {
        self.functions.get(&fid)
    }

    pub fn template(&self, fid: FuncId, tid: TplId) -> Option<&TemplateEntry> {
        self.functions.get(&fid)?.templates.get(&tid)
    }
}

#[cfg(test)]
#[path = "registry_doc_tests.rs"]
mod tests;
