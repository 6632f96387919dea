// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integer identities for functions and log templates.
//!
//! Both IDs are assigned in first-seen order within a process, starting at 1,
//! and are never reused within a run. The zero value is reserved.

use serde::{Deserialize, Serialize};

/// Identity of a traced function (qualified name + source location).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct FuncId(pub u64);

impl FuncId {
    /// Reserved "no current function" value (global / outside any trace).
    pub const GLOBAL: FuncId = FuncId(0);

    pub fn next(self) -> FuncId {
        FuncId(self.0 + 1)
    }

    pub fn is_global(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for FuncId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for FuncId {
    fn from(v: u64) -> Self {
        FuncId(v)
    }
}

/// Identity of a log message template. Uniqueness is global, not scoped to
/// the owning function, mirroring assignment order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct TplId(pub u64);

impl TplId {
    /// Returned when a template cannot be attached to an unknown function.
    pub const INVALID: TplId = TplId(0);

    pub fn next(self) -> TplId {
        TplId(self.0 + 1)
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for TplId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TplId {
    fn from(v: u64) -> Self {
        TplId(v)
    }
}

/// Key into the block-statistics map: `"<fid>"` for a function-level block,
/// `"<fid>:<tid>"` for a template-level block.
pub fn block_key(func_id: FuncId, tpl_id: Option<TplId>) -> String {
    match tpl_id {
        Some(tid) => format!("{}:{}", func_id, tid),
        None => func_id.to_string(),
    }
}

#[cfg(test)]
#[path = "ids_tests.rs"]
mod tests;
