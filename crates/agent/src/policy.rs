// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Policy enforcement point: should this log be emitted?

use crate::registry::Registry;
use sq_core::{FuncId, TplId};
use std::sync::Arc;

/// Thin wrapper over [`Registry::is_enabled`], cheap enough for every traced
/// call path: two hash lookups, no allocation unless a block is recorded.
#[derive(Clone)]
pub struct PolicyController {
    registry: Arc<Registry>,
}

impl PolicyController {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// `true` when the function (or the specific template) is muted.
    pub fn should_mute(&self, func_id: FuncId, tpl_id: Option<TplId>) -> bool {
        !self.registry.is_enabled(func_id, tpl_id)
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
