// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-facing log statements with printf-style templates.
//!
//! Every call assigns the template an ID first (identity must sync even for
//! muted logs), then runs the policy check, then either appends to the
//! active compress buffer or renders a normal line.

use crate::agent::Shared;
use crate::config::SinkMode;
use crate::context;
use serde_json::Value;
use sq_core::{Level, TplId};
use sq_protocol::PayloadKind;
use std::sync::Arc;

/// A named logging handle. Cheap to clone; host code typically keeps one per
/// module or class.
#[derive(Clone)]
pub struct Logger {
    name: String,
    shared: Arc<Shared>,
}

impl Logger {
    pub(crate) fn new(name: impl Into<String>, shared: Arc<Shared>) -> Logger {
        Logger {
            name: name.into(),
            shared,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn debug(&self, template: &str, values: Vec<Value>) {
        self.log(Level::Debug, template, values);
    }

    pub fn info(&self, template: &str, values: Vec<Value>) {
        self.log(Level::Info, template, values);
    }

    pub fn warning(&self, template: &str, values: Vec<Value>) {
        self.log(Level::Warning, template, values);
    }

    pub fn error(&self, template: &str, values: Vec<Value>) {
        self.log(Level::Error, template, values);
    }

    pub fn log(&self, level: Level, template: &str, values: Vec<Value>) {
        // Re-entrancy guard: anything the emit path itself triggers on this
        // thread must not loop back through the instrumented pipeline.
        if context::in_agent() {
            return;
        }
        let _internal = context::InternalGuard::enter();

        let func_id = context::current_func_id();
        let tpl_id = if func_id.is_global() {
            TplId::INVALID
        } else {
            self.shared.registry.get_tpl_id(func_id, template)
        };

        // Template-level policy applies only inside a traced call.
        if !func_id.is_global() {
            let tpl = tpl_id.is_valid().then_some(tpl_id);
            if self.shared.policy.should_mute(func_id, tpl) {
                return;
            }
        }

        match self.shared.config.payload() {
            PayloadKind::Compress => {
                if !context::push_entry(level, tpl_id, values.clone()) {
                    // No active buffer: the call happened outside any traced
                    // scope, so fall back to an immediate plain line.
                    let marked = format!("{template} (outside trace scope)");
                    self.emit_normal(level, &marked, &values, func_id, tpl_id);
                }
            }
            PayloadKind::Normal => self.emit_normal(level, template, &values, func_id, tpl_id),
        }
    }

    fn emit_normal(
        &self,
        level: Level,
        template: &str,
        values: &[Value],
        func_id: sq_core::FuncId,
        tpl_id: TplId,
    ) {
        let content = render_template(template, values);
        let ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f").to_string();

        let payload = if self.shared.config.mode() == SinkMode::Remote {
            // Wire form carries the IDs so the manager can feed its analyzer.
            serde_json::json!({
                "ts": ts,
                "lvl": level,
                "name": self.name,
                "msg": content,
                "fid": func_id,
                "tid": tpl_id,
            })
            .to_string()
        } else {
            format!("{} [{}] {}: {}", ts, self.name, level, content)
        };

        self.shared.sink.push(payload, PayloadKind::Normal);
    }
}

/// Substitute `%s` placeholders positionally. Surplus values are appended
/// after a ` | ` separator; surplus placeholders are left as-is.
pub(crate) fn render_template(template: &str, values: &[Value]) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut rest = template;
    let mut idx = 0;

    while let Some(pos) = rest.find("%s") {
        out.push_str(&rest[..pos]);
        match values.get(idx) {
            Some(value) => {
                out.push_str(&value_display(value));
                idx += 1;
            }
            None => out.push_str("%s"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);

    if idx < values.len() {
        out.push_str(" | ");
        out.push_str(&serde_json::to_string(&values[idx..]).unwrap_or_default());
    }
    out
}

/// Strings interpolate bare; everything else renders as JSON.
fn value_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "logger_tests.rs"]
mod tests;
