// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The trace interceptor: per-call bookkeeping around a wrapped function.
//!
//! The instrumentation layer (outside this crate) wraps user functions and
//! routes each invocation through [`Tracer::call`] or [`Tracer::try_call`].
//! The scope is entered unconditionally so template-level policy still
//! applies inside a function that is not itself muted; a function-level mute
//! exits early with a transparent call and no buffer allocation.

use crate::agent::Shared;
use crate::context::TraceScope;
use crate::logger::Logger;
use serde_json::Value;
use sq_core::{FuncId, TraceRecord};
use sq_protocol::PayloadKind;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// One wrapped call site. The function ID is resolved on the first call and
/// cached on the site, so the steady-state cost is one atomic load.
pub struct TraceSite {
    key: String,
    name: String,
    id: OnceLock<FuncId>,
}

impl TraceSite {
    /// `location` is the source path, `name` the qualified function name;
    /// together they form the registry key.
    pub fn new(location: &str, name: &str) -> TraceSite {
        TraceSite {
            key: format!("{location}:{name}"),
            name: name.to_string(),
            id: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, shared: &Shared) -> FuncId {
        *self.id.get_or_init(|| shared.registry.get_func_id(&self.key))
    }
}

/// Entry point for traced invocations.
#[derive(Clone)]
pub struct Tracer {
    shared: Arc<Shared>,
}

impl Tracer {
    pub(crate) fn new(shared: Arc<Shared>) -> Tracer {
        Tracer { shared }
    }

    /// Run `f` as a traced invocation of `site`.
    ///
    /// `args` is the caller's rendering of the invocation arguments, used
    /// for the normal-mode entry line.
    pub fn call<R: std::fmt::Debug>(
        &self,
        site: &TraceSite,
        args: &[Value],
        f: impl FnOnce() -> R,
    ) -> R {
        let func_id = site.resolve(&self.shared);
        let mut scope = TraceScope::enter(func_id);

        if self.shared.policy.should_mute(func_id, None) {
            return f();
        }

        match self.shared.config.payload() {
            PayloadKind::Normal => {
                let logger = self.site_logger(site);
                logger.info(
                    "Call %s | Args: %s",
                    vec![Value::from(site.name()), args_value(args)],
                );
                let t0 = std::time::Instant::now();
                let value = f();
                let duration_ms = t0.elapsed().as_secs_f64() * 1000.0;
                logger.info(
                    "Return %s | Value: %s | Duration: %sms",
                    vec![
                        Value::from(site.name()),
                        Value::from(format!("{value:?}")),
                        Value::from(format!("{duration_ms:.3}")),
                    ],
                );
                value
            }
            PayloadKind::Compress => self.run_compressed(func_id, &mut scope, f),
        }
    }

    /// Like [`Tracer::call`] for fallible functions. The error is recorded
    /// (error line in normal mode, timing flush in compress mode) and then
    /// propagated unchanged — never suppressed.
    pub fn try_call<T: std::fmt::Debug, E: std::fmt::Display>(
        &self,
        site: &TraceSite,
        args: &[Value],
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let func_id = site.resolve(&self.shared);
        let mut scope = TraceScope::enter(func_id);

        if self.shared.policy.should_mute(func_id, None) {
            return f();
        }

        match self.shared.config.payload() {
            PayloadKind::Normal => {
                let logger = self.site_logger(site);
                logger.info(
                    "Call %s | Args: %s",
                    vec![Value::from(site.name()), args_value(args)],
                );
                let t0 = std::time::Instant::now();
                let result = f();
                let duration_ms = t0.elapsed().as_secs_f64() * 1000.0;
                match &result {
                    Ok(value) => logger.info(
                        "Return %s | Value: %s | Duration: %sms",
                        vec![
                            Value::from(site.name()),
                            Value::from(format!("{value:?}")),
                            Value::from(format!("{duration_ms:.3}")),
                        ],
                    ),
                    Err(e) => logger.error(
                        "Error in %s: %s | Duration: %sms",
                        vec![
                            Value::from(site.name()),
                            Value::from(e.to_string()),
                            Value::from(format!("{duration_ms:.3}")),
                        ],
                    ),
                }
                result
            }
            // The flush happens on the exit path whether or not the
            // closure failed.
            PayloadKind::Compress => self.run_compressed(func_id, &mut scope, f),
        }
    }

    fn run_compressed<R>(
        &self,
        func_id: FuncId,
        scope: &mut TraceScope,
        f: impl FnOnce() -> R,
    ) -> R {
        let start_time = epoch_now();
        let t0 = std::time::Instant::now();
        scope.attach_buffer();

        let value = f();

        let duration_ms = t0.elapsed().as_secs_f64() * 1000.0;
        let entries = scope.take_buffer();
        if !entries.is_empty() {
            let record = TraceRecord {
                start_time,
                duration_ms,
                func_id,
                entries,
            };
            match record.encode_line(&self.shared.config.app_name()) {
                Ok(line) => {
                    self.shared.sink.push(line, PayloadKind::Compress);
                }
                Err(e) => tracing::warn!(error = %e, "compressed record encoding failed"),
            }
        }
        value
    }

    fn site_logger(&self, site: &TraceSite) -> Logger {
        Logger::new(site.name(), Arc::clone(&self.shared))
    }
}

fn args_value(args: &[Value]) -> Value {
    Value::from(serde_json::to_string(args).unwrap_or_default())
}

fn epoch_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
#[path = "interceptor_tests.rs"]
mod tests;
