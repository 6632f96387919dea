// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-invocation trace context.
//!
//! Each executing thread owns a stack of trace frames; a frame carries the
//! current function ID and, in compress mode, the per-invocation log buffer.
//! Frames are pushed by [`TraceScope::enter`] and popped on drop, so the
//! stack discipline holds on every exit path, panics included. Nested traced
//! calls shadow correctly; concurrent threads never contend.

use sq_core::{FuncId, Level, LogEntry, TplId};
use std::cell::{Cell, RefCell};

struct Frame {
    func_id: FuncId,
    buffer: Option<Vec<LogEntry>>,
}

thread_local! {
    static STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
    static IN_AGENT: Cell<bool> = const { Cell::new(false) };
}

/// The function ID of the innermost active trace scope, or
/// [`FuncId::GLOBAL`] outside any traced call.
pub fn current_func_id() -> FuncId {
    STACK.with(|stack| {
        stack
            .borrow()
            .last()
            .map(|f| f.func_id)
            .unwrap_or(FuncId::GLOBAL)
    })
}

/// Append one entry to the innermost active log buffer. Returns `false`
/// when no buffer is active (normal mode, or outside any traced call).
pub fn push_entry(level: Level, tpl_id: TplId, values: Vec<serde_json::Value>) -> bool {
    STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        match stack.last_mut().and_then(|f| f.buffer.as_mut()) {
            Some(buffer) => {
                buffer.push(LogEntry {
                    level,
                    tpl_id,
                    values,
                });
                true
            }
            None => false,
        }
    })
}

/// RAII guard for one traced invocation.
pub struct TraceScope {
    // Depth at entry, for debug-time stack discipline checks.
    depth: usize,
}

impl TraceScope {
    /// Push a frame for `func_id`. The buffer is attached separately so the
    /// scope can be entered before the mute decision is made.
    pub fn enter(func_id: FuncId) -> TraceScope {
        STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(Frame {
                func_id,
                buffer: None,
            });
            TraceScope {
                depth: stack.len(),
            }
        })
    }

    /// Attach a fresh, empty log buffer to this scope's frame.
    pub fn attach_buffer(&mut self) {
        STACK.with(|stack| {
            if let Some(frame) = stack.borrow_mut().last_mut() {
                frame.buffer = Some(Vec::new());
            }
        });
    }

    /// Take the accumulated buffer out of this scope's frame, leaving no
    /// buffer active.
    pub fn take_buffer(&mut self) -> Vec<LogEntry> {
        STACK.with(|stack| {
            stack
                .borrow_mut()
                .last_mut()
                .and_then(|f| f.buffer.take())
                .unwrap_or_default()
        })
    }
}

impl Drop for TraceScope {
    fn drop(&mut self) {
        STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(stack.len(), self.depth, "trace scopes must drop LIFO");
            stack.pop();
        });
    }
}

/// RAII guard marking agent-internal execution on this thread, so internal
/// code can never feed its own output back through the instrumented path.
pub struct InternalGuard {
    was: bool,
}

impl InternalGuard {
    pub fn enter() -> InternalGuard {
        let was = IN_AGENT.with(|flag| flag.replace(true));
        InternalGuard { was }
    }
}

impl Drop for InternalGuard {
    fn drop(&mut self) {
        let was = self.was;
        IN_AGENT.with(|flag| flag.set(was));
    }
}

/// `true` while agent-internal code runs on this thread.
pub fn in_agent() -> bool {
    IN_AGENT.with(Cell::get)
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
