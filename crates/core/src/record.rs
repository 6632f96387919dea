// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compressed trace records and their one-line wire encoding.
//!
//! Wire line: `<start:%.4f> <app_id> <func_id> <duration:%.2f> <entries_json> <values_json>`
//! — five top-level spaces. The two JSON fields may themselves contain
//! spaces, so the reader parses `entries_json` with a streaming decoder that
//! reports how many bytes it consumed.

use crate::ids::{FuncId, TplId};
use crate::level::Level;
use serde_json::Value;
use thiserror::Error;

/// One user log call captured inside a traced invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: Level,
    pub tpl_id: TplId,
    /// Positional arguments for the template, preserved as-is.
    pub values: Vec<Value>,
}

/// The per-invocation record accumulated by the trace interceptor.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    /// Seconds since epoch at call entry.
    pub start_time: f64,
    pub duration_ms: f64,
    pub func_id: FuncId,
    /// In program order; the flushed payload preserves this order.
    pub entries: Vec<LogEntry>,
}

/// Errors from encoding or parsing a compressed line.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("truncated record line")]
    Truncated,

    #[error("bad numeric field: {0}")]
    BadNumber(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TraceRecord {
    pub fn new(start_time: f64, duration_ms: f64, func_id: FuncId) -> Self {
        Self {
            start_time,
            duration_ms,
            func_id,
            entries: Vec::new(),
        }
    }

    /// Encode into the one-line wire form.
    pub fn encode_line(&self, app_id: &str) -> Result<String, RecordError> {
        let meta: Vec<(Level, TplId)> = self.entries.iter().map(|e| (e.level, e.tpl_id)).collect();
        let values: Vec<&Value> = self.entries.iter().flat_map(|e| e.values.iter()).collect();

        let entries_json = serde_json::to_string(&meta)?;
        let values_json = serde_json::to_string(&values)?;

        Ok(format!(
            "{:.4} {} {} {:.2} {} {}",
            self.start_time, app_id, self.func_id, self.duration_ms, entries_json, values_json
        ))
    }
}

/// A compressed line as decoded by the manager.
///
/// The wire form flattens per-entry values into one array, so `values` here
/// is that flat concatenation in program order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub start_time: f64,
    pub app_id: String,
    pub func_id: FuncId,
    pub duration_ms: f64,
    pub entries: Vec<(Level, TplId)>,
    pub values: Vec<Value>,
}

impl ParsedRecord {
    pub fn parse(line: &str) -> Result<ParsedRecord, RecordError> {
        let (start_s, rest) = line.split_once(' ').ok_or(RecordError::Truncated)?;
        let (app_id, rest) = rest.split_once(' ').ok_or(RecordError::Truncated)?;
        let (func_s, rest) = rest.split_once(' ').ok_or(RecordError::Truncated)?;
        let (dur_s, rest) = rest.split_once(' ').ok_or(RecordError::Truncated)?;

        let start_time: f64 = start_s
            .parse()
            .map_err(|_| RecordError::BadNumber(start_s.to_string()))?;
        let func_id: u64 = func_s
            .parse()
            .map_err(|_| RecordError::BadNumber(func_s.to_string()))?;
        let duration_ms: f64 = dur_s
            .parse()
            .map_err(|_| RecordError::BadNumber(dur_s.to_string()))?;

        // entries_json may contain spaces; take exactly one JSON value and
        // let the stream tell us where it ended.
        let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Vec<(Level, TplId)>>();
        let entries = match stream.next() {
            Some(result) => result?,
            None => return Err(RecordError::Truncated),
        };
        let consumed = stream.byte_offset();

        let values_str = rest
            .get(consumed..)
            .map(str::trim_start)
            .filter(|s| !s.is_empty())
            .ok_or(RecordError::Truncated)?;
        let values: Vec<Value> = serde_json::from_str(values_str)?;

        Ok(ParsedRecord {
            start_time,
            app_id: app_id.to_string(),
            func_id: FuncId(func_id),
            duration_ms,
            entries,
            values,
        })
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
