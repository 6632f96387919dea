// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DTO structs for the packet bodies.

use serde::{Deserialize, Serialize};
use sq_core::RegistryDoc;
use std::collections::HashMap;

/// Payload shape selector carried in `LogData` and the agent config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    /// Rendered text (or its JSON wire form).
    Normal,
    /// IDs + values, one line per traced invocation.
    #[default]
    Compress,
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadKind::Normal => write!(f, "normal"),
            PayloadKind::Compress => write!(f, "compress"),
        }
    }
}

impl std::str::FromStr for PayloadKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(PayloadKind::Normal),
            "compress" => Ok(PayloadKind::Compress),
            _ => Err(()),
        }
    }
}

/// Agent → manager, first packet after connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    pub app_name: String,
    pub config: RegistryDoc,
    #[serde(default)]
    pub blocked_stats: HashMap<String, u64>,
}

/// Agent → manager, every 5 seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub timestamp: f64,
    pub app_name: String,
    #[serde(default)]
    pub blocked_stats: HashMap<String, u64>,
}

/// Manager → agent reply, framed as a Heartbeat packet. The agent
/// discriminates on the presence of `config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigReply {
    pub timestamp: f64,
    pub config: RegistryDoc,
}

/// One payload or a batch of payloads. The single-string form is treated as
/// a one-element batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogBatch {
    One(String),
    Many(Vec<String>),
}

impl LogBatch {
    pub fn items(&self) -> impl Iterator<Item = &str> {
        match self {
            LogBatch::One(s) => std::slice::from_ref(s).iter(),
            LogBatch::Many(v) => v.iter(),
        }
        .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        match self {
            LogBatch::One(_) => 1,
            LogBatch::Many(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Agent → manager log payload(s).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogData {
    pub log: LogBatch,
    #[serde(rename = "type", default)]
    pub kind: PayloadKind,
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
