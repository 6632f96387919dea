// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sq-agent: the in-process side of Squelch.
//!
//! A host application creates one [`Agent`] at startup and hands out
//! [`Tracer`] and [`Logger`] values to its instrumentation layer. Traced
//! invocations flow through the sink worker to the console, a local file, or
//! the manager, and mute decisions flow back on heartbeats.
//!
//! Failure of anything in this crate must never affect the host program:
//! internal errors are contained at the nearest worker boundary and reported
//! through `tracing`, never through Squelch itself.

mod agent;
pub mod config;
pub mod context;
pub mod interceptor;
pub mod logger;
pub mod policy;
pub mod registry;
pub mod sink;
pub mod transport;

pub use agent::Agent;
pub use config::{AgentConfig, SinkMode};
pub use context::TraceScope;
pub use interceptor::{TraceSite, Tracer};
pub use logger::Logger;
pub use policy::PolicyController;
pub use registry::Registry;
pub use sq_protocol::PayloadKind;
