//! Behavioral specifications for the Squelch control plane.
//!
//! These tests are end-to-end: a real manager listens on a loopback port
//! and a real agent connects to it. Assertions poll with deadlines because
//! the sink worker batches on a timer.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/compressed_roundtrip.rs"]
mod compressed_roundtrip;

#[path = "specs/local_fallback.rs"]
mod local_fallback;

#[path = "specs/mute_propagation.rs"]
mod mute_propagation;

#[path = "specs/block_stats.rs"]
mod block_stats;
