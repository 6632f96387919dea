// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sq-protocol: the framed agent↔manager wire protocol.
//!
//! Every packet is a 6-byte header (`version u8 | kind u8 | length u32 BE`)
//! followed by `length` bytes of UTF-8 JSON.

pub mod types;
pub mod wire;

pub use types::{ConfigReply, Handshake, Heartbeat, LogBatch, LogData, PayloadKind};
pub use wire::{
    decode_body, encode_body, read_packet, write_packet, PacketKind, ProtocolError, HEADER_LEN,
    MAX_BODY_SIZE, PROTO_VERSION,
};
