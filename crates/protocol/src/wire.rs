// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire format encoding/decoding for the agent↔manager protocol.
//!
//! Wire format: `[version u8 | kind u8 | length u32 big-endian]` + JSON body.
//! The codec is stateless; callers provide the byte stream. Short reads are
//! completed by `read_exact`, and a clean close before a header is reported
//! as `ConnectionClosed`.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("body too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("unknown packet kind: {0}")]
    UnknownKind(u8),

    #[error("unsupported protocol version: {0}")]
    BadVersion(u8),

    #[error("connection closed")]
    ConnectionClosed,
}

/// Protocol version carried in every header.
pub const PROTO_VERSION: u8 = 1;

/// Header size: version (1) + kind (1) + length (4).
pub const HEADER_LEN: usize = 6;

/// Maximum body size (16 MiB). A handshake carries a whole registry
/// snapshot, which stays far below this in practice.
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Packet kinds shared by both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Handshake = 1,
    LogData = 2,
    Heartbeat = 3,
}

impl PacketKind {
    pub fn from_u8(v: u8) -> Result<PacketKind, ProtocolError> {
        match v {
            1 => Ok(PacketKind::Handshake),
            2 => Ok(PacketKind::LogData),
            3 => Ok(PacketKind::Heartbeat),
            other => Err(ProtocolError::UnknownKind(other)),
        }
    }
}

/// Encode a packet body to JSON bytes (without the header).
pub fn encode_body<T: Serialize>(body: &T) -> Result<Vec<u8>, ProtocolError> {
    let json = serde_json::to_vec(body)?;
    if json.len() > MAX_BODY_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: json.len(),
            max: MAX_BODY_SIZE,
        });
    }
    Ok(json)
}

/// Decode a packet body from JSON bytes.
pub fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read one framed packet from an async reader.
///
/// Returns the packet kind and raw body bytes; body JSON is left to the
/// caller so malformed bodies can be skipped without killing the session.
pub async fn read_packet<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<(PacketKind, Vec<u8>), ProtocolError> {
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed);
        }
        Err(e) => return Err(ProtocolError::Io(e)),
    }

    let version = header[0];
    if version != PROTO_VERSION {
        return Err(ProtocolError::BadVersion(version));
    }
    let kind = PacketKind::from_u8(header[1])?;
    let len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;

    if len > MAX_BODY_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_BODY_SIZE,
        });
    }

    let mut body = vec![0u8; len];
    match reader.read_exact(&mut body).await {
        Ok(_) => Ok((kind, body)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => Err(ProtocolError::Io(e)),
    }
}

/// Frame and write one packet to an async writer.
pub async fn write_packet<W: tokio::io::AsyncWriteExt + Unpin, T: Serialize>(
    writer: &mut W,
    kind: PacketKind,
    body: &T,
) -> Result<(), ProtocolError> {
    let json = encode_body(body)?;

    let mut header = [0u8; HEADER_LEN];
    header[0] = PROTO_VERSION;
    header[1] = kind as u8;
    header[2..6].copy_from_slice(&(json.len() as u32).to_be_bytes());

    writer.write_all(&header).await?;
    writer.write_all(&json).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
