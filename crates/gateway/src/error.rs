// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across the transport, RPC, and coordinator layers.
//!
//! Mirrors the reference's `ErrorCode`/`MuxError` enums (hand-rolled
//! `Display`, a machine-readable `as_str()` code) but, unlike those
//! HTTP-status-only enums, several variants here carry real payloads.

use std::fmt;

use serde_json::Value;

/// Errors surfaced by the transport, RPC client, and session coordinator.
#[derive(Debug, Clone)]
pub enum GatewayError {
    /// A call was attempted outside the `connected` state.
    NotConnected,
    /// The channel closed with this call still pending.
    ConnectionClosed,
    /// The server did not send `ServerHello`/`HelloReject` in time.
    HandshakeTimeout,
    /// The server refused the handshake.
    HelloRejected { code: String, reason: String },
    /// A frame failed to parse, or was missing a required field.
    ProtocolMalformed(String),
    /// The server returned an RPC-level error for a `call()`.
    RpcError { code: i64, message: String, data: Option<Value> },
    /// Outbound JSON encoding failed.
    SerializationFailure(String),
    /// The configured URL did not use `ws://`/`wss://`.
    InvalidUrl(String),
}

/// Reserved RPC error code meaning "method not found": treated as a
/// soft-absent capability rather than a hard failure.
pub const RPC_METHOD_NOT_FOUND: i64 = -32601;

impl GatewayError {
    /// Machine-readable error code, stable across the crate's lifetime.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotConnected => "NOT_CONNECTED",
            Self::ConnectionClosed => "CONNECTION_CLOSED",
            Self::HandshakeTimeout => "HANDSHAKE_TIMEOUT",
            Self::HelloRejected { .. } => "HELLO_REJECTED",
            Self::ProtocolMalformed(_) => "PROTOCOL_MALFORMED",
            Self::RpcError { .. } => "RPC_ERROR",
            Self::SerializationFailure(_) => "SERIALIZATION_FAILURE",
            Self::InvalidUrl(_) => "INVALID_URL",
        }
    }

    /// Whether this RPC error is really just an absent optional capability
    /// (e.g. tmux support) rather than a genuine failure.
    pub fn is_method_not_found(&self) -> bool {
        matches!(self, Self::RpcError { code, .. } if *code == RPC_METHOD_NOT_FOUND)
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::HandshakeTimeout => write!(f, "handshake timed out"),
            Self::HelloRejected { code, reason } => {
                write!(f, "handshake rejected: {code}: {reason}")
            }
            Self::ProtocolMalformed(detail) => write!(f, "malformed frame: {detail}"),
            Self::RpcError { code, message, .. } => write!(f, "rpc error {code}: {message}"),
            Self::SerializationFailure(detail) => write!(f, "serialization failed: {detail}"),
            Self::InvalidUrl(detail) => write!(f, "invalid gateway url: {detail}"),
        }
    }
}

impl std::error::Error for GatewayError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
