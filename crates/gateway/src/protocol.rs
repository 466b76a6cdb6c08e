// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol types: handshake frames, RPC envelopes, and server events,
//! plus the text/binary frame classifier.
//!
//! Text frames carry tagged JSON records; binary frames are opaque byte
//! sequences sent and received without framing. Matches the reference's
//! `ws_msg.rs` convention of one `#[serde(tag = "type")]` enum per
//! direction, generalized here into three: the handshake, the RPC
//! envelope, and the fire-and-forget event.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `ClientHello`, the first frame sent once the socket opens.
#[derive(Debug, Clone, Serialize)]
pub struct ClientHello {
    pub protocol: ProtocolVersions,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProtocolVersions {
    pub min: u32,
    pub max: u32,
}

/// A service advertised by the server in `ServerHello.services`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceVersion {
    pub service: String,
    pub version: u32,
}

/// `ServerHello`, accepting the handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerHello {
    pub server_id: String,
    pub protocol_version: u32,
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub services: Vec<ServiceVersion>,
}

/// `HelloReject`, refusing the handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct HelloReject {
    pub code: String,
    pub reason: String,
}

/// Frames the server may send in reply to `ClientHello`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandshakeReply {
    Hello(ServerHello),
    Reject(HelloReject),
}

/// `RpcRequest`, a correlated client-to-server call.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub id: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Server-originated RPC error payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorPayload {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// `RpcResponse`. The wire `id` may be a string or a number; it is coerced
/// to a string for registry lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    #[serde(deserialize_with = "deserialize_id_as_string")]
    pub id: String,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorPayload>,
}

/// Coerce a wire id that may be a JSON string or number into a `String`.
/// Shared with [`crate::chat::mapper`], whose `request_id` field is subject
/// to the same string-or-int ambiguity as this one.
pub(crate) fn deserialize_id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdWire {
        Str(String),
        Num(i64),
    }
    Ok(match IdWire::deserialize(deserializer)? {
        IdWire::Str(s) => s,
        IdWire::Num(n) => n.to_string(),
    })
}

/// `RpcEvent`, a fire-and-forget server push.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcEvent {
    pub topic: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// Any text frame the server may send once connected: either a response
/// correlated to a pending call, or an uncorrelated event.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Response(RpcResponse),
    Event(RpcEvent),
}

/// Classification of an inbound frame: text must parse as JSON or is
/// dropped; binary is opaque and passed through untouched.
#[derive(Debug)]
pub enum InboundFrame {
    Text(ServerFrame),
    Binary(bytes::Bytes),
    /// Parse failure or unrecognized text shape: logged and dropped, never
    /// kills the channel.
    Malformed(String),
    /// Ping/pong/close frames the transport handles itself.
    Control,
}

/// Classify a raw tungstenite message into an [`InboundFrame`].
pub fn classify_inbound(
    message: tokio_tungstenite::tungstenite::Message,
) -> InboundFrame {
    use tokio_tungstenite::tungstenite::Message as M;
    match message {
        M::Text(text) => match serde_json::from_str::<ServerFrame>(&text) {
            Ok(frame) => InboundFrame::Text(frame),
            Err(e) => InboundFrame::Malformed(e.to_string()),
        },
        M::Binary(bytes) => InboundFrame::Binary(bytes),
        M::Ping(_) | M::Pong(_) | M::Close(_) | M::Frame(_) => InboundFrame::Control,
    }
}

/// Serialize a value to an outbound text frame.
pub fn encode_text<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| e.to_string())
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
