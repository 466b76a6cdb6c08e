// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connect/handshake/reconnect loop.
//!
//! Shaped after the reference's `upstream/feed.rs` (`spawn_event_feed`'s
//! reconnect-with-backoff loop) and `upstream/bridge.rs` (`run_loop`'s
//! stamp/correlate/dispatch shape), generalized from a one-way event feed
//! and a relaying bridge into a full duplex RPC channel with its own
//! handshake.

use std::sync::atomic::{AtomicU32, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::protocol::{
    classify_inbound, encode_text, ClientHello, HandshakeReply, InboundFrame, ProtocolVersions,
    ServerFrame,
};
use crate::transport::state::TransportState;
use crate::transport::Shared;

/// Drives one transport's lifetime: repeated connect attempts, each
/// producing a handshake and (if accepted) a connected session, until
/// `cancel` fires or the server rejects the handshake.
pub(crate) async fn run(shared: std::sync::Arc<Shared>, cancel: CancellationToken) {
    let retry = AtomicU32::new(0);

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let config = shared.config.lock().unwrap_or_else(|e| e.into_inner()).clone();
        shared.state.set(TransportState::Connecting);

        match tokio_tungstenite::connect_async(&config.url).await {
            Ok((stream, _)) => {
                retry.store(0, Ordering::Relaxed);
                if run_session(&shared, &config, stream, &cancel).await == SessionExit::Rejected {
                    return;
                }
            }
            Err(e) => {
                tracing::debug!(url = %config.url, err = %e, "gateway connect failed");
                shared.state.set(TransportState::Error { detail: e.to_string() });
            }
        }

        if cancel.is_cancelled() {
            return;
        }

        shared.pending.reject_all(GatewayError::ConnectionClosed);
        *shared.outbound.lock().unwrap_or_else(|e| e.into_inner()) = None;
        shared.state.set(TransportState::Disconnected);

        let delay = config.backoff_delay(retry.load(Ordering::Relaxed));
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        retry.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SessionExit {
    /// The server rejected the handshake; the caller must not reconnect.
    Rejected,
    /// The channel closed, timed out, or errored; the caller may reconnect.
    Recoverable,
}

/// Run the handshake and, if accepted, the connected read/write loop for a
/// single underlying socket. Returns once the socket is no longer usable.
async fn run_session(
    shared: &std::sync::Arc<Shared>,
    config: &GatewayConfig,
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    cancel: &CancellationToken,
) -> SessionExit {
    shared.state.set(TransportState::Handshaking);
    let (mut write, mut read) = stream.split();

    let hello = ClientHello {
        protocol: ProtocolVersions { min: config.protocol.min, max: config.protocol.max },
        client_id: config.client_id.clone(),
        auth_token: config.auth_token.clone(),
        capabilities: config.capabilities.clone(),
    };
    let Ok(hello_text) = encode_text(&hello) else {
        return SessionExit::Recoverable;
    };
    if write.send(WsMessage::Text(hello_text.into())).await.is_err() {
        return SessionExit::Recoverable;
    }

    let handshake = tokio::select! {
        _ = cancel.cancelled() => return SessionExit::Recoverable,
        result = tokio::time::timeout(config.handshake_timeout, next_handshake_reply(&mut read)) => result,
    };

    let reply = match handshake {
        Ok(Some(reply)) => reply,
        Ok(None) => return SessionExit::Recoverable, // channel closed mid-handshake
        Err(_) => {
            tracing::debug!("gateway handshake timed out");
            return SessionExit::Recoverable;
        }
    };

    match reply {
        HandshakeReply::Reject(reject) => {
            tracing::debug!(code = %reject.code, reason = %reject.reason, "gateway handshake rejected");
            shared.state.set(TransportState::Rejected { code: reject.code, reason: reject.reason });
            SessionExit::Rejected
        }
        HandshakeReply::Hello(hello) => {
            let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();
            *shared.outbound.lock().unwrap_or_else(|e| e.into_inner()) = Some(outbound_tx);
            shared.state.set(TransportState::Connected { server_hello: hello });

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return SessionExit::Recoverable,
                    outgoing = outbound_rx.recv() => {
                        match outgoing {
                            Some(msg) => {
                                if write.send(msg).await.is_err() {
                                    return SessionExit::Recoverable;
                                }
                            }
                            None => return SessionExit::Recoverable,
                        }
                    }
                    incoming = read.next() => {
                        match incoming {
                            Some(Ok(msg)) => handle_inbound(shared, msg),
                            Some(Err(e)) => {
                                tracing::debug!(err = %e, "gateway channel error");
                                shared.state.set(TransportState::Error { detail: e.to_string() });
                                return SessionExit::Recoverable;
                            }
                            None => return SessionExit::Recoverable,
                        }
                    }
                }
            }
        }
    }
}

/// Read frames until one parses as a `HandshakeReply`, or the channel
/// closes. Frames that fail to parse during the handshake window are
/// dropped, matching the general "malformed text is logged and dropped"
/// policy.
async fn next_handshake_reply<S>(
    read: &mut futures_util::stream::SplitStream<tokio_tungstenite::WebSocketStream<S>>,
) -> Option<HandshakeReply>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        match read.next().await {
            Some(Ok(WsMessage::Text(text))) => match serde_json::from_str(&text) {
                Ok(reply) => return Some(reply),
                Err(e) => tracing::debug!(err = %e, "malformed handshake frame, dropped"),
            },
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return None,
        }
    }
}

fn handle_inbound(shared: &std::sync::Arc<Shared>, msg: WsMessage) {
    match classify_inbound(msg) {
        InboundFrame::Text(ServerFrame::Response(resp)) => match resp.error {
            Some(err) => shared.pending.reject_rpc(&resp.id, err),
            None => shared.pending.resolve(&resp.id, resp.result.unwrap_or(serde_json::Value::Null)),
        },
        InboundFrame::Text(ServerFrame::Event(event)) => {
            let _ = shared.events_tx.send(event);
        }
        InboundFrame::Binary(data) => shared.deliver_binary(data),
        InboundFrame::Malformed(detail) => {
            tracing::debug!(detail = %detail, "malformed frame, dropped");
        }
        InboundFrame::Control => {}
    }
}

#[cfg(test)]
#[path = "socket_tests.rs"]
mod tests;
