// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process mock gateway server for end-to-end transport tests.
//!
//! The reference harness spawns the real binary and drives it over its own
//! transports; this crate has no server half to spawn, so the harness
//! instead runs a small scripted axum WebSocket endpoint in-process and
//! points the client at it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Once};
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider rustls needs. Safe to call more than
/// once; only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// What the mock gateway sends once it accepts a `ClientHello`.
#[derive(Clone, Default)]
pub struct AcceptScript {
    pub server_id: String,
    pub services: Vec<(String, u32)>,
    /// `(topic, params)` pushed in order immediately after `ServerHello`.
    pub events: Vec<(String, Value)>,
    /// Canned `result` payloads keyed by RPC method name; any method not
    /// listed gets `null`, which is enough to unblock a caller awaiting a
    /// response without asserting on its content.
    pub responses: HashMap<String, Value>,
    /// Close the socket right after the scripted events instead of
    /// entering the request/response loop — simulates a server-initiated
    /// disconnect.
    pub close_after_events: bool,
}

/// What the mock gateway does for one connection.
#[derive(Clone)]
pub enum ConnectionScript {
    Accept(AcceptScript),
    Reject { code: String, reason: String },
    /// Closes the socket before reading anything, including `ClientHello`.
    DropImmediately,
}

#[derive(Clone)]
struct Shared {
    connect_attempts: Arc<Mutex<Vec<Instant>>>,
    scripts: Arc<Mutex<std::collections::VecDeque<ConnectionScript>>>,
    default_script: Arc<ConnectionScript>,
}

/// A mock gateway bound to a random localhost port, torn down on drop.
pub struct MockGateway {
    addr: SocketAddr,
    shared: Shared,
    server: JoinHandle<()>,
}

impl MockGateway {
    /// `scripts` gives the behavior for connections in arrival order; once
    /// exhausted, every later connection repeats `default`.
    pub async fn start(scripts: Vec<ConnectionScript>, default: ConnectionScript) -> Self {
        ensure_crypto();
        let shared = Shared {
            connect_attempts: Arc::new(Mutex::new(Vec::new())),
            scripts: Arc::new(Mutex::new(scripts.into())),
            default_script: Arc::new(default),
        };
        let app = Router::new().route("/gateway", get(upgrade)).with_state(shared.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock gateway listener");
        let addr = listener.local_addr().expect("mock gateway local addr");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self { addr, shared, server }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/gateway", self.addr)
    }

    /// Timestamps of every connection this gateway has accepted so far.
    pub fn connect_attempts(&self) -> Vec<Instant> {
        self.shared.connect_attempts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn upgrade(ws: WebSocketUpgrade, State(shared): State<Shared>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_connection(socket, shared))
}

async fn run_connection(mut socket: WebSocket, shared: Shared) {
    shared.connect_attempts.lock().unwrap_or_else(|e| e.into_inner()).push(Instant::now());

    let script = {
        let mut queue = shared.scripts.lock().unwrap_or_else(|e| e.into_inner());
        queue.pop_front().unwrap_or_else(|| (*shared.default_script).clone())
    };

    match script {
        ConnectionScript::DropImmediately => {
            let _ = socket.close().await;
        }
        ConnectionScript::Reject { code, reason } => {
            if socket.recv().await.is_none() {
                return;
            }
            let frame = json!({"type": "reject", "code": code, "reason": reason});
            let _ = socket.send(Message::Text(frame.to_string().into())).await;
            let _ = socket.close().await;
        }
        ConnectionScript::Accept(script) => {
            if socket.recv().await.is_none() {
                return;
            }
            let services: Vec<Value> = script
                .services
                .iter()
                .map(|(service, version)| json!({"service": service, "version": version}))
                .collect();
            let hello = json!({
                "type": "hello",
                "server_id": script.server_id,
                "protocol_version": 1,
                "services": services,
            });
            if socket.send(Message::Text(hello.to_string().into())).await.is_err() {
                return;
            }
            for (topic, params) in &script.events {
                let event = json!({"topic": topic, "params": params});
                if socket.send(Message::Text(event.to_string().into())).await.is_err() {
                    return;
                }
            }
            if script.close_after_events {
                let _ = socket.close().await;
                return;
            }
            while let Some(Ok(Message::Text(text))) = socket.recv().await {
                let Ok(request) = serde_json::from_str::<Value>(&text) else { continue };
                let Some(method) = request.get("method").and_then(Value::as_str) else { continue };
                let id = request.get("id").cloned().unwrap_or(Value::Null);
                let result = script.responses.get(method).cloned().unwrap_or(Value::Null);
                let response = json!({"id": id, "result": result});
                if socket.send(Message::Text(response.to_string().into())).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Bind a TCP listener and immediately drop it, returning a port nothing is
/// listening on — used to force real connection failures for backoff tests.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind throwaway listener");
    listener.local_addr().expect("throwaway local addr").port()
}
