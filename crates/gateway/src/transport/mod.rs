// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Public transport facade: owns the single channel, the handshake, the
//! request registry, and the binary backlog, and exposes `call`,
//! `send_binary`, and the three subscription kinds.
//!
//! Thin façade over the connect/session loop in [`socket`], the way the
//! reference's `upstream/client.rs` sits over the `feed`/`bridge` pair.

pub mod backlog;
pub mod registry;
pub mod socket;
pub mod state;

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::protocol::{encode_text, RpcEvent, RpcRequest};
use backlog::BinaryBacklog;
use registry::{CounterIdGenerator, IdGenerator, PendingRequests};
use state::{StateBroadcaster, TransportState};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Where inbound binary frames go: buffered until a subscriber attaches,
/// then delivered directly and in order.
enum BinarySink {
    Backlog(BinaryBacklog),
    Attached(mpsc::UnboundedSender<Bytes>),
}

/// State shared between the public [`Transport`] handle and the background
/// connect/session task.
pub(crate) struct Shared {
    config: Mutex<GatewayConfig>,
    state: StateBroadcaster,
    pending: PendingRequests,
    events_tx: broadcast::Sender<RpcEvent>,
    binary: Mutex<BinarySink>,
    binary_cap: Mutex<usize>,
    outbound: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    id_gen: Box<dyn IdGenerator>,
}

impl Shared {
    fn deliver_binary(&self, data: Bytes) {
        let mut sink = self.binary.lock().unwrap_or_else(|e| e.into_inner());
        match &mut *sink {
            BinarySink::Attached(tx) => {
                let _ = tx.send(data);
            }
            BinarySink::Backlog(backlog) => backlog.push(data),
        }
    }
}

/// A handle to one gateway connection, bound to a single URL for its
/// lifetime. Changing the URL rebuilds the underlying connection.
pub struct Transport {
    shared: Arc<Shared>,
    run_cancel: Mutex<Option<CancellationToken>>,
}

/// Unsubscribe handle returned by the `on_*` subscription methods. Dropping
/// it (or calling [`Unsubscribe::cancel`]) stops delivery to that listener.
pub struct Unsubscribe {
    drop_fn: Option<Box<dyn FnOnce() + Send>>,
}

impl Unsubscribe {
    fn new(drop_fn: impl FnOnce() + Send + 'static) -> Self {
        Self { drop_fn: Some(Box::new(drop_fn)) }
    }

    pub fn cancel(mut self) {
        if let Some(f) = self.drop_fn.take() {
            f();
        }
    }
}

impl Transport {
    pub fn new(config: GatewayConfig) -> Self {
        let max_backlog = config.max_binary_backlog_bytes;
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            config: Mutex::new(config),
            state: StateBroadcaster::new(),
            pending: PendingRequests::new(),
            events_tx,
            binary: Mutex::new(BinarySink::Backlog(BinaryBacklog::new(max_backlog))),
            binary_cap: Mutex::new(max_backlog),
            outbound: Mutex::new(None),
            id_gen: Box::new(CounterIdGenerator::default()),
        });
        Self { shared, run_cancel: Mutex::new(None) }
    }

    /// Begin connecting, if not already running. A no-op if `start()` has
    /// already been called and not followed by `stop()`.
    pub fn start(&self) {
        let mut guard = self.run_cancel.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        *guard = Some(cancel.clone());
        let shared = Arc::clone(&self.shared);
        tokio::spawn(socket::run(shared, cancel));
    }

    /// Stop synchronously from the caller's perspective: cancels the
    /// background task, rejects every pending call, and transitions to
    /// `disconnected`. No further events are delivered after this returns.
    pub fn stop(&self) {
        if let Some(cancel) = self.run_cancel.lock().unwrap_or_else(|e| e.into_inner()).take() {
            cancel.cancel();
        }
        *self.shared.outbound.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.shared.pending.reject_all(GatewayError::ConnectionClosed);
        self.shared.state.set(TransportState::Disconnected);
    }

    /// Point this transport at a different URL/token pair. A no-op if the
    /// pair is unchanged; otherwise stops the current connection (if any)
    /// and starts a new one against the new config.
    pub fn set_connection(&self, config: GatewayConfig) {
        let unchanged = {
            let current = self.shared.config.lock().unwrap_or_else(|e| e.into_inner());
            current.url == config.url && current.auth_token == config.auth_token
        };
        if unchanged {
            return;
        }
        let was_running = self.run_cancel.lock().unwrap_or_else(|e| e.into_inner()).is_some();
        self.stop();
        *self.shared.binary_cap.lock().unwrap_or_else(|e| e.into_inner()) =
            config.max_binary_backlog_bytes;
        *self.shared.config.lock().unwrap_or_else(|e| e.into_inner()) = config;
        if was_running {
            self.start();
        }
    }

    pub fn state(&self) -> TransportState {
        self.shared.state.current()
    }

    /// Issue a correlated RPC call. Fails immediately with `NotConnected`
    /// if the channel is not currently connected.
    pub async fn call(
        &self,
        method: impl Into<String>,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, GatewayError> {
        let outbound = {
            let guard = self.shared.outbound.lock().unwrap_or_else(|e| e.into_inner());
            guard.clone().ok_or(GatewayError::NotConnected)?
        };
        let id = self.shared.id_gen.next_id();
        let request = RpcRequest { id: id.clone(), method: method.into(), params };
        let text = encode_text(&request).map_err(GatewayError::SerializationFailure)?;
        let rx = self.shared.pending.set(id.clone());
        if outbound.send(WsMessage::Text(text.into())).is_err() {
            self.shared.pending.reject(&id, GatewayError::ConnectionClosed);
        }
        await_pending(rx).await
    }

    /// Send a raw binary frame. Requires the channel to be connected.
    pub fn send_binary(&self, data: Bytes) -> Result<(), GatewayError> {
        let guard = self.shared.outbound.lock().unwrap_or_else(|e| e.into_inner());
        let outbound = guard.as_ref().ok_or(GatewayError::NotConnected)?;
        outbound
            .send(WsMessage::Binary(data))
            .map_err(|_| GatewayError::ConnectionClosed)
    }

    /// Subscribe to fire-and-forget server events.
    pub fn on_event(&self) -> (broadcast::Receiver<RpcEvent>, Unsubscribe) {
        let rx = self.shared.events_tx.subscribe();
        (rx, Unsubscribe::new(|| {}))
    }

    /// Subscribe to binary frames. The backlog accumulated while no
    /// subscriber was attached is flushed in FIFO order before switching to
    /// direct delivery; only one binary subscriber is supported at a time,
    /// matching the single-consumer terminal-output use case.
    pub fn on_binary_message(&self) -> (mpsc::UnboundedReceiver<Bytes>, Unsubscribe) {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut sink = self.shared.binary.lock().unwrap_or_else(|e| e.into_inner());
            if let BinarySink::Backlog(backlog) = &mut *sink {
                for frame in backlog.drain() {
                    let _ = tx.send(frame);
                }
            }
            *sink = BinarySink::Attached(tx);
        }
        let shared = Arc::clone(&self.shared);
        (
            rx,
            Unsubscribe::new(move || {
                let cap = *shared.binary_cap.lock().unwrap_or_else(|e| e.into_inner());
                let mut sink = shared.binary.lock().unwrap_or_else(|e| e.into_inner());
                *sink = BinarySink::Backlog(BinaryBacklog::new(cap));
            }),
        )
    }

    /// Subscribe to transport state transitions; the returned receiver
    /// yields the current snapshot synchronously on first access.
    pub fn on_state_change(&self) -> watch::Receiver<TransportState> {
        self.shared.state.subscribe()
    }
}

async fn await_pending(
    rx: oneshot::Receiver<registry::CallResult>,
) -> Result<serde_json::Value, GatewayError> {
    match rx.await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::ConnectionClosed),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
