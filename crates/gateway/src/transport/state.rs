// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport connection state and the broadcast of its transitions.
//!
//! `tokio::sync::watch` is used instead of `broadcast` because subscribers
//! must receive the current snapshot synchronously on subscription — a
//! `broadcast::Receiver` only sees values sent after it was created.

use tokio::sync::watch;

use crate::protocol::ServerHello;

/// One of the transport's six states. Every transition carries a snapshot
/// to every listener, including a synchronous emission at subscribe time.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    /// Channel open, `ClientHello` sent, awaiting `ServerHello`/`HelloReject`.
    Handshaking,
    Connected { server_hello: ServerHello },
    /// Recoverable: a reconnect is (or will be) scheduled.
    Error { detail: String },
    /// Not recoverable: the server refused the handshake.
    Rejected { code: String, reason: String },
}

impl TransportState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Short tag matching the user-visible pill states from the error
    /// handling design: `connecting|connected|error|rejected`, folding the
    /// two pre-connected states into `connecting`.
    pub fn pill(&self) -> &'static str {
        match self {
            Self::Disconnected | Self::Connecting | Self::Handshaking => "connecting",
            Self::Connected { .. } => "connected",
            Self::Error { .. } => "error",
            Self::Rejected { .. } => "rejected",
        }
    }
}

/// Owns the current [`TransportState`] and broadcasts transitions.
pub struct StateBroadcaster {
    tx: watch::Sender<TransportState>,
}

impl StateBroadcaster {
    pub fn new() -> Self {
        Self { tx: watch::Sender::new(TransportState::Disconnected) }
    }

    pub fn current(&self) -> TransportState {
        self.tx.borrow().clone()
    }

    /// Transition to `state`, notifying every subscriber.
    pub fn set(&self, state: TransportState) {
        self.tx.send_replace(state);
    }

    /// Subscribe to state changes. The returned receiver yields the current
    /// snapshot on the first `changed()`/`borrow()` call, matching the
    /// contract that subscription delivers an immediate synchronous emit.
    pub fn subscribe(&self) -> watch::Receiver<TransportState> {
        self.tx.subscribe()
    }
}

impl Default for StateBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
