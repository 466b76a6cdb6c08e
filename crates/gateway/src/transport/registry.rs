// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pending-request correlation table.
//!
//! Generalizes the reference bridge's `pending: HashMap<String, PendingRequest>`
//! (`upstream/bridge.rs`) from a fire-and-forget relay into a proper
//! resolve/reject registry backed by oneshot channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::error::GatewayError;
use crate::protocol::RpcErrorPayload;

/// Outcome delivered to a caller awaiting a correlated response.
pub type CallResult = Result<serde_json::Value, GatewayError>;

/// Generates request ids. Pluggable so tests can supply deterministic ids;
/// the default produces a monotonically increasing counter, stringified.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Default generator: an `AtomicU64` counter, matching the reference
/// bridge's `rid_counter` style rather than a UUID (ids here are never
/// shown to a user, only echoed back over the wire).
#[derive(Default)]
pub struct CounterIdGenerator {
    counter: AtomicU64,
}

impl IdGenerator for CounterIdGenerator {
    fn next_id(&self) -> String {
        (self.counter.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }
}

/// Holds one oneshot sender per in-flight call, keyed by request id.
#[derive(Default)]
pub struct PendingRequests {
    inner: Mutex<HashMap<String, oneshot::Sender<CallResult>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending call, returning the receiver half.
    pub fn set(&self, id: String) -> oneshot::Receiver<CallResult> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).insert(id, tx);
        rx
    }

    /// Resolve a pending call with a successful RPC result.
    ///
    /// A no-op if `id` is unknown (already resolved, rejected, or never
    /// registered) — delivering a response twice must not panic.
    pub fn resolve(&self, id: &str, value: serde_json::Value) {
        if let Some(tx) = self.inner.lock().unwrap_or_else(|e| e.into_inner()).remove(id) {
            let _ = tx.send(Ok(value));
        }
    }

    /// Reject a pending call with a server-originated RPC error.
    pub fn reject_rpc(&self, id: &str, error: RpcErrorPayload) {
        if let Some(tx) = self.inner.lock().unwrap_or_else(|e| e.into_inner()).remove(id) {
            let _ = tx.send(Err(GatewayError::RpcError {
                code: error.code,
                message: error.message,
                data: error.data,
            }));
        }
    }

    /// Reject a single pending call with an arbitrary transport-level error.
    pub fn reject(&self, id: &str, err: GatewayError) {
        if let Some(tx) = self.inner.lock().unwrap_or_else(|e| e.into_inner()).remove(id) {
            let _ = tx.send(Err(err));
        }
    }

    /// Reject every pending call with `err`, draining the table. Called on
    /// channel close or URL change.
    pub fn reject_all(&self, err: GatewayError) {
        let pending: Vec<_> =
            self.inner.lock().unwrap_or_else(|e| e.into_inner()).drain().collect();
        for (_, tx) in pending {
            let _ = tx.send(Err(err.clone()));
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
