// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport tuning knobs and client identity sent in `ClientHello`.

use std::time::Duration;

use crate::error::GatewayError;

/// Protocol version range this client speaks, sent as `ClientHello.protocol`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolRange {
    pub min: u32,
    pub max: u32,
}

impl Default for ProtocolRange {
    fn default() -> Self {
        Self { min: 1, max: 1 }
    }
}

/// Configuration for a [`crate::transport::Transport`] instance.
///
/// One `GatewayConfig` binds to one gateway URL. Changing the URL requires
/// a new config, which `Transport::set_connection` accepts and uses to
/// rebuild the connection.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// `ws://` or `wss://` URL of the gateway. Validated at construction.
    pub url: String,
    /// Bearer-style auth token sent as `ClientHello.auth_token`.
    pub auth_token: Option<String>,
    /// Opaque client identifier sent as `ClientHello.client_id`.
    pub client_id: String,
    /// Capability tags advertised in `ClientHello.capabilities`.
    pub capabilities: Vec<String>,
    /// Protocol version range advertised in `ClientHello.protocol`.
    pub protocol: ProtocolRange,
    /// Base delay for reconnect backoff (default 1000ms).
    pub reconnect_base: Duration,
    /// Reconnect backoff ceiling (default 30000ms).
    pub reconnect_cap: Duration,
    /// How long to wait for `ServerHello`/`HelloReject` after the socket
    /// opens (default 5s).
    pub handshake_timeout: Duration,
    /// Max bytes buffered for binary frames with no subscriber attached
    /// (default 1 MiB).
    pub max_binary_backlog_bytes: usize,
}

impl GatewayConfig {
    /// Build a config for `url`, validating the scheme.
    ///
    /// `client_id` should be stable for the lifetime of the process (it is
    /// not used for correlation, only reported to the server).
    pub fn new(url: impl Into<String>, client_id: impl Into<String>) -> Result<Self, GatewayError> {
        let url = url.into();
        validate_ws_url(&url)?;
        Ok(Self {
            url,
            auth_token: None,
            client_id: client_id.into(),
            capabilities: vec!["chat".to_owned()],
            protocol: ProtocolRange::default(),
            reconnect_base: Duration::from_millis(1000),
            reconnect_cap: Duration::from_millis(30_000),
            handshake_timeout: Duration::from_secs(5),
            max_binary_backlog_bytes: 1024 * 1024,
        })
    }

    /// Read `GATEWAY_URL` from the environment as a fallback URL.
    pub fn url_from_env() -> Option<String> {
        std::env::var("GATEWAY_URL").ok()
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Compute the reconnect delay for the given (zero-based) retry count:
    /// `min(base * 2^retry, cap)`.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let scaled = self.reconnect_base.saturating_mul(1u32.checked_shl(retry).unwrap_or(u32::MAX));
        scaled.min(self.reconnect_cap)
    }
}

/// Validate that `url` uses `ws://` or `wss://`.
pub fn validate_ws_url(url: &str) -> Result<(), GatewayError> {
    let parsed = url::Url::parse(url).map_err(|e| GatewayError::InvalidUrl(e.to_string()))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(GatewayError::InvalidUrl(format!("unsupported scheme {other:?}"))),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
