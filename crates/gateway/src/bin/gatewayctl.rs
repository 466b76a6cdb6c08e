// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manual smoke-test client: connects to a gateway URL, logs every
//! transport state transition and chat event, and optionally fires one
//! `chat.message.send`. Not part of the published crate surface.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use homie_gateway::chat::model::ChatId;
use homie_gateway::clock::SystemClock;
use homie_gateway::config::GatewayConfig;
use homie_gateway::coordinator::SessionCoordinator;
use homie_gateway::kv::KeyValueStore;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "gatewayctl", about = "Smoke-test client for a gateway server")]
struct Cli {
    /// ws:// or wss:// gateway URL. Falls back to $GATEWAY_URL.
    #[arg(long)]
    url: Option<String>,

    /// Bearer token sent in ClientHello.
    #[arg(long)]
    token: Option<String>,

    /// Chat id to send --message to once connected.
    #[arg(long)]
    chat: Option<String>,

    /// Message text to send once connected.
    #[arg(long)]
    message: Option<String>,

    /// Seconds to stay connected before exiting.
    #[arg(long, default_value_t = 10)]
    seconds: u64,
}

/// Discards everything; this binary has no durable state of its own.
struct NullStore;

#[async_trait::async_trait]
impl KeyValueStore for NullStore {
    async fn get_item(&self, _key: &str) -> Option<String> {
        None
    }

    async fn set_item(&self, _key: &str, _value: &str) {}

    async fn remove_item(&self, _key: &str) {}
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let Some(url) = cli.url.clone().or_else(GatewayConfig::url_from_env) else {
        error!("no gateway url given: pass --url or set GATEWAY_URL");
        std::process::exit(2);
    };

    let mut config = match GatewayConfig::new(url, "gatewayctl") {
        Ok(config) => config,
        Err(e) => {
            error!(err = %e, "invalid gateway url");
            std::process::exit(2);
        }
    };
    if let Some(token) = cli.token.clone() {
        config = config.with_auth_token(token);
    }

    let coordinator =
        Arc::new(SessionCoordinator::new(config, Arc::new(NullStore), Arc::new(SystemClock)));
    coordinator.start();

    let seconds = cli.seconds;
    let send_once = cli.chat.clone().zip(cli.message.clone());
    let watcher = {
        let coordinator = Arc::clone(&coordinator);
        let mut state_rx = coordinator.on_state_change();
        let mut sent = false;
        tokio::spawn(async move {
            loop {
                if state_rx.changed().await.is_err() {
                    break;
                }
                let state = state_rx.borrow().clone();
                info!(?state, "transport state changed");
                if !sent && state.is_connected() {
                    if let Some((chat, message)) = send_once.clone() {
                        sent = true;
                        let chat_id = ChatId::from(chat);
                        match coordinator
                            .send_message(chat_id, message, None, None, None, None)
                            .await
                        {
                            Ok(()) => info!("message sent"),
                            Err(e) => error!(err = %e, "send_message failed"),
                        }
                    }
                }
            }
        })
    };

    tokio::time::sleep(Duration::from_secs(seconds)).await;
    watcher.abort();
    coordinator.stop();

    for summary in coordinator.thread_summaries() {
        info!(chat = %summary.chat_id.as_str(), title = %summary.title, running = summary.running, "chat summary");
    }
}
