// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios against the scripted mock gateway: handshake
//! accept, handshake reject, reconnect across a pending approval, and
//! reconnect backoff timing.

use std::collections::HashMap as StdHashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use homie_gateway::chat::model::{ChatId, ChatItemKind};
use homie_gateway::chat::reducer::{count_pending_approvals, ApprovalDecision};
use homie_gateway::clock::SystemClock;
use homie_gateway::config::GatewayConfig;
use homie_gateway::coordinator::SessionCoordinator;
use homie_gateway::kv::KeyValueStore;
use homie_gateway::transport::state::TransportState;
use homie_gateway_specs::{closed_port, AcceptScript, ConnectionScript, MockGateway};
use serde_json::json;

const TIMEOUT: Duration = Duration::from_secs(10);

struct MemoryStore {
    data: Mutex<StdHashMap<String, String>>,
}

impl MemoryStore {
    fn new() -> Arc<dyn KeyValueStore> {
        Arc::new(Self { data: Mutex::new(StdHashMap::new()) })
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Option<String> {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned()
    }

    async fn set_item(&self, key: &str, value: &str) {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).insert(key.to_owned(), value.to_owned());
    }

    async fn remove_item(&self, key: &str) {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).remove(key);
    }
}

async fn wait_until(
    deadline: tokio::time::Instant,
    mut predicate: impl FnMut() -> bool,
) -> anyhow::Result<()> {
    loop {
        if predicate() {
            return Ok(());
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("condition never became true before the deadline");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn s1_handshake_success() -> anyhow::Result<()> {
    let gateway = MockGateway::start(
        Vec::new(),
        ConnectionScript::Accept(AcceptScript {
            server_id: "s1".to_owned(),
            services: vec![("chat".to_owned(), 1)],
            ..Default::default()
        }),
    )
    .await;

    let config = GatewayConfig::new(gateway.url(), "c")?;
    let coordinator = SessionCoordinator::new(config, MemoryStore::new(), Arc::new(SystemClock));
    coordinator.start();

    let deadline = tokio::time::Instant::now() + TIMEOUT;
    wait_until(deadline, || coordinator.state().is_connected()).await?;

    match coordinator.state() {
        TransportState::Connected { server_hello } => assert_eq!(server_hello.server_id, "s1"),
        other => anyhow::bail!("expected connected, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn s2_handshake_reject() -> anyhow::Result<()> {
    let gateway = MockGateway::start(
        vec![ConnectionScript::Reject { code: "AUTH".to_owned(), reason: "bad token".to_owned() }],
        ConnectionScript::DropImmediately,
    )
    .await;

    let config = GatewayConfig::new(gateway.url(), "c")?;
    let coordinator = SessionCoordinator::new(config, MemoryStore::new(), Arc::new(SystemClock));
    coordinator.start();

    let deadline = tokio::time::Instant::now() + TIMEOUT;
    wait_until(deadline, || coordinator.state().is_terminal()).await?;

    match coordinator.state() {
        TransportState::Rejected { code, reason } => {
            assert_eq!(code, "AUTH");
            assert_eq!(reason, "bad token");
        }
        other => anyhow::bail!("expected rejected, got {other:?}"),
    }

    // A rejected handshake is terminal: no reconnect attempt should follow.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(gateway.connect_attempts().len(), 1);
    Ok(())
}

#[tokio::test]
async fn s5_reconnect_survives_pending_approval() -> anyhow::Result<()> {
    let mut responses = StdHashMap::new();
    responses.insert("chat.approval.respond".to_owned(), json!({"ok": true}));

    let first = ConnectionScript::Accept(AcceptScript {
        server_id: "s1".to_owned(),
        events: vec![(
            "chat.approval.required".to_owned(),
            json!({"thread_id": "t1", "turn_id": "u1", "item_id": "a1", "request_id": 42}),
        )],
        close_after_events: true,
        ..Default::default()
    });
    let second = ConnectionScript::Accept(AcceptScript {
        server_id: "s1".to_owned(),
        responses,
        ..Default::default()
    });

    let gateway = MockGateway::start(vec![first], second).await;
    let config = GatewayConfig::new(gateway.url(), "c")?;
    let coordinator = SessionCoordinator::new(config, MemoryStore::new(), Arc::new(SystemClock));
    coordinator.start();

    let chat_id = ChatId::from("t1");
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    wait_until(deadline, || {
        coordinator
            .active_thread(&chat_id)
            .map(|t| count_pending_approvals(&t.items) == 1)
            .unwrap_or(false)
    })
    .await?;

    // The first connection closes right after the event, forcing a
    // reconnect; wait for the second connection and the approval to
    // still be sitting there afterward.
    wait_until(deadline, || gateway.connect_attempts().len() >= 2).await?;
    wait_until(deadline, || coordinator.state().is_connected()).await?;

    let thread = coordinator.active_thread(&chat_id).expect("thread survives reconnect");
    assert_eq!(count_pending_approvals(&thread.items), 1);

    coordinator.respond_approval(&chat_id, "42", ApprovalDecision::Accept).await?;

    let thread = coordinator.active_thread(&chat_id).expect("thread present after approval");
    let approval =
        thread.items.iter().find(|i| i.kind == ChatItemKind::Approval).expect("approval item");
    assert_eq!(approval.status.as_deref(), Some("accept"));
    assert_eq!(count_pending_approvals(&thread.items), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn s6_backoff_escalates() -> anyhow::Result<()> {
    let port = closed_port();
    let mut config = GatewayConfig::new(format!("ws://127.0.0.1:{port}/gateway"), "c")?;
    config.reconnect_base = Duration::from_millis(1000);
    config.reconnect_cap = Duration::from_millis(30_000);

    let coordinator = SessionCoordinator::new(config, MemoryStore::new(), Arc::new(SystemClock));
    coordinator.start();

    let mut state_rx = coordinator.on_state_change();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    let mut errors = Vec::new();
    loop {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("did not observe four connection failures in time");
        }
        state_rx.changed().await?;
        let is_error = matches!(&*state_rx.borrow(), TransportState::Error { .. });
        if is_error {
            errors.push(tokio::time::Instant::now());
            if errors.len() >= 4 {
                break;
            }
        }
    }

    let deltas: Vec<u128> = errors.windows(2).map(|w| (w[1] - w[0]).as_millis()).collect();
    assert!(deltas[0] >= 900 && deltas[0] <= 1300, "first delay was {}ms", deltas[0]);
    assert!(deltas[1] >= 1800 && deltas[1] <= 2300, "second delay was {}ms", deltas[1]);
    assert!(deltas[2] >= 3600 && deltas[2] <= 4300, "third delay was {}ms", deltas[2]);
    Ok(())
}
