// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session coordinator (C7): the stateful glue between the transport, the
//! RPC client, and the pure mapper/reducer pair.
//!
//! Owns one [`Transport`] bound to one gateway URL, routes every server
//! event through C5 then C6, and exposes the send/cancel/approve/archive/
//! rename surface the UI drives. Grounded on the reference's
//! `mux_client.rs` self-registration lifecycle (spawn background tasks at
//! construction, drive them off a `CancellationToken`-free loop keyed on
//! state transitions) generalized from "register once, heartbeat
//! periodically" to "bootstrap once per connection edge, route events
//! forever."
//!
//! Shared mutable state lives behind a single `std::sync::Mutex`, never
//! held across an `.await` point — the reference's own pattern of guarding
//! state with `tokio::sync` primitives rather than holding a lock across
//! suspension, even though a plain `std::sync::Mutex` suffices here since
//! every critical section is synchronous.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::chat::mapper::{self, MappedEvent};
use crate::chat::model::{
    ActiveThread, ChatId, ChatItem, ChatItemKind, ItemId, ThreadId, ThreadIdLookup, ThreadSummary,
    TokenUsage,
};
use crate::chat::reducer::{self, ApprovalDecision};
use crate::clock::Clock;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::kv::{self, KeyValueStore};
use crate::protocol::RpcEvent;
use crate::rpc::{
    AccountInfo, CollaborationMode, ModelInfo, RespondApprovalParams, RpcClient, SendMessageParams,
    SkillInfo, ToolInfo,
};
use crate::transport::state::TransportState;
use crate::transport::Transport;

/// How long a "queued while running" indicator stays true after
/// `sendMessage` injects a message onto an in-flight turn, absent an
/// earlier `turn.completed` clearing it first (spec.md §4.7).
const QUEUED_INDICATOR_TTL: chrono::Duration = chrono::Duration::seconds(4);

/// Per-chat settings persisted across restarts via the [`KeyValueStore`]
/// collaborator: model, effort, permission mode, agent mode, and the
/// attached folder. Never transcripts (§1 Non-goals).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatSettings {
    pub model: Option<String>,
    pub effort: Option<String>,
    pub permission_mode: Option<String>,
    pub agent_mode: Option<String>,
    pub attached_folder: Option<String>,
}

#[derive(Default)]
struct Inner {
    summaries: Vec<ThreadSummary>,
    threads: HashMap<ChatId, ActiveThread>,
    lookup: ThreadIdLookup,
    deltas: crate::chat::model::MessageDeltaBuffer,
    usage: HashMap<ChatId, TokenUsage>,
    queued_until: HashMap<ChatId, DateTime<Utc>>,
    title_overrides: HashMap<ChatId, String>,
    chat_settings: HashMap<ChatId, ChatSettings>,
    last_active_chat: Option<ChatId>,
    models: Vec<ModelInfo>,
    collaboration_modes: Vec<CollaborationMode>,
    skills: Vec<SkillInfo>,
    tools: Vec<ToolInfo>,
    accounts: Vec<AccountInfo>,
}

impl Inner {
    fn handle_event(&mut self, event: &RpcEvent, clock: &dyn Clock) {
        if let Some(mapped) = mapper::map_event(event, &self.lookup, &mut self.deltas, clock) {
            self.apply_mapped(mapped, clock);
        }
    }

    fn apply_mapped(&mut self, mapped: MappedEvent, clock: &dyn Clock) {
        let chat_id = mapped_chat_id(&mapped).clone();
        if let Some(thread_id) = mapped_thread_id(&mapped) {
            self.lookup.insert(thread_id.clone(), chat_id.clone());
        }

        if let MappedEvent::TokensUsage { usage, model_context_window, .. } = &mapped {
            self.usage.entry(chat_id.clone()).or_default().apply(*usage, *model_context_window);
            return;
        }

        let default_thread_id =
            mapped_thread_id(&mapped).cloned().unwrap_or_else(|| ThreadId(chat_id.0.clone()));
        let thread = self
            .threads
            .entry(chat_id.clone())
            .or_insert_with(|| ActiveThread::new(chat_id.clone(), default_thread_id, String::new()));
        reducer::apply(thread, &mapped);

        if matches!(mapped, MappedEvent::TurnCompleted { .. }) {
            self.queued_until.remove(&chat_id);
        }

        let running = thread.running;
        let thread_id = thread.thread_id.clone();
        let title = thread.title.clone();
        let preview = thread.items.iter().rev().find_map(|i| i.text.clone()).unwrap_or_default();
        self.touch_summary(&chat_id, thread_id, title, preview, running, clock.now());
    }

    fn touch_summary(
        &mut self,
        chat_id: &ChatId,
        thread_id: ThreadId,
        title: String,
        preview: String,
        running: bool,
        now: DateTime<Utc>,
    ) {
        match self.summaries.iter_mut().find(|s| &s.chat_id == chat_id) {
            Some(summary) => {
                summary.running = running;
                summary.preview = preview;
                summary.thread_id = thread_id;
                summary.last_activity_at = now;
            }
            None => self.summaries.push(ThreadSummary {
                chat_id: chat_id.clone(),
                thread_id,
                title,
                preview,
                status: String::new(),
                last_activity_at: now,
                running,
            }),
        }
    }

    fn sorted_summaries(&self) -> Vec<ThreadSummary> {
        let mut summaries = self.summaries.clone();
        summaries.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        summaries
    }
}

fn mapped_chat_id(event: &MappedEvent) -> &ChatId {
    match event {
        MappedEvent::TurnStarted { chat_id, .. }
        | MappedEvent::TurnCompleted { chat_id, .. }
        | MappedEvent::MessageDelta { chat_id, .. }
        | MappedEvent::ItemStarted { chat_id, .. }
        | MappedEvent::ItemCompleted { chat_id, .. }
        | MappedEvent::CommandOutput { chat_id, .. }
        | MappedEvent::PlanUpdated { chat_id, .. }
        | MappedEvent::ApprovalRequired { chat_id, .. }
        | MappedEvent::TokensUsage { chat_id, .. } => chat_id,
    }
}

fn mapped_thread_id(event: &MappedEvent) -> Option<&ThreadId> {
    match event {
        MappedEvent::TurnStarted { thread_id, .. }
        | MappedEvent::TurnCompleted { thread_id, .. }
        | MappedEvent::MessageDelta { thread_id, .. }
        | MappedEvent::ItemStarted { thread_id, .. }
        | MappedEvent::ItemCompleted { thread_id, .. }
        | MappedEvent::CommandOutput { thread_id, .. }
        | MappedEvent::PlanUpdated { thread_id, .. }
        | MappedEvent::ApprovalRequired { thread_id, .. } => Some(thread_id),
        MappedEvent::TokensUsage { .. } => None,
    }
}

/// Bootstrap sequence run exactly once per connection edge (spec.md
/// §4.7): subscribe to `chat.*`, list chats, hydrate each summary's
/// title/preview, then fetch the capability surfaces the UI needs
/// (models, collaboration modes, skills, tools, accounts). Each step is
/// best-effort — a failure is logged and does not abort the rest.
async fn bootstrap(rpc: &RpcClient, inner: &Mutex<Inner>) {
    if let Err(e) = rpc.subscribe_events(vec!["chat.*".to_owned()]).await {
        tracing::warn!(err = %e, "chat event subscription failed");
    }

    let summaries = match rpc.list().await {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(err = %e, "chat.list failed during bootstrap");
            Vec::new()
        }
    };
    {
        let mut guard = inner.lock().unwrap_or_else(|e| e.into_inner());
        for summary in &summaries {
            guard.lookup.insert(summary.thread_id.clone(), summary.chat_id.clone());
        }
        guard.summaries = summaries.clone();
    }

    for summary in &summaries {
        match rpc.read_thread(&summary.chat_id, &summary.thread_id, false).await {
            Ok(read) => {
                let mut guard = inner.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(existing) = guard.summaries.iter_mut().find(|s| s.chat_id == summary.chat_id) {
                    existing.title = read.summary.title;
                    existing.preview = read.summary.preview;
                }
            }
            Err(e) => {
                tracing::debug!(chat = %summary.chat_id, err = %e, "chat.thread.read failed during hydrate");
            }
        }
    }

    if let Ok(models) = rpc.list_models().await {
        inner.lock().unwrap_or_else(|e| e.into_inner()).models = models;
    }
    if let Ok(modes) = rpc.list_collaboration_modes().await {
        inner.lock().unwrap_or_else(|e| e.into_inner()).collaboration_modes = modes;
    }
    if let Ok(skills) = rpc.list_skills().await {
        inner.lock().unwrap_or_else(|e| e.into_inner()).skills = skills;
    }
    match rpc.list_tools().await {
        Ok(tools) => inner.lock().unwrap_or_else(|e| e.into_inner()).tools = tools,
        Err(e) if e.is_method_not_found() => {}
        Err(e) => tracing::debug!(err = %e, "chat.tools.list failed"),
    }
    if let Ok(accounts) = rpc.list_accounts().await {
        inner.lock().unwrap_or_else(|e| e.into_inner()).accounts = accounts;
    }
}

/// Stateful glue owning one gateway connection for its lifetime. See the
/// module docs for the event-routing/bootstrap design.
pub struct SessionCoordinator {
    transport: Arc<Transport>,
    rpc: RpcClient,
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    namespace: Mutex<String>,
    inner: Arc<Mutex<Inner>>,
    optimistic_counter: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionCoordinator {
    pub fn new(config: GatewayConfig, kv: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        let namespace = config.url.clone();
        let transport = Arc::new(Transport::new(config));
        let rpc = RpcClient::new(Arc::clone(&transport));
        let coordinator = Self {
            transport,
            rpc,
            kv,
            clock,
            namespace: Mutex::new(namespace),
            inner: Arc::new(Mutex::new(Inner::default())),
            optimistic_counter: AtomicU64::new(0),
            tasks: Mutex::new(Vec::new()),
        };
        coordinator.spawn_routing();
        coordinator
    }

    fn namespace(&self) -> String {
        self.namespace.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn spawn_routing(&self) {
        let (mut events_rx, _unsub) = self.rpc.on_event();
        let inner = Arc::clone(&self.inner);
        let clock = Arc::clone(&self.clock);
        let events_task = tokio::spawn(async move {
            loop {
                match events_rx.recv().await {
                    Ok(event) => inner.lock().unwrap_or_else(|e| e.into_inner()).handle_event(&event, clock.as_ref()),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let mut state_rx = self.transport.on_state_change();
        let inner = Arc::clone(&self.inner);
        let rpc = self.rpc.clone();
        let state_task = tokio::spawn(async move {
            let mut was_connected = false;
            loop {
                if state_rx.changed().await.is_err() {
                    break;
                }
                let connected = state_rx.borrow().is_connected();
                if connected && !was_connected {
                    was_connected = true;
                    bootstrap(&rpc, &inner).await;
                } else if !connected {
                    was_connected = false;
                }
            }
        });

        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).extend([events_task, state_task]);
    }

    /// Begin connecting. Thread state already held in memory survives a
    /// subsequent disconnect; bootstrap re-runs on every reconnect edge.
    pub fn start(&self) {
        self.transport.start();
    }

    /// Stop synchronously: tears down the transport and discards all
    /// in-memory chat state (spec.md §4.7 item 5).
    pub fn stop(&self) {
        self.transport.stop();
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = Inner::default();
    }

    /// Point this coordinator at a different gateway URL. Drops all
    /// in-memory chat state; the transport itself handles the
    /// disconnect/reconnect per spec.md §4.3.
    pub fn set_connection(&self, config: GatewayConfig) {
        *self.namespace.lock().unwrap_or_else(|e| e.into_inner()) = config.url.clone();
        self.transport.set_connection(config);
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = Inner::default();
    }

    pub fn state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn on_state_change(&self) -> tokio::sync::watch::Receiver<TransportState> {
        self.transport.on_state_change()
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    /// Thread rows for the chat list, sorted by `last_activity_at` descending.
    pub fn thread_summaries(&self) -> Vec<ThreadSummary> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).sorted_summaries()
    }

    pub fn active_thread(&self, chat_id: &ChatId) -> Option<ActiveThread> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).threads.get(chat_id).cloned()
    }

    pub fn token_usage(&self, chat_id: &ChatId) -> Option<TokenUsage> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).usage.get(chat_id).copied()
    }

    pub fn models(&self) -> Vec<ModelInfo> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).models.clone()
    }

    pub fn collaboration_modes(&self) -> Vec<CollaborationMode> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).collaboration_modes.clone()
    }

    pub fn skills(&self) -> Vec<SkillInfo> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).skills.clone()
    }

    pub fn tools(&self) -> Vec<ToolInfo> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).tools.clone()
    }

    pub fn accounts(&self) -> Vec<AccountInfo> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).accounts.clone()
    }

    /// Whether `sendMessage` queued onto an in-flight turn recently enough
    /// that the UI should still show a transient "queued" indicator:
    /// cleared after [`QUEUED_INDICATOR_TTL`] or the next `turn.completed`,
    /// whichever comes first.
    pub fn is_queued(&self, chat_id: &ChatId) -> bool {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match guard.queued_until.get(chat_id) {
            Some(until) => self.clock.now() < *until,
            None => false,
        }
    }

    /// Optimistically append a `user` item, then issue `chat.message.send`.
    /// On success, marks the thread running with the new `turnId`; on
    /// failure, reverts the optimistic item and the running flag.
    pub async fn send_message(
        &self,
        chat_id: ChatId,
        message: String,
        model: Option<String>,
        effort: Option<String>,
        approval_policy: Option<String>,
        collaboration_mode: Option<String>,
    ) -> Result<(), GatewayError> {
        let optimistic_id = ItemId(format!(
            "optimistic:{}",
            self.optimistic_counter.fetch_add(1, Ordering::Relaxed)
        ));
        let inject = {
            let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let thread = guard
                .threads
                .entry(chat_id.clone())
                .or_insert_with(|| ActiveThread::new(chat_id.clone(), ThreadId(chat_id.0.clone()), String::new()));
            let inject = thread.running;
            let mut item = ChatItem::new(optimistic_id.clone(), ChatItemKind::User);
            item.text = Some(message.clone());
            item.optimistic = true;
            thread.items.push(item);
            if inject {
                guard.queued_until.insert(chat_id.clone(), self.clock.now() + QUEUED_INDICATOR_TTL);
            }
            inject
        };

        let params = SendMessageParams {
            chat_id: chat_id.clone(),
            message,
            model,
            effort,
            approval_policy,
            collaboration_mode,
            inject,
        };

        match self.rpc.send_message(params).await {
            Ok(result) => {
                let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(thread) = guard.threads.get_mut(&chat_id) {
                    thread.running = true;
                    thread.active_turn_id = Some(result.turn_id);
                }
                Ok(())
            }
            Err(e) => {
                let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(thread) = guard.threads.get_mut(&chat_id) {
                    thread.items.retain(|item| item.id != optimistic_id);
                    thread.running = false;
                }
                guard.queued_until.remove(&chat_id);
                Err(e)
            }
        }
    }

    /// Best-effort cancel of the chat's active turn. The server confirms
    /// via a subsequent `turn.completed` event, not a local state change.
    pub async fn cancel(&self, chat_id: &ChatId) -> Result<(), GatewayError> {
        let turn_id = {
            let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            guard.threads.get(chat_id).and_then(|t| t.active_turn_id.clone())
        };
        let Some(turn_id) = turn_id else {
            return Ok(());
        };
        self.rpc.cancel(chat_id, &turn_id).await
    }

    /// Optimistically set the approval's status, call the RPC, and roll
    /// back to `"pending"` on failure.
    pub async fn respond_approval(
        &self,
        chat_id: &ChatId,
        request_id: &str,
        decision: ApprovalDecision,
    ) -> Result<(), GatewayError> {
        {
            let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(thread) = guard.threads.get_mut(chat_id) {
                reducer::apply_approval_decision(thread, request_id, decision);
            }
        }
        let result = self
            .rpc
            .respond_approval(RespondApprovalParams {
                request_id: request_id.to_owned(),
                decision: decision.as_str().to_owned(),
            })
            .await;
        if result.is_err() {
            let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(thread) = guard.threads.get_mut(chat_id) {
                reducer::apply_approval_status(thread, request_id, "pending");
            }
        }
        result.map(|_| ())
    }

    pub async fn rename_thread(&self, chat_id: &ChatId, title: &str) -> Result<(), GatewayError> {
        self.rpc.rename_thread(chat_id, title).await?;
        {
            let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(summary) = guard.summaries.iter_mut().find(|s| &s.chat_id == chat_id) {
                summary.title = title.to_owned();
            }
            if let Some(thread) = guard.threads.get_mut(chat_id) {
                thread.title = title.to_owned();
            }
            guard.title_overrides.insert(chat_id.clone(), title.to_owned());
        }
        self.persist_overrides().await;
        Ok(())
    }

    pub async fn archive_thread(&self, chat_id: &ChatId) -> Result<(), GatewayError> {
        self.rpc.archive_thread(chat_id).await?;
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.summaries.retain(|s| &s.chat_id != chat_id);
        guard.threads.remove(chat_id);
        Ok(())
    }

    /// Update and persist a chat's settings (model, effort, permission
    /// mode, agent mode, attached folder).
    pub async fn update_chat_settings(&self, chat_id: ChatId, settings: ChatSettings) {
        {
            let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            guard.chat_settings.insert(chat_id, settings);
        }
        self.persist_settings().await;
    }

    pub fn chat_settings(&self, chat_id: &ChatId) -> ChatSettings {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .chat_settings
            .get(chat_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Mark `chat_id` as the last active chat for this URL, persisting it
    /// via the key/value collaborator.
    pub async fn set_active_chat(&self, chat_id: ChatId) {
        let key = kv::last_active_chat_key(&self.namespace());
        self.kv.set_item(&key, chat_id.as_str()).await;
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).last_active_chat = Some(chat_id);
    }

    /// Restore the last active chat for this URL from the key/value store,
    /// if one was ever recorded.
    pub async fn restore_active_chat(&self) -> Option<ChatId> {
        let key = kv::last_active_chat_key(&self.namespace());
        let value = self.kv.get_item(&key).await?;
        let chat_id = ChatId::from(value);
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).last_active_chat = Some(chat_id.clone());
        Some(chat_id)
    }

    async fn persist_overrides(&self) {
        let overrides = self.inner.lock().unwrap_or_else(|e| e.into_inner()).title_overrides.clone();
        if let Ok(json) = serde_json::to_string(&overrides) {
            self.kv.set_item(&kv::overrides_key(&self.namespace()), &json).await;
        }
    }

    async fn persist_settings(&self) {
        let settings = self.inner.lock().unwrap_or_else(|e| e.into_inner()).chat_settings.clone();
        if let Ok(json) = serde_json::to_string(&settings) {
            self.kv.set_item(&kv::settings_key(&self.namespace()), &json).await;
        }
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        for task in self.tasks.lock().unwrap_or_else(|e| e.into_inner()).drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
