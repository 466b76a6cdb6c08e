// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory conversation model: chats, threads, items, and token usage.
//!
//! Newtype id wrappers (`ChatId`/`ThreadId`/`TurnId`/`ItemId`) keep the four
//! kinds of server-issued string id from being interchanged by accident —
//! the reference doesn't need this (its ids are all `session_id: String`
//! in a single-session-per-process model), but a multi-chat client
//! juggling four id spaces benefits from the compiler catching the mixup.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(ChatId);
string_id!(ThreadId);
string_id!(TurnId);
string_id!(ItemId);

/// A unit of content attached to a turn. `kind` is tagged on the wire as
/// `kind` (not `type`, to avoid colliding with the RPC envelope's own
/// `type` tag when items are embedded in a larger payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatItemKind {
    User,
    Assistant,
    Plan,
    Reasoning,
    Command,
    File,
    Diff,
    Approval,
    Tool,
    System,
}

/// One entry in a thread's item list. `id` is unique within a thread; the
/// same `id` is updated in place, never duplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatItem {
    pub id: ItemId,
    pub kind: ChatItemKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<TurnId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub summary: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optimistic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl ChatItem {
    /// A bare item with only id/kind set; callers fill in the rest.
    pub fn new(id: ItemId, kind: ChatItemKind) -> Self {
        Self {
            id,
            kind,
            turn_id: None,
            text: None,
            summary: Vec::new(),
            content: Vec::new(),
            command: None,
            cwd: None,
            output: None,
            changes: Vec::new(),
            status: None,
            request_id: None,
            reason: None,
            optimistic: false,
            raw: None,
        }
    }
}

/// Row shown in a chat list, sorted by `last_activity_at` descending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub chat_id: ChatId,
    pub thread_id: ThreadId,
    pub title: String,
    #[serde(default)]
    pub preview: String,
    #[serde(default)]
    pub status: String,
    pub last_activity_at: DateTime<Utc>,
    #[serde(default)]
    pub running: bool,
}

/// The chat currently open in the UI, with its full item list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveThread {
    pub chat_id: ChatId,
    pub thread_id: ThreadId,
    pub title: String,
    pub items: Vec<ChatItem>,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_turn_id: Option<TurnId>,
}

impl ActiveThread {
    pub fn new(chat_id: ChatId, thread_id: ThreadId, title: String) -> Self {
        Self { chat_id, thread_id, title, items: Vec::new(), running: false, active_turn_id: None }
    }

    pub fn find_item(&self, id: &ItemId) -> Option<&ChatItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn find_item_mut(&mut self, id: &ItemId) -> Option<&mut ChatItem> {
        self.items.iter_mut().find(|item| &item.id == id)
    }
}

/// Per-chat token accounting. `last` is overwritten by each usage event;
/// `total` only ever grows within a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub cached_input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_output_tokens: u64,
}

impl TokenCounts {
    fn accumulate(&mut self, delta: &TokenCounts) {
        self.total_tokens += delta.total_tokens;
        self.input_tokens += delta.input_tokens;
        self.cached_input_tokens += delta.cached_input_tokens;
        self.output_tokens += delta.output_tokens;
        self.reasoning_output_tokens += delta.reasoning_output_tokens;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub total: TokenCounts,
    pub last: TokenCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_context_window: Option<u64>,
}

impl TokenUsage {
    /// Apply a freshly reported usage snapshot: `last` is replaced outright,
    /// `total` accumulates.
    pub fn apply(&mut self, last: TokenCounts, model_context_window: Option<u64>) {
        self.total.accumulate(&last);
        self.last = last;
        if model_context_window.is_some() {
            self.model_context_window = model_context_window;
        }
    }
}

/// Accumulated assistant text per `(turn_id, item_id)`, cleared when the
/// item completes. `item_id` is `None` when the server omits it on a
/// `message.delta` event — all deltas for that turn then share one slot.
#[derive(Debug, Default)]
pub struct MessageDeltaBuffer {
    buffers: HashMap<(TurnId, Option<ItemId>), String>,
}

impl MessageDeltaBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `delta` to the buffer for `(turn_id, item_id)` and return the
    /// accumulated text so far.
    pub fn append(&mut self, turn_id: TurnId, item_id: Option<ItemId>, delta: &str) -> String {
        let entry = self.buffers.entry((turn_id, item_id)).or_default();
        entry.push_str(delta);
        entry.clone()
    }

    pub fn clear(&mut self, turn_id: &TurnId, item_id: &Option<ItemId>) {
        self.buffers.remove(&(turn_id.clone(), item_id.clone()));
    }
}

/// Routes a wire `thread_id` back to the owning `chat_id`.
#[derive(Debug, Default)]
pub struct ThreadIdLookup {
    by_thread: HashMap<ThreadId, ChatId>,
}

impl ThreadIdLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, thread_id: ThreadId, chat_id: ChatId) {
        self.by_thread.insert(thread_id, chat_id);
    }

    pub fn chat_id_for(&self, thread_id: &ThreadId) -> Option<&ChatId> {
        self.by_thread.get(thread_id)
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
