// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure classifier from a raw gateway event to a normalized [`MappedEvent`].
//!
//! Dispatch-by-topic mirrors the reference's `events.rs::parse_upstream_message`
//! shape (match on a string tag, build a typed variant), generalized from a
//! fixed `{event, ...}` envelope to this protocol's `{topic, params}` one.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::chat::model::{ChatItem, ChatItemKind, ChatId, ItemId, MessageDeltaBuffer, ThreadId, ThreadIdLookup, TokenCounts, TurnId};
use crate::clock::Clock;
use crate::protocol::{deserialize_id_as_string, RpcEvent};

#[derive(Debug, Clone, PartialEq)]
pub enum MappedEvent {
    TurnStarted { chat_id: ChatId, thread_id: ThreadId, turn_id: TurnId, activity_at: DateTime<Utc> },
    TurnCompleted { chat_id: ChatId, thread_id: ThreadId, turn_id: TurnId, activity_at: DateTime<Utc> },
    MessageDelta {
        chat_id: ChatId,
        thread_id: ThreadId,
        turn_id: TurnId,
        item_id: Option<ItemId>,
        text: String,
    },
    ItemStarted { chat_id: ChatId, thread_id: ThreadId, turn_id: TurnId, item: ChatItem },
    ItemCompleted { chat_id: ChatId, thread_id: ThreadId, turn_id: TurnId, item: ChatItem },
    CommandOutput {
        chat_id: ChatId,
        thread_id: ThreadId,
        turn_id: TurnId,
        item_id: ItemId,
        delta_text: String,
    },
    PlanUpdated {
        chat_id: ChatId,
        thread_id: ThreadId,
        turn_id: TurnId,
        text: String,
        plan: Vec<Value>,
    },
    ApprovalRequired {
        chat_id: ChatId,
        thread_id: ThreadId,
        turn_id: TurnId,
        item_id: ItemId,
        request_id: String,
        reason: Option<String>,
        command: Option<String>,
        cwd: Option<String>,
    },
    TokensUsage { chat_id: ChatId, usage: TokenCounts, model_context_window: Option<u64> },
}

/// Resolve the `chat_id` for `thread_id`: if the lookup has no entry yet,
/// fall back to using the thread id itself as the chat id, so the
/// coordinator can create a summary on demand rather than dropping the
/// event.
fn resolve_chat_id(lookup: &ThreadIdLookup, thread_id: &ThreadId) -> ChatId {
    lookup.chat_id_for(thread_id).cloned().unwrap_or_else(|| ChatId(thread_id.0.clone()))
}

fn raw_item_kind(raw_type: &str) -> Option<ChatItemKind> {
    match raw_type {
        "userMessage" => Some(ChatItemKind::User),
        "agentMessage" => Some(ChatItemKind::Assistant),
        "reasoning" => Some(ChatItemKind::Reasoning),
        "commandExecution" => Some(ChatItemKind::Command),
        "fileChange" => Some(ChatItemKind::File),
        "plan" => Some(ChatItemKind::Plan),
        "diff" => Some(ChatItemKind::Diff),
        "mcpToolCall" => Some(ChatItemKind::Tool),
        "webSearch" => Some(ChatItemKind::System),
        _ => None,
    }
}

/// Build a [`ChatItem`] from a raw item payload, classifying its `type`
/// field into a [`ChatItemKind`] and copying through the fields the raw
/// payload happens to carry.
fn build_item(raw: &Value) -> Option<ChatItem> {
    let raw_type = raw.get("type")?.as_str()?;
    let kind = raw_item_kind(raw_type)?;
    let id = ItemId(raw.get("id")?.as_str()?.to_owned());
    let mut item = ChatItem::new(id, kind);
    item.turn_id = raw.get("turn_id").and_then(Value::as_str).map(|s| TurnId(s.to_owned()));
    item.text = raw.get("text").and_then(Value::as_str).map(str::to_owned);
    item.command = raw.get("command").and_then(Value::as_str).map(str::to_owned);
    item.cwd = raw.get("cwd").and_then(Value::as_str).map(str::to_owned);
    item.output = raw.get("output").and_then(Value::as_str).map(str::to_owned);
    item.status = raw.get("status").and_then(Value::as_str).map(str::to_owned);
    if let Some(Value::Array(changes)) = raw.get("changes") {
        item.changes = changes.clone();
    }
    if let Some(Value::Array(summary)) = raw.get("summary") {
        item.summary = summary.iter().filter_map(Value::as_str).map(str::to_owned).collect();
    }
    item.raw = Some(raw.clone());
    Some(item)
}

#[derive(Deserialize)]
struct TurnParams {
    thread_id: String,
    turn_id: String,
}

#[derive(Deserialize)]
struct MessageDeltaParams {
    thread_id: String,
    turn_id: String,
    #[serde(default)]
    item_id: Option<String>,
    #[serde(default)]
    delta: String,
}

#[derive(Deserialize)]
struct ItemEventParams {
    thread_id: String,
    turn_id: String,
    item: Value,
}

#[derive(Deserialize)]
struct CommandOutputParams {
    thread_id: String,
    turn_id: String,
    item_id: String,
    #[serde(default)]
    delta_text: String,
}

#[derive(Deserialize)]
struct PlanUpdatedParams {
    thread_id: String,
    turn_id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    plan: Vec<Value>,
}

#[derive(Deserialize)]
struct ApprovalRequiredParams {
    thread_id: String,
    turn_id: String,
    item_id: String,
    #[serde(deserialize_with = "deserialize_id_as_string")]
    request_id: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    cwd: Option<String>,
}

#[derive(Deserialize)]
struct TokensUsageParams {
    chat_id: String,
    #[serde(default)]
    total_tokens: u64,
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    cached_input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    reasoning_output_tokens: u64,
    #[serde(default)]
    model_context_window: Option<u64>,
}

/// Classify one raw server event into a [`MappedEvent`], or `None` to
/// ignore it. `lookup` resolves `thread_id → chat_id`; `deltas` is
/// mutated to accumulate assistant text across calls.
pub fn map_event(
    event: &RpcEvent,
    lookup: &ThreadIdLookup,
    deltas: &mut MessageDeltaBuffer,
    clock: &dyn Clock,
) -> Option<MappedEvent> {
    let params = event.params.as_ref()?;
    match event.topic.as_str() {
        "chat.turn.started" => {
            let p: TurnParams = serde_json::from_value(params.clone()).ok()?;
            let thread_id = ThreadId(p.thread_id);
            let chat_id = resolve_chat_id(lookup, &thread_id);
            Some(MappedEvent::TurnStarted {
                chat_id,
                thread_id,
                turn_id: TurnId(p.turn_id),
                activity_at: clock.now(),
            })
        }
        "chat.turn.completed" => {
            let p: TurnParams = serde_json::from_value(params.clone()).ok()?;
            let thread_id = ThreadId(p.thread_id);
            let chat_id = resolve_chat_id(lookup, &thread_id);
            Some(MappedEvent::TurnCompleted {
                chat_id,
                thread_id,
                turn_id: TurnId(p.turn_id),
                activity_at: clock.now(),
            })
        }
        "chat.message.delta" => {
            let p: MessageDeltaParams = serde_json::from_value(params.clone()).ok()?;
            let thread_id = ThreadId(p.thread_id);
            let chat_id = resolve_chat_id(lookup, &thread_id);
            let turn_id = TurnId(p.turn_id);
            let item_id = p.item_id.map(ItemId);
            let text = deltas.append(turn_id.clone(), item_id.clone(), &p.delta);
            Some(MappedEvent::MessageDelta { chat_id, thread_id, turn_id, item_id, text })
        }
        "chat.item.started" | "chat.item.completed" => {
            let p: ItemEventParams = serde_json::from_value(params.clone()).ok()?;
            let thread_id = ThreadId(p.thread_id);
            let chat_id = resolve_chat_id(lookup, &thread_id);
            let turn_id = TurnId(p.turn_id);
            let mut item = build_item(&p.item)?;
            item.turn_id = Some(turn_id.clone());
            if event.topic == "chat.item.started" {
                Some(MappedEvent::ItemStarted { chat_id, thread_id, turn_id, item })
            } else {
                Some(MappedEvent::ItemCompleted { chat_id, thread_id, turn_id, item })
            }
        }
        "chat.command.output" => {
            let p: CommandOutputParams = serde_json::from_value(params.clone()).ok()?;
            let thread_id = ThreadId(p.thread_id);
            let chat_id = resolve_chat_id(lookup, &thread_id);
            Some(MappedEvent::CommandOutput {
                chat_id,
                thread_id,
                turn_id: TurnId(p.turn_id),
                item_id: ItemId(p.item_id),
                delta_text: p.delta_text,
            })
        }
        "chat.plan.updated" => {
            let p: PlanUpdatedParams = serde_json::from_value(params.clone()).ok()?;
            let thread_id = ThreadId(p.thread_id);
            let chat_id = resolve_chat_id(lookup, &thread_id);
            Some(MappedEvent::PlanUpdated {
                chat_id,
                thread_id,
                turn_id: TurnId(p.turn_id),
                text: p.text,
                plan: p.plan,
            })
        }
        "chat.approval.required" => {
            let p: ApprovalRequiredParams = serde_json::from_value(params.clone()).ok()?;
            let thread_id = ThreadId(p.thread_id);
            let chat_id = resolve_chat_id(lookup, &thread_id);
            Some(MappedEvent::ApprovalRequired {
                chat_id,
                thread_id,
                turn_id: TurnId(p.turn_id),
                item_id: ItemId(p.item_id),
                request_id: p.request_id,
                reason: p.reason,
                command: p.command,
                cwd: p.cwd,
            })
        }
        "chat.tokens.usage" => {
            let p: TokensUsageParams = serde_json::from_value(params.clone()).ok()?;
            Some(MappedEvent::TokensUsage {
                chat_id: ChatId(p.chat_id),
                usage: TokenCounts {
                    total_tokens: p.total_tokens,
                    input_tokens: p.input_tokens,
                    cached_input_tokens: p.cached_input_tokens,
                    output_tokens: p.output_tokens,
                    reasoning_output_tokens: p.reasoning_output_tokens,
                },
                model_context_window: p.model_context_window,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
#[path = "mapper_tests.rs"]
mod tests;
