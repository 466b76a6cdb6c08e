// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure `(thread, mapped event) -> thread` reducer: item insertion/update,
//! the running flag, approval transitions, and ordering.
//!
//! Each function takes the minimal state it needs and mutates it in place,
//! independently testable — the same shape as the reference's
//! `session/transition.rs` handlers (`process_detected_state` et al.), just
//! without the `Store`/async plumbing since this reducer is pure and
//! synchronous.

use crate::chat::mapper::MappedEvent;
use crate::chat::model::{ActiveThread, ChatItem, ChatItemKind, ItemId, TurnId};

/// Apply one mapped event to `thread`, in place. No I/O; safe to call from
/// any context, including tests replaying a recorded event log.
pub fn apply(thread: &mut ActiveThread, event: &MappedEvent) {
    match event {
        MappedEvent::TurnStarted { turn_id, .. } => {
            thread.running = true;
            thread.active_turn_id = Some(turn_id.clone());
        }
        MappedEvent::TurnCompleted { turn_id, .. } => {
            thread.running = false;
            if thread.active_turn_id.as_ref() == Some(turn_id) {
                thread.active_turn_id = None;
            }
        }
        MappedEvent::MessageDelta { turn_id, item_id, text, .. } => {
            apply_message_delta(thread, turn_id, item_id.as_ref(), text);
        }
        MappedEvent::ItemStarted { item, .. } => upsert_item(thread, item.clone()),
        MappedEvent::ItemCompleted { item, .. } => upsert_item(thread, item.clone()),
        MappedEvent::CommandOutput { item_id, delta_text, .. } => {
            apply_command_output(thread, item_id, delta_text);
        }
        MappedEvent::PlanUpdated { turn_id, text, plan, .. } => {
            apply_plan_updated(thread, turn_id, text, plan);
        }
        MappedEvent::ApprovalRequired { turn_id, item_id, request_id, reason, command, cwd, .. } => {
            apply_approval_required(thread, turn_id, item_id, request_id, reason, command, cwd);
        }
        // Token usage is a side-channel the coordinator tracks per chat_id,
        // not an item mutation; nothing to do to the thread itself.
        MappedEvent::TokensUsage { .. } => {}
    }
}

/// Locate the assistant item for `(turn_id, item_id)`; insert one if
/// absent. The buffer's accumulated text is authoritative — it replaces,
/// not appends to, the item's `text`.
fn apply_message_delta(
    thread: &mut ActiveThread,
    turn_id: &TurnId,
    item_id: Option<&ItemId>,
    text: &str,
) {
    let existing = thread.items.iter_mut().find(|item| {
        item.kind == ChatItemKind::Assistant
            && item.turn_id.as_ref() == Some(turn_id)
            && item.id.0.as_str() == item_id.map(|i| i.0.as_str()).unwrap_or(turn_id.0.as_str())
    });
    match existing {
        Some(item) => item.text = Some(text.to_owned()),
        None => {
            let id = item_id.cloned().unwrap_or_else(|| turn_id.clone().into());
            let mut item = ChatItem::new(id, ChatItemKind::Assistant);
            item.turn_id = Some(turn_id.clone());
            item.text = Some(text.to_owned());
            thread.items.push(item);
        }
    }
}

/// Insert `item` by id if absent, preserving first-seen order. If present,
/// merge in the new non-empty fields without clobbering existing ones the
/// new item leaves blank.
fn upsert_item(thread: &mut ActiveThread, item: ChatItem) {
    match thread.find_item_mut(&item.id) {
        Some(existing) => merge_item(existing, item),
        None => thread.items.push(item),
    }
}

fn merge_item(existing: &mut ChatItem, incoming: ChatItem) {
    existing.kind = incoming.kind;
    if incoming.turn_id.is_some() {
        existing.turn_id = incoming.turn_id;
    }
    if incoming.text.is_some() {
        existing.text = incoming.text;
    }
    if !incoming.summary.is_empty() {
        existing.summary = incoming.summary;
    }
    if !incoming.content.is_empty() {
        existing.content = incoming.content;
    }
    if incoming.command.is_some() {
        existing.command = incoming.command;
    }
    if incoming.cwd.is_some() {
        existing.cwd = incoming.cwd;
    }
    if incoming.output.is_some() {
        existing.output = incoming.output;
    }
    if !incoming.changes.is_empty() {
        existing.changes = incoming.changes;
    }
    if incoming.status.is_some() {
        existing.status = incoming.status;
    }
    if incoming.request_id.is_some() {
        existing.request_id = incoming.request_id;
    }
    if incoming.reason.is_some() {
        existing.reason = incoming.reason;
    }
    if incoming.raw.is_some() {
        existing.raw = incoming.raw;
    }
}

/// Append `delta_text` to the command item's `output`, creating the item
/// if it is missing (tolerates event reordering: output can arrive before
/// `item.started` for the same command).
fn apply_command_output(thread: &mut ActiveThread, item_id: &ItemId, delta_text: &str) {
    match thread.find_item_mut(item_id) {
        Some(item) => {
            let mut output = item.output.take().unwrap_or_default();
            output.push_str(delta_text);
            item.output = Some(output);
        }
        None => {
            let mut item = ChatItem::new(item_id.clone(), ChatItemKind::Command);
            item.output = Some(delta_text.to_owned());
            thread.items.push(item);
        }
    }
}

/// Upsert the single `plan` item for `turn_id`, replacing its text and
/// structured steps wholesale.
fn apply_plan_updated(
    thread: &mut ActiveThread,
    turn_id: &TurnId,
    text: &str,
    plan: &[serde_json::Value],
) {
    let plan_item = thread
        .items
        .iter_mut()
        .find(|item| item.kind == ChatItemKind::Plan && item.turn_id.as_ref() == Some(turn_id));
    match plan_item {
        Some(item) => {
            item.text = Some(text.to_owned());
            item.content = plan.to_vec();
        }
        None => {
            let id = ItemId(format!("plan:{turn_id}"));
            let mut item = ChatItem::new(id, ChatItemKind::Plan);
            item.turn_id = Some(turn_id.clone());
            item.text = Some(text.to_owned());
            item.content = plan.to_vec();
            thread.items.push(item);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_approval_required(
    thread: &mut ActiveThread,
    turn_id: &TurnId,
    item_id: &ItemId,
    request_id: &str,
    reason: &Option<String>,
    command: &Option<String>,
    cwd: &Option<String>,
) {
    let mut item = match thread.find_item_mut(item_id) {
        Some(item) => std::mem::replace(item, ChatItem::new(item_id.clone(), ChatItemKind::Approval)),
        None => ChatItem::new(item_id.clone(), ChatItemKind::Approval),
    };
    item.turn_id = Some(turn_id.clone());
    item.status = Some("pending".to_owned());
    item.request_id = Some(request_id.to_owned());
    item.reason = reason.clone();
    item.command = command.clone();
    item.cwd = cwd.clone();
    upsert_item(thread, item);
}

/// One explicit approval/decline decision, as returned by the approval RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Accept,
    Decline,
}

impl ApprovalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Decline => "decline",
        }
    }
}

/// Set the matching approval item's status to an explicit decision,
/// driven by an RPC result rather than a server event.
pub fn apply_approval_decision(thread: &mut ActiveThread, request_id: &str, decision: ApprovalDecision) {
    apply_approval_status(thread, request_id, decision.as_str());
}

/// Set the matching approval item's status to an arbitrary string,
/// including `"pending"` — used to roll back an optimistic update.
pub fn apply_approval_status(thread: &mut ActiveThread, request_id: &str, status: &str) {
    if let Some(item) = thread
        .items
        .iter_mut()
        .find(|item| item.kind == ChatItemKind::Approval && item.request_id.as_deref() == Some(request_id))
    {
        item.status = Some(status.to_owned());
    }
}

/// Count approval items with no status or an explicit `"pending"` status.
pub fn count_pending_approvals(items: &[ChatItem]) -> usize {
    items
        .iter()
        .filter(|item| {
            item.kind == ChatItemKind::Approval
                && matches!(item.status.as_deref(), None | Some("pending"))
        })
        .count()
}

/// The most recently inserted pending approval, if any.
pub fn pending_approval_from_thread(thread: &ActiveThread) -> Option<&ChatItem> {
    thread
        .items
        .iter()
        .rev()
        .find(|item| item.kind == ChatItemKind::Approval && matches!(item.status.as_deref(), None | Some("pending")))
}

#[cfg(test)]
#[path = "reducer_tests.rs"]
mod tests;
