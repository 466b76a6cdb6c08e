use super::*;
use crate::chat::mapper::MappedEvent;
use crate::chat::model::{ActiveThread, ChatId, ChatItemKind, ItemId, ThreadId, TurnId};
use chrono::Utc;

fn thread() -> ActiveThread {
    ActiveThread::new(ChatId::from("c1"), ThreadId::from("t1"), "untitled".to_owned())
}

#[test]
fn turn_started_sets_running_and_active_turn() {
    let mut t = thread();
    apply(
        &mut t,
        &MappedEvent::TurnStarted {
            chat_id: t.chat_id.clone(),
            thread_id: t.thread_id.clone(),
            turn_id: TurnId::from("u1"),
            activity_at: Utc::now(),
        },
    );
    assert!(t.running);
    assert_eq!(t.active_turn_id, Some(TurnId::from("u1")));
}

#[test]
fn turn_completed_clears_active_turn_only_if_it_matches() {
    let mut t = thread();
    t.running = true;
    t.active_turn_id = Some(TurnId::from("u1"));
    apply(
        &mut t,
        &MappedEvent::TurnCompleted {
            chat_id: t.chat_id.clone(),
            thread_id: t.thread_id.clone(),
            turn_id: TurnId::from("u2"),
            activity_at: Utc::now(),
        },
    );
    assert!(!t.running);
    assert_eq!(t.active_turn_id, Some(TurnId::from("u1")), "mismatched turn id must not clear it");

    apply(
        &mut t,
        &MappedEvent::TurnCompleted {
            chat_id: t.chat_id.clone(),
            thread_id: t.thread_id.clone(),
            turn_id: TurnId::from("u1"),
            activity_at: Utc::now(),
        },
    );
    assert_eq!(t.active_turn_id, None);
}

/// S4 — delta coalescing: two deltas for the same `(turnId,itemId)` collapse
/// into one assistant item whose `text` is the buffer's full value.
#[test]
fn message_delta_coalesces_into_one_assistant_item() {
    let mut t = thread();
    let turn_id = TurnId::from("u1");
    let item_id = ItemId::from("m1");
    apply(
        &mut t,
        &MappedEvent::MessageDelta {
            chat_id: t.chat_id.clone(),
            thread_id: t.thread_id.clone(),
            turn_id: turn_id.clone(),
            item_id: Some(item_id.clone()),
            text: "Hel".to_owned(),
        },
    );
    apply(
        &mut t,
        &MappedEvent::MessageDelta {
            chat_id: t.chat_id.clone(),
            thread_id: t.thread_id.clone(),
            turn_id: turn_id.clone(),
            item_id: Some(item_id.clone()),
            text: "Hello!".to_owned(),
        },
    );
    let assistant_items: Vec<_> =
        t.items.iter().filter(|i| i.kind == ChatItemKind::Assistant).collect();
    assert_eq!(assistant_items.len(), 1, "deltas must collapse to a single item, not duplicate");
    assert_eq!(assistant_items[0].text.as_deref(), Some("Hello!"));
}

#[test]
fn message_delta_without_item_id_uses_the_turn_id_as_a_synthesized_slot() {
    let mut t = thread();
    let turn_id = TurnId::from("u1");
    apply(
        &mut t,
        &MappedEvent::MessageDelta {
            chat_id: t.chat_id.clone(),
            thread_id: t.thread_id.clone(),
            turn_id: turn_id.clone(),
            item_id: None,
            text: "hi".to_owned(),
        },
    );
    assert_eq!(t.items.len(), 1);
    assert_eq!(t.items[0].id, ItemId::from("u1"));
}

#[test]
fn item_started_then_completed_never_duplicates_the_id() {
    let mut t = thread();
    let mut item = crate::chat::model::ChatItem::new(ItemId::from("i1"), ChatItemKind::Command);
    item.turn_id = Some(TurnId::from("u1"));
    item.command = Some("ls".to_owned());
    apply(
        &mut t,
        &MappedEvent::ItemStarted {
            chat_id: t.chat_id.clone(),
            thread_id: t.thread_id.clone(),
            turn_id: TurnId::from("u1"),
            item: item.clone(),
        },
    );
    let mut completed = item.clone();
    completed.status = Some("completed".to_owned());
    completed.output = Some("total 0".to_owned());
    apply(
        &mut t,
        &MappedEvent::ItemCompleted {
            chat_id: t.chat_id.clone(),
            thread_id: t.thread_id.clone(),
            turn_id: TurnId::from("u1"),
            item: completed,
        },
    );
    assert_eq!(t.items.len(), 1, "item.completed must update in place, never duplicate");
    assert_eq!(t.items[0].status.as_deref(), Some("completed"));
    assert_eq!(t.items[0].output.as_deref(), Some("total 0"));
    assert_eq!(t.items[0].command.as_deref(), Some("ls"), "untouched fields survive the merge");
}

#[test]
fn command_output_tolerates_reordering_by_creating_the_item() {
    let mut t = thread();
    apply(
        &mut t,
        &MappedEvent::CommandOutput {
            chat_id: t.chat_id.clone(),
            thread_id: t.thread_id.clone(),
            turn_id: TurnId::from("u1"),
            item_id: ItemId::from("i1"),
            delta_text: "hello ".to_owned(),
        },
    );
    apply(
        &mut t,
        &MappedEvent::CommandOutput {
            chat_id: t.chat_id.clone(),
            thread_id: t.thread_id.clone(),
            turn_id: TurnId::from("u1"),
            item_id: ItemId::from("i1"),
            delta_text: "world".to_owned(),
        },
    );
    assert_eq!(t.items.len(), 1);
    assert_eq!(t.items[0].output.as_deref(), Some("hello world"));
}

#[test]
fn plan_updated_upserts_a_single_item_per_turn() {
    let mut t = thread();
    apply(
        &mut t,
        &MappedEvent::PlanUpdated {
            chat_id: t.chat_id.clone(),
            thread_id: t.thread_id.clone(),
            turn_id: TurnId::from("u1"),
            text: "step 1".to_owned(),
            plan: vec![serde_json::json!({"step": "one"})],
        },
    );
    apply(
        &mut t,
        &MappedEvent::PlanUpdated {
            chat_id: t.chat_id.clone(),
            thread_id: t.thread_id.clone(),
            turn_id: TurnId::from("u1"),
            text: "step 1, step 2".to_owned(),
            plan: vec![serde_json::json!({"step": "one"}), serde_json::json!({"step": "two"})],
        },
    );
    let plans: Vec<_> = t.items.iter().filter(|i| i.kind == ChatItemKind::Plan).collect();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].text.as_deref(), Some("step 1, step 2"));
    assert_eq!(plans[0].content.len(), 2);
}

/// S3 — approval lifecycle: required → respond(accept) → zero pending.
#[test]
fn approval_lifecycle_accept_clears_pending_count() {
    let mut t = thread();
    apply(
        &mut t,
        &MappedEvent::ApprovalRequired {
            chat_id: t.chat_id.clone(),
            thread_id: t.thread_id.clone(),
            turn_id: TurnId::from("u1"),
            item_id: ItemId::from("a1"),
            request_id: "42".to_owned(),
            reason: Some("needs shell".to_owned()),
            command: Some("rm -rf".to_owned()),
            cwd: Some("/tmp".to_owned()),
        },
    );
    assert_eq!(count_pending_approvals(&t.items), 1);
    assert_eq!(pending_approval_from_thread(&t).unwrap().request_id.as_deref(), Some("42"));

    apply_approval_decision(&mut t, "42", ApprovalDecision::Accept);
    assert_eq!(count_pending_approvals(&t.items), 0);
    let approval = t.items.iter().find(|i| i.kind == ChatItemKind::Approval).unwrap();
    assert_eq!(approval.status.as_deref(), Some("accept"));
}

#[test]
fn approval_status_rolls_back_to_pending_on_failure() {
    let mut t = thread();
    apply(
        &mut t,
        &MappedEvent::ApprovalRequired {
            chat_id: t.chat_id.clone(),
            thread_id: t.thread_id.clone(),
            turn_id: TurnId::from("u1"),
            item_id: ItemId::from("a1"),
            request_id: "42".to_owned(),
            reason: None,
            command: None,
            cwd: None,
        },
    );
    apply_approval_status(&mut t, "42", "decline");
    assert_eq!(count_pending_approvals(&t.items), 0);
    apply_approval_status(&mut t, "42", "pending");
    assert_eq!(count_pending_approvals(&t.items), 1, "rollback to pending must be tolerated");
}

#[test]
fn tokens_usage_event_does_not_touch_items() {
    let mut t = thread();
    let before = t.items.clone();
    apply(
        &mut t,
        &MappedEvent::TokensUsage {
            chat_id: t.chat_id.clone(),
            usage: crate::chat::model::TokenCounts::default(),
            model_context_window: None,
        },
    );
    assert_eq!(t.items, before);
}

/// Invariant 5 — replaying a fully observed event log yields the same final
/// thread state as processing it once, given matching buffer state.
#[test]
fn replaying_the_same_event_log_is_idempotent() {
    let events = vec![
        MappedEvent::TurnStarted {
            chat_id: ChatId::from("c1"),
            thread_id: ThreadId::from("t1"),
            turn_id: TurnId::from("u1"),
            activity_at: Utc::now(),
        },
        MappedEvent::MessageDelta {
            chat_id: ChatId::from("c1"),
            thread_id: ThreadId::from("t1"),
            turn_id: TurnId::from("u1"),
            item_id: Some(ItemId::from("m1")),
            text: "Hello!".to_owned(),
        },
        MappedEvent::TurnCompleted {
            chat_id: ChatId::from("c1"),
            thread_id: ThreadId::from("t1"),
            turn_id: TurnId::from("u1"),
            activity_at: Utc::now(),
        },
    ];

    let mut once = thread();
    for e in &events {
        apply(&mut once, e);
    }

    let mut replayed = thread();
    for e in &events {
        apply(&mut replayed, e);
    }
    for e in &events {
        apply(&mut replayed, e);
    }

    assert_eq!(once, replayed);
}

/// Invariant 1 — every item id stays unique within the thread regardless of
/// how many start/complete/output events reference it.
#[test]
fn item_ids_stay_unique_across_many_updates() {
    let mut t = thread();
    for i in 0..5 {
        let mut item = crate::chat::model::ChatItem::new(ItemId::from("i1"), ChatItemKind::Tool);
        item.text = Some(format!("update {i}"));
        apply(
            &mut t,
            &MappedEvent::ItemStarted {
                chat_id: t.chat_id.clone(),
                thread_id: t.thread_id.clone(),
                turn_id: TurnId::from("u1"),
                item,
            },
        );
    }
    assert_eq!(t.items.len(), 1);
}
