// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key/value store collaborator and the key names the coordinator uses to
//! persist user-facing overrides across restarts.
//!
//! Local persistence of full chat transcripts is explicitly out of scope;
//! this trait only ever stores a small set of user overrides: last active
//! chat, title overrides, and per-chat settings.

use async_trait::async_trait;

/// Injected key/value collaborator. Implementations may back this with
/// local storage, a mobile platform's secure storage, or `localStorage` on
/// web — the coordinator only ever sees this trait.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Option<String>;
    async fn set_item(&self, key: &str, value: &str);
    async fn remove_item(&self, key: &str);
}

/// Build the `homie.mobile.last_active_chat:<urlenc>` key for a gateway URL.
pub fn last_active_chat_key(gateway_url: &str) -> String {
    format!("homie.mobile.last_active_chat:{}", urlencode(gateway_url))
}

pub const GATEWAY_TARGET_URL_KEY: &str = "homie.mobile.gateway_target_url";
pub const SELECTED_MODEL_KEY: &str = "homie.mobile.selected_model";
pub const SELECTED_EFFORT_KEY: &str = "homie.mobile.selected_effort";

/// `homie-chat-overrides:<ns>` — user-edited thread title overrides,
/// JSON-serialized `HashMap<ChatId, String>`.
pub fn overrides_key(namespace: &str) -> String {
    format!("homie-chat-overrides:{namespace}")
}

/// `homie-chat-settings:<ns>` — per-chat settings (model, effort,
/// permission mode, agent mode, attached folder), JSON-serialized.
pub fn settings_key(namespace: &str) -> String {
    format!("homie-chat-settings:{namespace}")
}

/// Minimal percent-encoding sufficient for embedding a URL in a storage key.
/// Only characters unsafe in a key (`:`, `/`) plus the usual reserved set
/// are escaped; this mirrors `urlencoding`'s behavior for the small
/// character set actually present in `ws://`/`wss://` URLs.
fn urlencode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
#[path = "kv_tests.rs"]
mod tests;
