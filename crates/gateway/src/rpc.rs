// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed RPC wrappers (C4) over [`crate::transport::Transport`].
//!
//! One method per gateway operation, matching the reference's
//! `transport/handler.rs` convention of a method-per-operation wrapper
//! rather than a single generic `call` exposed to callers. Wire parameter
//! and result field names are already snake_case in this protocol, so the
//! wrapper structs need no `rename_all` — they exist purely to give each
//! call a typed signature instead of raw `serde_json::Value`.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::chat::model::{ChatId, ThreadId, ThreadSummary, TurnId};
use crate::error::GatewayError;
use crate::transport::{Transport, Unsubscribe};

/// Thin typed façade over a [`Transport`]. Multiple `RpcClient`s may share
/// one transport (e.g. the coordinator and a diagnostics panel both
/// holding an `Arc`).
#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<Transport>,
}

impl RpcClient {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    async fn call<P, R>(&self, method: &str, params: Option<P>) -> Result<R, GatewayError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params_value = match params {
            Some(p) => Some(
                serde_json::to_value(p)
                    .map_err(|e| GatewayError::SerializationFailure(e.to_string()))?,
            ),
            None => None,
        };
        let result = self.transport.call(method, params_value).await?;
        serde_json::from_value(result)
            .map_err(|e| GatewayError::ProtocolMalformed(e.to_string()))
    }

    /// Subscribe to the `chat.*` event family. Fire-and-forget from the
    /// caller's perspective beyond confirming the server accepted it.
    pub async fn subscribe_events(&self, topics: Vec<String>) -> Result<(), GatewayError> {
        #[derive(Serialize)]
        struct Params {
            topics: Vec<String>,
        }
        let _: serde_json::Value = self.call("events.subscribe", Some(Params { topics })).await?;
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<ThreadSummary>, GatewayError> {
        self.call("chat.list", None::<()>).await
    }

    pub async fn create(&self) -> Result<ThreadSummary, GatewayError> {
        self.call("chat.create", None::<()>).await
    }

    pub async fn read_thread(
        &self,
        chat_id: &ChatId,
        thread_id: &ThreadId,
        include_turns: bool,
    ) -> Result<ReadThreadResult, GatewayError> {
        #[derive(Serialize)]
        struct Params<'a> {
            chat_id: &'a ChatId,
            thread_id: &'a ThreadId,
            include_turns: bool,
        }
        self.call("chat.thread.read", Some(Params { chat_id, thread_id, include_turns })).await
    }

    pub async fn send_message(
        &self,
        params: SendMessageParams,
    ) -> Result<SendMessageResult, GatewayError> {
        self.call("chat.message.send", Some(params)).await
    }

    pub async fn cancel(&self, chat_id: &ChatId, turn_id: &TurnId) -> Result<(), GatewayError> {
        #[derive(Serialize)]
        struct Params<'a> {
            chat_id: &'a ChatId,
            turn_id: &'a TurnId,
        }
        let _: serde_json::Value = self.call("chat.cancel", Some(Params { chat_id, turn_id })).await?;
        Ok(())
    }

    pub async fn rename_thread(&self, chat_id: &ChatId, title: &str) -> Result<(), GatewayError> {
        #[derive(Serialize)]
        struct Params<'a> {
            chat_id: &'a ChatId,
            title: &'a str,
        }
        let _: serde_json::Value =
            self.call("chat.thread.rename", Some(Params { chat_id, title })).await?;
        Ok(())
    }

    pub async fn archive_thread(&self, chat_id: &ChatId) -> Result<(), GatewayError> {
        #[derive(Serialize)]
        struct Params<'a> {
            chat_id: &'a ChatId,
        }
        let _: serde_json::Value =
            self.call("chat.thread.archive", Some(Params { chat_id })).await?;
        Ok(())
    }

    pub async fn respond_approval(
        &self,
        params: RespondApprovalParams,
    ) -> Result<RespondApprovalResult, GatewayError> {
        self.call("chat.approval.respond", Some(params)).await
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, GatewayError> {
        self.call("chat.model.list", None::<()>).await
    }

    pub async fn list_collaboration_modes(&self) -> Result<Vec<CollaborationMode>, GatewayError> {
        self.call("chat.collaboration.mode.list", None::<()>).await
    }

    pub async fn list_skills(&self) -> Result<Vec<SkillInfo>, GatewayError> {
        self.call("chat.skills.list", None::<()>).await
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>, GatewayError> {
        self.call("chat.tools.list", None::<()>).await
    }

    pub async fn list_accounts(&self) -> Result<Vec<AccountInfo>, GatewayError> {
        self.call("chat.account.list", None::<()>).await
    }

    pub async fn read_account(&self, account_id: &str) -> Result<AccountInfo, GatewayError> {
        #[derive(Serialize)]
        struct Params<'a> {
            account_id: &'a str,
        }
        self.call("chat.account.read", Some(Params { account_id })).await
    }

    /// Begin an interactive account login (device-code style); the result
    /// carries a `login_id` to pass to [`Self::poll_account_login`].
    pub async fn start_account_login(&self) -> Result<AccountLoginStart, GatewayError> {
        self.call("chat.account.login_start", None::<()>).await
    }

    pub async fn poll_account_login(
        &self,
        login_id: &str,
    ) -> Result<AccountLoginStatus, GatewayError> {
        #[derive(Serialize)]
        struct Params<'a> {
            login_id: &'a str,
        }
        self.call("chat.account.login_poll", Some(Params { login_id })).await
    }

    pub async fn update_settings(
        &self,
        params: SettingsUpdateParams,
    ) -> Result<(), GatewayError> {
        let _: serde_json::Value = self.call("chat.settings.update", Some(params)).await?;
        Ok(())
    }

    pub async fn search_files(
        &self,
        chat_id: &ChatId,
        query: &str,
    ) -> Result<Vec<FileSearchResult>, GatewayError> {
        #[derive(Serialize)]
        struct Params<'a> {
            chat_id: &'a ChatId,
            query: &'a str,
        }
        self.call("chat.files.search", Some(Params { chat_id, query })).await
    }

    // --- terminal.* pass-through wrappers -----------------------------
    //
    // The terminal subsystem's internals are out of scope (spec.md §1),
    // but its RPC surface is still part of the gateway contract the
    // coordinator may drive (e.g. attaching a terminal panel alongside
    // chat). `-32601` on any of these is a soft "unsupported", not an
    // error — callers should check `GatewayError::is_method_not_found`.

    pub async fn terminal_session_list(&self) -> Result<Vec<TerminalSession>, GatewayError> {
        self.call("terminal.session.list", None::<()>).await
    }

    pub async fn terminal_session_attach(&self, session_id: &str) -> Result<(), GatewayError> {
        #[derive(Serialize)]
        struct Params<'a> {
            session_id: &'a str,
        }
        let _: serde_json::Value =
            self.call("terminal.session.attach", Some(Params { session_id })).await?;
        Ok(())
    }

    pub async fn terminal_session_input(
        &self,
        session_id: &str,
        data: &str,
    ) -> Result<(), GatewayError> {
        #[derive(Serialize)]
        struct Params<'a> {
            session_id: &'a str,
            data: &'a str,
        }
        let _: serde_json::Value =
            self.call("terminal.session.input", Some(Params { session_id, data })).await?;
        Ok(())
    }

    pub async fn terminal_session_resize(
        &self,
        session_id: &str,
        cols: u16,
        rows: u16,
    ) -> Result<(), GatewayError> {
        #[derive(Serialize)]
        struct Params<'a> {
            session_id: &'a str,
            cols: u16,
            rows: u16,
        }
        let _: serde_json::Value =
            self.call("terminal.session.resize", Some(Params { session_id, cols, rows })).await?;
        Ok(())
    }

    /// Per spec.md §9's Open Question: when the server's JSON omits both
    /// `supported` and `sessions`, this resolves to "unsupported"
    /// (`supported: false, sessions: []`) via `serde(default)`.
    pub async fn terminal_tmux_list(&self) -> Result<TmuxListResult, GatewayError> {
        self.call("terminal.tmux.list", None::<()>).await
    }

    /// Subscribe to fire-and-forget server events; thin re-export so
    /// callers don't need to reach into [`Self::transport`] directly.
    pub fn on_event(&self) -> (tokio::sync::broadcast::Receiver<crate::protocol::RpcEvent>, Unsubscribe) {
        self.transport.on_event()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadThreadResult {
    pub summary: ThreadSummary,
    #[serde(default)]
    pub items: Vec<crate::chat::model::ChatItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendMessageParams {
    pub chat_id: ChatId,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collaboration_mode: Option<String>,
    /// Set when a turn is already running for this chat: queues this
    /// message to run after the in-flight turn rather than rejecting it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inject: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageResult {
    pub turn_id: TurnId,
}

#[derive(Debug, Clone, Serialize)]
pub struct RespondApprovalParams {
    #[serde(rename = "codex_request_id")]
    pub request_id: String,
    /// `"accept"` or `"decline"`.
    pub decision: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RespondApprovalResult {
    #[serde(default)]
    pub ok: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub context_window: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollaborationMode {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkillInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountLoginStart {
    pub login_id: String,
    #[serde(default)]
    pub verification_url: Option<String>,
    #[serde(default)]
    pub user_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountLoginStatus {
    /// `"pending"`, `"complete"`, or `"failed"`.
    pub status: String,
    #[serde(default)]
    pub account: Option<AccountInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettingsUpdateParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attached_folder: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileSearchResult {
    pub path: String,
    #[serde(default)]
    pub preview: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerminalSession {
    pub session_id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmuxListResult {
    #[serde(default)]
    pub supported: bool,
    #[serde(default)]
    pub sessions: Vec<TmuxSession>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmuxSession {
    pub name: String,
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
