//! Session state: the TTL-bound conversational context.
//!
//! A session ties a user to an in-progress exchange. It carries the bounded
//! turn history and the identity-handshake sub-state, and its TTL is refreshed
//! on every mutation — an idle session expires out of the store on its own.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::store::{self, keys, KvStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Interaction mode for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Text,
    Voice,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "voice" => Ok(Self::Voice),
            _ => Err(format!("unknown session mode: {s}")),
        }
    }
}

/// Identity handshake stage within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStage {
    #[default]
    None,
    AwaitPass,
}

/// Handshake sub-state: candidate under challenge plus the retry counter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityState {
    #[serde(default)]
    pub stage: IdentityStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
    #[serde(default)]
    pub retries: u8,
}

impl IdentityState {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub mode: Mode,
    pub created_at: String,
    pub expires_at: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub identity: IdentityState,
}

impl Session {
    pub fn new(user_id: impl Into<String>, ttl_secs: u64) -> Self {
        let now = chrono::Utc::now();
        Self {
            user_id: user_id.into(),
            mode: Mode::Text,
            created_at: now.to_rfc3339(),
            expires_at: (now + chrono::Duration::seconds(ttl_secs as i64)).to_rfc3339(),
            history: Vec::new(),
            identity: IdentityState::default(),
        }
    }

    /// Append a user/assistant pair and truncate to the newest `cap` entries.
    pub fn push_turn(&mut self, user_msg: &str, assistant_msg: &str, cap: usize) {
        self.history.push(ChatMessage::user(user_msg));
        self.history.push(ChatMessage::assistant(assistant_msg));
        if self.history.len() > cap {
            self.history.drain(..self.history.len() - cap);
        }
    }
}

pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn load_session(store: &dyn KvStore, session_id: &str) -> Result<Option<Session>> {
    store::get_json(store, &keys::session(session_id))
}

/// Persist a session, refreshing its TTL.
pub fn save_session(
    store: &dyn KvStore,
    session_id: &str,
    session: &Session,
    ttl_secs: u64,
) -> Result<()> {
    store::set_json(store, &keys::session(session_id), session, Some(ttl_secs))
}
