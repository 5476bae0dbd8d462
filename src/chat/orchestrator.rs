//! Turn orchestration: session load, identity handshake, literature
//! retrieval, model call, and the post-turn bookkeeping writes.

use std::sync::Arc;

use serde::Serialize;

use crate::auth::handshake::{self, HandshakeOutcome};
use crate::chat::guardrails;
use crate::config::{RetrievalConfig, SessionConfig};
use crate::error::ApiError;
use crate::lit::search;
use crate::profile::{self, UserMemory};
use crate::providers::{ChatModel, Embedder};
use crate::session::{self, Session};
use crate::store::KvStore;
use crate::users;

/// Canned reply when the model is unavailable or errors out. The turn still
/// completes: history, memory, and TTL updates all happen as usual.
pub const FALLBACK_REPLY: &str = "Sorry, I had trouble responding.";

const LIT_TRIGGERS: &[&str] = &[
    "step",
    "sponsor",
    "literature",
    "basic text",
    "just for today",
    "swg",
    "jft",
    "higher power",
    "inventory",
    "amends",
    "relapse",
    "clean time",
];

#[derive(Debug, Clone, Serialize)]
pub struct MemoryDelta {
    pub last_topics: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnReply {
    pub reply: String,
    pub memory_delta: MemoryDelta,
}

pub struct ChatEngine {
    pub store: Arc<dyn KvStore>,
    pub model: Option<Arc<dyn ChatModel>>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub policy: String,
    pub session_cfg: SessionConfig,
    pub retrieval_cfg: RetrievalConfig,
}

/// Does this message look like it's asking about programme literature?
pub fn is_literature_query(message: &str) -> bool {
    let lower = message.to_lowercase();
    LIT_TRIGGERS.iter().any(|t| lower.contains(t))
}

impl ChatEngine {
    /// Run one conversational turn end to end.
    pub async fn handle_turn(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<TurnReply, ApiError> {
        let mut sess = session::load_session(self.store.as_ref(), session_id)?
            .ok_or(ApiError::BadSession)?;

        // Identity handshake consumes the utterance entirely: no retrieval,
        // no model call, no history append, no memory write. The utterance
        // may be a passphrase and must never reach a durable record; only
        // the identity sub-state is persisted (with the usual TTL refresh).
        if let HandshakeOutcome::Reply(reply) =
            handshake::run(&mut sess, message, self.store.as_ref())?
        {
            session::save_session(
                self.store.as_ref(),
                session_id,
                &sess,
                self.session_cfg.ttl_secs,
            )?;
            return Ok(TurnReply {
                reply,
                memory_delta: MemoryDelta { last_topics: None },
            });
        }

        let profile_map = if sess.user_id == "guest" {
            Default::default()
        } else {
            users::get_profile(self.store.as_ref(), &sess.user_id)?
        };
        let memory = if sess.user_id == "guest" {
            UserMemory::default()
        } else {
            profile::load_memory(self.store.as_ref(), &sess.user_id)?
        };

        let mut system_prompt = guardrails::build_system_prompt(&self.policy, &profile_map, &memory);

        // Retrieval failures are swallowed: a broken index must not break chat.
        if is_literature_query(message) {
            match search::search(
                self.store.as_ref(),
                self.embedder.as_deref(),
                message,
                self.retrieval_cfg.top_k,
            )
            .await
            {
                Ok(snippets) if !snippets.is_empty() => {
                    system_prompt.push_str("\n\n");
                    system_prompt.push_str(&search::build_context(&snippets));
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "literature retrieval failed"),
            }
        }

        let reply = match &self.model {
            Some(model) => match model.complete(&system_prompt, &sess.history, message).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "model call failed");
                    FALLBACK_REPLY.to_string()
                }
            },
            None => FALLBACK_REPLY.to_string(),
        };

        self.finish_turn(session_id, sess, message, reply).await
    }

    /// Post-turn bookkeeping for ordinary chat turns.
    async fn finish_turn(
        &self,
        session_id: &str,
        mut sess: Session,
        message: &str,
        reply: String,
    ) -> Result<TurnReply, ApiError> {
        sess.push_turn(message, &reply, self.session_cfg.history_cap);
        session::save_session(
            self.store.as_ref(),
            session_id,
            &sess,
            self.session_cfg.ttl_secs,
        )?;

        let mut delta = MemoryDelta { last_topics: None };
        if sess.user_id != "guest" {
            let mut memory = profile::load_memory(self.store.as_ref(), &sess.user_id)?;
            memory.record_contact(message);
            delta.last_topics = memory.last_topics.clone();
            profile::save_memory(self.store.as_ref(), &sess.user_id, &memory)?;
            users::touch_last_seen(self.store.as_ref(), &sess.user_id)?;
        }

        Ok(TurnReply {
            reply,
            memory_delta: delta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literature_triggers() {
        assert!(is_literature_query("what does the Basic Text say?"));
        assert!(is_literature_query("I'm working STEP four"));
        assert!(is_literature_query("thinking about making amends"));
        assert!(!is_literature_query("how was your day"));
    }
}
