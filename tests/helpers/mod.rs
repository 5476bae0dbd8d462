#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use cairn::chat::ChatEngine;
use cairn::config::{RetrievalConfig, SessionConfig};
use cairn::providers::{ChatModel, Embedder};
use cairn::session::{self, ChatMessage, Session};
use cairn::store::memory::MemoryStore;
use cairn::store::KvStore;
use cairn::users::{self, UserUpsert};

/// Chat model that always answers with a fixed line.
pub struct ScriptedModel(pub String);

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(
        &self,
        _system_prompt: &str,
        _history: &[ChatMessage],
        _user_message: &str,
    ) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}

/// Deterministic embedder: a spike whose position depends on the text bytes.
/// Identical texts embed identically; different texts usually differ.
pub struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 16];
                let spike = t.bytes().map(|b| b as usize).sum::<usize>() % 16;
                v[spike] = 1.0;
                v
            })
            .collect())
    }
}

/// Fresh in-memory engine with a scripted model reply.
pub fn test_engine(store: Arc<MemoryStore>, reply: &str) -> ChatEngine {
    ChatEngine {
        store,
        model: Some(Arc::new(ScriptedModel(reply.to_string()))),
        embedder: None,
        policy: cairn::chat::guardrails::DEFAULT_POLICY.to_string(),
        session_cfg: SessionConfig::default(),
        retrieval_cfg: RetrievalConfig::default(),
    }
}

/// Engine with no model configured — replies fall back.
pub fn modelless_engine(store: Arc<MemoryStore>) -> ChatEngine {
    ChatEngine {
        store,
        model: None,
        embedder: None,
        policy: cairn::chat::guardrails::DEFAULT_POLICY.to_string(),
        session_cfg: SessionConfig::default(),
        retrieval_cfg: RetrievalConfig::default(),
    }
}

/// Register a user with a passphrase; returns the user id.
pub fn seed_user(store: &dyn KvStore, name: &str, number: &str, passphrase: &str) -> String {
    let (user_id, _) = users::upsert_user(
        store,
        &UserUpsert {
            name: name.to_string(),
            display_name: Some(name.to_string()),
            number: Some(number.to_string()),
            id_code: None,
            passphrase: Some(passphrase.to_string()),
        },
    )
    .unwrap();
    user_id
}

/// Mint and persist a session for `user_id`; returns the session id.
pub fn seed_session(store: &dyn KvStore, user_id: &str) -> String {
    let session_id = session::new_session_id();
    let sess = Session::new(user_id, 3600);
    session::save_session(store, &session_id, &sess, 3600).unwrap();
    session_id
}

/// Literature fixture: two source documents, one with a form-feed page break.
pub fn seed_lit_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("step-working-guides.txt"),
        "We admitted that we were powerless over our addiction. \
         The first step asks for honesty about where we stand.\u{0C}\
         Step two invites us to believe that recovery is possible \
         with help from a power greater than ourselves.",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("just-for-today.md"),
        "Just for today my thoughts will be on my recovery, \
         living and enjoying life without the use of drugs.",
    )
    .unwrap();
    dir
}
