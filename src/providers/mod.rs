//! External model collaborators.
//!
//! [`ChatModel`] and [`Embedder`] are the only seams through which the core
//! talks to language-model services. Wire shapes are normalized inside the
//! provider implementations; callers see `String` replies and `Vec<f32>`
//! vectors or an error, nothing else. Both providers are optional at runtime —
//! the orchestrator falls back to a fixed reply, retrieval falls back to
//! keyword scoring.

pub mod openai;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{CairnConfig, EmbeddingConfig, ModelConfig};
use crate::session::ChatMessage;

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Produce a reply to `user_message` given the system prompt and prior
    /// turns. Must be bounded by a timeout; failures surface as errors.
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        user_message: &str,
    ) -> Result<String>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Build the configured chat model, or `None` when no API key is set.
pub fn create_chat_model(config: &ModelConfig) -> Result<Option<Arc<dyn ChatModel>>> {
    if config.api_key.is_empty() {
        tracing::warn!("no model API key configured — chat replies will fall back");
        return Ok(None);
    }
    Ok(Some(Arc::new(openai::OpenAiClient::new(config)?)))
}

/// Build the configured embedder, or `None` when disabled or keyless.
pub fn create_embedder(
    config: &CairnConfig,
) -> Result<Option<Arc<dyn Embedder>>> {
    if !config.embedding.enabled || config.model.api_key.is_empty() {
        tracing::info!("embeddings disabled — retrieval will use keyword scoring");
        return Ok(None);
    }
    let EmbeddingConfig { model, .. } = &config.embedding;
    Ok(Some(Arc::new(openai::OpenAiClient::with_embed_model(
        &config.model,
        model,
    )?)))
}
