//! Conversation pipeline: guardrails policy and the turn orchestrator.

pub mod guardrails;
pub mod orchestrator;

pub use orchestrator::{ChatEngine, TurnReply, FALLBACK_REPLY};
