//! Cairn — a recovery-support conversational backend.
//!
//! Cairn serves a phone- and web-facing assistant for people in addiction
//! recovery. Callers are recognized by contact number, can verify their
//! identity with a spoken passphrase, and get replies grounded in approved
//! programme literature retrieved from a local index.
//!
//! # Architecture
//!
//! - **Storage**: every durable value lives behind the [`store::KvStore`]
//!   seam — an in-memory backend for dev and tests, SQLite for deployments
//! - **Identity**: scrypt-hashed passphrases with a three-strike in-chat
//!   handshake ([`auth`])
//! - **Retrieval**: literature chunked into fixed word windows, ranked by
//!   embedding similarity or keyword overlap ([`lit`])
//! - **Conversation**: per-turn orchestration of handshake, retrieval, model
//!   call, and memory writes ([`chat`])
//! - **Transport**: axum HTTP API under `/v2` ([`server`])
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`store`] — Key-value storage seam and its two backends
//! - [`auth`] — Passphrase normalization, credentials, and the identity handshake
//! - [`users`] — User directory and reverse lookups
//! - [`session`] — Conversation sessions with TTL and capped history
//! - [`profile`] — Durable per-user memory: profile facts and notes
//! - [`lit`] — Literature indexing and retrieval ranking
//! - [`chat`] — Guardrail policy and the turn orchestrator
//! - [`providers`] — Chat-model and embedding providers
//! - [`server`] — HTTP surface

pub mod auth;
pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod lit;
pub mod profile;
pub mod providers;
pub mod rate_limit;
pub mod server;
pub mod session;
pub mod store;
pub mod users;
