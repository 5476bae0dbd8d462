//! Key-value storage seam.
//!
//! All durable state lives behind [`KvStore`]: plain string values with optional
//! TTL, string-field hashes, atomic counters, and a best-effort prefix scan.
//! Two backends ship — [`memory::MemoryStore`] for dev and tests, and
//! [`sqlite::SqliteStore`] for single-node deployments. Callers that need a set
//! of keys must not rely on `scan_prefix`; the literature index keeps an
//! explicit manifest instead.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::StoreConfig;

pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    /// Set a value; `ttl_secs` of `None` means the key never expires.
    fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()>;
    fn hash_set(&self, key: &str, fields: &[(&str, &str)]) -> Result<()>;
    fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>>;
    /// Atomic increment; missing keys start from zero.
    fn incr(&self, key: &str) -> Result<i64>;
    fn expire(&self, key: &str, ttl_secs: u64) -> Result<()>;
    /// Best-effort: backends without native scans may return an empty list.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;
    fn ping(&self) -> Result<()>;
}

/// Fetch and deserialize a JSON value.
pub fn get_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize and store a JSON value with an optional TTL.
pub fn set_json<T: Serialize>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
    ttl_secs: Option<u64>,
) -> Result<()> {
    store.set(key, &serde_json::to_string(value)?, ttl_secs)
}

/// Open the configured backend.
pub fn open(config: &StoreConfig, db_path: &std::path::Path) -> Result<Arc<dyn KvStore>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(memory::MemoryStore::new())),
        "sqlite" => Ok(Arc::new(sqlite::SqliteStore::open(db_path)?)),
        other => anyhow::bail!("unknown store backend: {other}. Supported: memory, sqlite"),
    }
}

/// Key layout shared by every module touching the store.
pub mod keys {
    pub const LIT_INDEX_ALL: &str = "lit:index:all";

    pub fn user(user_id: &str) -> String {
        format!("user:{user_id}")
    }

    pub fn session(session_id: &str) -> String {
        format!("session:{session_id}")
    }

    pub fn memory(user_id: &str) -> String {
        format!("memory:{user_id}")
    }

    pub fn number_to_user(number: &str) -> String {
        format!("number_to_user:{number}")
    }

    /// `name` must already be normalized (collapsed, uppercased).
    pub fn name_to_user(name: &str) -> String {
        format!("name_to_user:{name}")
    }

    pub fn idcode_to_user(code: &str) -> String {
        format!("idcode_to_user:{code}")
    }

    pub fn lit_doc(doc_id: &str) -> String {
        format!("lit:doc:{doc_id}")
    }

    pub fn lit_chunk(chunk_id: &str) -> String {
        format!("lit:chunk:{chunk_id}")
    }

    pub fn lit_chunks(doc_id: &str) -> String {
        format!("lit:chunks:{doc_id}")
    }

    pub fn rate(ip: &str) -> String {
        format!("rate:{ip}")
    }
}
