//! SQLite store backend for single-node deployments.
//!
//! Two tables: `kv` for plain values (with an optional unix-seconds expiry)
//! and `kv_hash` for string-field hashes. Expiry is enforced lazily — expired
//! rows are treated as absent on read and overwritten on write.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use super::KvStore;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at the given path, with schema initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;

        // WAL for better concurrent read behavior
        conn.pragma_update(None, "journal_mode", "WAL")?;
        init_schema(&conn).context("failed to initialize schema")?;

        tracing::info!(path = %path.display(), "sqlite store ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {e}"))
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv (
            key        TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            expires_at INTEGER
        );
        CREATE TABLE IF NOT EXISTS kv_hash (
            key   TEXT NOT NULL,
            field TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (key, field)
        );",
    )?;
    Ok(())
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let row: Option<(String, Option<i64>)> = conn
            .query_row(
                "SELECT value, expires_at FROM kv WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(match row {
            Some((_, Some(exp))) if exp <= now_secs() => {
                conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
                None
            }
            Some((value, _)) => Some(value),
            None => None,
        })
    }

    fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()> {
        let expires_at = ttl_secs.map(|s| now_secs() + s as i64);
        self.lock()?.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, expires_at = ?3",
            params![key, value, expires_at],
        )?;
        Ok(())
    }

    fn hash_set(&self, key: &str, fields: &[(&str, &str)]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO kv_hash (key, field, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key, field) DO UPDATE SET value = ?3",
            )?;
            for (field, value) in fields {
                stmt.execute(params![key, field, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT field, value FROM kv_hash WHERE key = ?1")?;
        let rows = stmt
            .query_map(params![key], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().collect())
    }

    fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let row: Option<(String, Option<i64>)> = tx
            .query_row(
                "SELECT value, expires_at FROM kv WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (current, expires_at) = match row {
            Some((_, Some(exp))) if exp <= now_secs() => (0, None),
            Some((value, exp)) => (value.parse::<i64>().unwrap_or(0), exp),
            None => (0, None),
        };
        let next = current + 1;
        tx.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, expires_at = ?3",
            params![key, next.to_string(), expires_at],
        )?;
        tx.commit()?;
        Ok(next)
    }

    fn expire(&self, key: &str, ttl_secs: u64) -> Result<()> {
        self.lock()?.execute(
            "UPDATE kv SET expires_at = ?2 WHERE key = ?1",
            params![key, now_secs() + ttl_secs as i64],
        )?;
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        // Escape LIKE wildcards in the prefix itself
        let pattern = format!(
            "{}%",
            prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
        );
        let mut stmt = conn.prepare(
            "SELECT key FROM kv WHERE key LIKE ?1 ESCAPE '\\'
               AND (expires_at IS NULL OR expires_at > ?2)
             UNION
             SELECT DISTINCT key FROM kv_hash WHERE key LIKE ?1 ESCAPE '\\'
             ORDER BY key",
        )?;
        let keys = stmt
            .query_map(params![pattern, now_secs()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn ping(&self) -> Result<()> {
        self.lock()?
            .query_row("SELECT 1", [], |_| Ok(()))
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn set_get_roundtrip() {
        let store = test_store();
        store.set("k", "v", None).unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn expired_key_is_absent() {
        let store = test_store();
        store.set("k", "v", Some(0)).unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn overwrite_clears_old_ttl() {
        let store = test_store();
        store.set("k", "v1", Some(0)).unwrap();
        store.set("k", "v2", None).unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn hash_fields_merge() {
        let store = test_store();
        store.hash_set("h", &[("name", "Alice"), ("authed", "1")]).unwrap();
        store.hash_set("h", &[("authed", "0")]).unwrap();
        let map = store.hash_get_all("h").unwrap();
        assert_eq!(map.get("name").map(String::as_str), Some("Alice"));
        assert_eq!(map.get("authed").map(String::as_str), Some("0"));
    }

    #[test]
    fn incr_restarts_after_expiry() {
        let store = test_store();
        assert_eq!(store.incr("c").unwrap(), 1);
        assert_eq!(store.incr("c").unwrap(), 2);
        store.expire("c", 0).unwrap();
        assert_eq!(store.incr("c").unwrap(), 1);
    }

    #[test]
    fn scan_prefix_covers_both_tables() {
        let store = test_store();
        store.set("lit:doc:a", "{}", None).unwrap();
        store.hash_set("user:1", &[("name", "A")]).unwrap();
        store.set("other", "x", None).unwrap();
        assert_eq!(store.scan_prefix("lit:doc:").unwrap(), vec!["lit:doc:a"]);
        assert_eq!(store.scan_prefix("user:").unwrap(), vec!["user:1"]);
    }
}
