//! In-process store backend for development and tests.
//!
//! Behavioral stand-in for a real key-value service: TTLs are tracked with
//! monotonic deadlines and enforced lazily on read, counters parse in place,
//! hashes merge field-wise.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::KvStore;

enum Entry {
    Value(String),
    Hash(HashMap<String, String>),
}

struct Slot {
    entry: Entry,
    expires_at: Option<Instant>,
}

impl Slot {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|t| Instant::now() >= t)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, Slot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything — test fixture reset.
    pub fn flush(&self) {
        self.slots.lock().unwrap().clear();
    }

    fn with_live_slot<R>(&self, key: &str, f: impl FnOnce(Option<&Slot>) -> R) -> R {
        let mut slots = self.slots.lock().unwrap();
        if slots.get(key).is_some_and(Slot::expired) {
            slots.remove(key);
        }
        f(slots.get(key))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_live_slot(key, |slot| {
            Ok(match slot {
                Some(Slot {
                    entry: Entry::Value(v),
                    ..
                }) => Some(v.clone()),
                _ => None,
            })
        })
    }

    fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()> {
        let expires_at = ttl_secs.map(|s| Instant::now() + Duration::from_secs(s));
        self.slots.lock().unwrap().insert(
            key.to_string(),
            Slot {
                entry: Entry::Value(value.to_string()),
                expires_at,
            },
        );
        Ok(())
    }

    fn hash_set(&self, key: &str, fields: &[(&str, &str)]) -> Result<()> {
        let mut slots = self.slots.lock().unwrap();
        if slots.get(key).is_some_and(Slot::expired) {
            slots.remove(key);
        }
        let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
            entry: Entry::Hash(HashMap::new()),
            expires_at: None,
        });
        match &mut slot.entry {
            Entry::Hash(map) => {
                for (field, value) in fields {
                    map.insert(field.to_string(), value.to_string());
                }
            }
            Entry::Value(_) => anyhow::bail!("hash_set on non-hash key: {key}"),
        }
        Ok(())
    }

    fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        self.with_live_slot(key, |slot| {
            Ok(match slot {
                Some(Slot {
                    entry: Entry::Hash(map),
                    ..
                }) => map.clone(),
                _ => HashMap::new(),
            })
        })
    }

    fn incr(&self, key: &str) -> Result<i64> {
        let mut slots = self.slots.lock().unwrap();
        if slots.get(key).is_some_and(Slot::expired) {
            slots.remove(key);
        }
        let current = match slots.get(key) {
            Some(Slot {
                entry: Entry::Value(v),
                ..
            }) => v.parse::<i64>().unwrap_or(0),
            _ => 0,
        };
        let next = current + 1;
        let expires_at = slots.get(key).and_then(|s| s.expires_at);
        slots.insert(
            key.to_string(),
            Slot {
                entry: Entry::Value(next.to_string()),
                expires_at,
            },
        );
        Ok(next)
    }

    fn expire(&self, key: &str, ttl_secs: u64) -> Result<()> {
        let mut slots = self.slots.lock().unwrap();
        if let Some(slot) = slots.get_mut(key) {
            slot.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let slots = self.slots.lock().unwrap();
        let mut keys: Vec<String> = slots
            .iter()
            .filter(|(k, slot)| k.starts_with(prefix) && !slot.expired())
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn ping(&self) -> Result<()> {
        Ok(())
    }
}
