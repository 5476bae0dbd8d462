//! Durable per-user memory: free-form profile, capped notes, last topics.
//!
//! Created lazily on first use and never expires on its own — only an external
//! maintenance purge removes it.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::store::{self, keys, KvStore};

pub const NOTE_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub ts: String,
    pub note: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserMemory {
    #[serde(default)]
    pub profile: BTreeMap<String, String>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_topics: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_contact: Option<String>,
}

impl UserMemory {
    /// Merge a patch into the profile map, last write wins.
    pub fn apply_patch(&mut self, patch: &BTreeMap<String, String>) {
        for (k, v) in patch {
            self.profile.insert(k.clone(), v.clone());
        }
    }

    /// Append a timestamped note, clipping to [`NOTE_MAX_CHARS`] and evicting
    /// the oldest entries past `cap`.
    pub fn add_note(&mut self, note: &str, cap: usize) {
        let clipped: String = note.chars().take(NOTE_MAX_CHARS).collect();
        self.notes.push(Note {
            ts: chrono::Utc::now().to_rfc3339(),
            note: clipped,
        });
        if self.notes.len() > cap {
            self.notes.drain(..self.notes.len() - cap);
        }
    }

    /// Record the topic of the latest turn (first 50 chars) and stamp contact.
    pub fn record_contact(&mut self, message: &str) {
        self.last_topics = Some(message.chars().take(50).collect());
        self.last_contact = Some(chrono::Utc::now().to_rfc3339());
    }
}

pub fn load_memory(store: &dyn KvStore, user_id: &str) -> Result<UserMemory> {
    Ok(store::get_json(store, &keys::memory(user_id))?.unwrap_or_default())
}

/// Persist without TTL — memory is durable.
pub fn save_memory(store: &dyn KvStore, user_id: &str, memory: &UserMemory) -> Result<()> {
    store::set_json(store, &keys::memory(user_id), memory, None)
}
