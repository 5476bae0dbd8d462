//! User directory over the key-value store.
//!
//! Users are long-lived hashes at `user:{id}` plus reverse mappings from
//! contact number, normalized display name, and external id code. Sessions and
//! memory refer to users by id and never own them.

use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;

use crate::auth::credentials::hash_passphrase;
use crate::auth::normalize::normalize_name;
use crate::store::{keys, KvStore};

/// Fields accepted by [`upsert_user`].
#[derive(Debug, Default, Clone, Deserialize)]
pub struct UserUpsert {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub id_code: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum UpsertStatus {
    Created,
    Updated,
}

impl UpsertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
        }
    }
}

pub fn lookup_by_number(store: &dyn KvStore, number: &str) -> Result<Option<String>> {
    store.get(&keys::number_to_user(number.trim()))
}

/// `name` is normalized (collapsed, uppercased) before lookup.
pub fn lookup_by_name(store: &dyn KvStore, name: &str) -> Result<Option<String>> {
    store.get(&keys::name_to_user(&normalize_name(name)))
}

pub fn lookup_by_id_code(store: &dyn KvStore, code: &str) -> Result<Option<String>> {
    store.get(&keys::idcode_to_user(&code.trim().to_uppercase()))
}

pub fn get_profile(store: &dyn KvStore, user_id: &str) -> Result<HashMap<String, String>> {
    store.hash_get_all(&keys::user(user_id))
}

pub fn new_user_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Create or update a user and its reverse mappings.
///
/// Resolution order matches the import path: id code first, then normalized
/// display name. `created_at` is only written for new users; a supplied
/// passphrase is hashed and attached.
pub fn upsert_user(store: &dyn KvStore, input: &UserUpsert) -> Result<(String, UpsertStatus)> {
    let now = chrono::Utc::now().to_rfc3339();

    let mut user_id = None;
    if let Some(code) = &input.id_code {
        user_id = lookup_by_id_code(store, code)?;
    }
    if user_id.is_none() {
        if let Some(display) = &input.display_name {
            user_id = lookup_by_name(store, display)?;
        }
    }
    let (user_id, status) = match user_id {
        Some(id) => (id, UpsertStatus::Updated),
        None => (new_user_id(), UpsertStatus::Created),
    };

    if let Some(code) = &input.id_code {
        store.set(
            &keys::idcode_to_user(&code.trim().to_uppercase()),
            &user_id,
            None,
        )?;
    }
    if let Some(number) = &input.number {
        store.set(&keys::number_to_user(number.trim()), &user_id, None)?;
    }
    if let Some(display) = &input.display_name {
        store.set(&keys::name_to_user(&normalize_name(display)), &user_id, None)?;
    }

    let name = input.name.trim().to_string();
    let number = input.number.as_deref().unwrap_or("").trim().to_string();
    let id_code = input
        .id_code
        .as_deref()
        .unwrap_or("")
        .trim()
        .to_uppercase();
    let mut fields: Vec<(&str, &str)> = vec![
        ("name", &name),
        ("number", &number),
        ("id_code", &id_code),
        ("authed", "1"),
        ("last_seen", &now),
    ];
    if status == UpsertStatus::Created {
        fields.push(("created_at", &now));
    }
    store.hash_set(&keys::user(&user_id), &fields)?;

    if let Some(passphrase) = &input.passphrase {
        let (salt_hex, hash_hex) = hash_passphrase(passphrase, None)?;
        store.hash_set(
            &keys::user(&user_id),
            &[("pass_salt", salt_hex.as_str()), ("pass_hash", hash_hex.as_str())],
        )?;
    }

    Ok((user_id, status))
}

/// Register a caller seen via `/auth/verify-name`: bind the number and write
/// the profile hash. Re-run on every verify so legacy profiles pick up
/// missing fields; `created_at` is only written for new users.
/// Returns the (possibly new) user id.
pub fn register_contact(store: &dyn KvStore, number: &str, name: &str) -> Result<String> {
    let now = chrono::Utc::now().to_rfc3339();
    let (user_id, created) = match lookup_by_number(store, number)? {
        Some(id) => (id, false),
        None => {
            let id = new_user_id();
            store.set(&keys::number_to_user(number.trim()), &id, None)?;
            (id, true)
        }
    };
    let mut fields: Vec<(&str, &str)> = vec![
        ("name", name),
        ("number", number),
        ("authed", "1"),
        ("last_seen", &now),
    ];
    if created {
        fields.push(("created_at", &now));
    }
    store.hash_set(&keys::user(&user_id), &fields)?;
    Ok(user_id)
}

pub fn touch_last_seen(store: &dyn KvStore, user_id: &str) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    store.hash_set(&keys::user(user_id), &[("last_seen", &now)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::verify_passphrase;
    use crate::store::memory::MemoryStore;

    #[test]
    fn upsert_creates_then_updates() {
        let store = MemoryStore::new();
        let input = UserUpsert {
            name: "Alice A".into(),
            display_name: Some("Alice A".into()),
            number: Some("123".into()),
            id_code: Some("na-001".into()),
            passphrase: None,
        };
        let (id1, status1) = upsert_user(&store, &input).unwrap();
        assert_eq!(status1, UpsertStatus::Created);

        // same id code resolves to the same user
        let (id2, status2) = upsert_user(&store, &input).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(status2, UpsertStatus::Updated);

        let profile = get_profile(&store, &id1).unwrap();
        assert_eq!(profile.get("name").map(String::as_str), Some("Alice A"));
        assert_eq!(profile.get("id_code").map(String::as_str), Some("NA-001"));
        assert!(profile.contains_key("created_at"));
    }

    #[test]
    fn reverse_mappings_resolve() {
        let store = MemoryStore::new();
        let input = UserUpsert {
            name: "Alice A".into(),
            display_name: Some("alice   a".into()),
            number: Some(" 123 ".into()),
            id_code: Some("code1".into()),
            passphrase: None,
        };
        let (id, _) = upsert_user(&store, &input).unwrap();
        assert_eq!(lookup_by_number(&store, "123").unwrap().as_deref(), Some(id.as_str()));
        assert_eq!(
            lookup_by_name(&store, "Alice A").unwrap().as_deref(),
            Some(id.as_str())
        );
        assert_eq!(
            lookup_by_id_code(&store, "CODE1").unwrap().as_deref(),
            Some(id.as_str())
        );
    }

    #[test]
    fn passphrase_attached_and_verifiable() {
        let store = MemoryStore::new();
        let input = UserUpsert {
            name: "Bob".into(),
            display_name: Some("Bob".into()),
            passphrase: Some("one day at a time".into()),
            ..Default::default()
        };
        let (id, _) = upsert_user(&store, &input).unwrap();
        let profile = get_profile(&store, &id).unwrap();
        let salt = profile.get("pass_salt").unwrap();
        let hash = profile.get("pass_hash").unwrap();
        assert!(verify_passphrase(salt, hash, "One Day At A Time"));
        assert!(!verify_passphrase(salt, hash, "wrong"));
    }

    #[test]
    fn register_contact_reuses_bound_number() {
        let store = MemoryStore::new();
        let id1 = register_contact(&store, "555", "Carol").unwrap();
        let id2 = register_contact(&store, "555", "Carol").unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn register_contact_heals_legacy_profiles() {
        let store = MemoryStore::new();
        // legacy record: number bound, but the profile hash has no name
        store.set(&keys::number_to_user("555"), "legacy-id", None).unwrap();
        store
            .hash_set(&keys::user("legacy-id"), &[("created_at", "2020-01-01T00:00:00Z")])
            .unwrap();

        let id = register_contact(&store, "555", "Carol").unwrap();
        assert_eq!(id, "legacy-id");
        let profile = get_profile(&store, "legacy-id").unwrap();
        assert_eq!(profile.get("name").map(String::as_str), Some("Carol"));
        assert_eq!(profile.get("authed").map(String::as_str), Some("1"));
        // existing creation stamp is preserved
        assert_eq!(
            profile.get("created_at").map(String::as_str),
            Some("2020-01-01T00:00:00Z")
        );
    }
}
