//! Persona and safety policy for the assistant.
//!
//! The policy text is the backbone of every system prompt. Operators may
//! replace it with their own file; otherwise the built-in default applies.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

use crate::profile::UserMemory;

pub const DEFAULT_POLICY: &str = "\
You are Cairn, a steady, warm companion for people in recovery from addiction.
Speak plainly and briefly, like a trusted friend who has been there. Never give
medical, legal, or financial advice; suggest a professional for those. Never
moralize or lecture. If the caller mentions self-harm or overdose, urge them to
contact local emergency services and a crisis line immediately. Ground step
guidance in the approved literature when it is provided, and cite it. When you
don't know, say so. Keep replies under 120 words unless asked for more.";

/// Load the policy from `path`, falling back to the built-in default when no
/// path is configured.
pub fn load_policy(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) => std::fs::read_to_string(p)
            .with_context(|| format!("reading policy file {}", p.display())),
        None => Ok(DEFAULT_POLICY.to_string()),
    }
}

/// First line of the policy, shown by the introspection endpoint.
pub fn policy_excerpt(policy: &str) -> &str {
    policy.lines().next().unwrap_or("")
}

/// Assemble the full system prompt for one turn: policy, caller identity, and
/// whatever long-term memory we hold about them.
pub fn build_system_prompt(
    policy: &str,
    profile: &HashMap<String, String>,
    memory: &UserMemory,
) -> String {
    let mut parts = vec![policy.to_string()];

    if let Some(name) = profile.get("display_name").or_else(|| profile.get("name")) {
        parts.push(format!("The caller's name is {name}. Address them by name sparingly."));
    }
    if let Some(clean_date) = memory.profile.get("clean_date") {
        parts.push(format!("Their clean date is {clean_date}."));
    }
    if let Some(step) = memory.profile.get("current_step") {
        parts.push(format!("They are currently working step {step}."));
    }
    if let Some(topic) = &memory.last_topics {
        parts.push(format!("Last time they talked about: {topic}."));
    }
    if !memory.notes.is_empty() {
        let recent: Vec<&str> = memory
            .notes
            .iter()
            .rev()
            .take(5)
            .map(|n| n.note.as_str())
            .collect();
        parts.push(format!("Notes on file: {}.", recent.join(" | ")));
    }

    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Note;

    #[test]
    fn default_policy_when_no_path() {
        let policy = load_policy(None).unwrap();
        assert!(policy.contains("Cairn"));
    }

    #[test]
    fn missing_policy_file_is_an_error() {
        assert!(load_policy(Some(Path::new("/nonexistent/policy.txt"))).is_err());
    }

    #[test]
    fn excerpt_is_first_line() {
        assert_eq!(policy_excerpt("line one\nline two"), "line one");
        assert_eq!(policy_excerpt(""), "");
    }

    #[test]
    fn prompt_includes_name_and_memory() {
        let mut profile = HashMap::new();
        profile.insert("display_name".to_string(), "Marcus".to_string());
        let mut memory = UserMemory::default();
        memory.profile.insert("current_step".to_string(), "4".to_string());
        memory.last_topics = Some("resentment inventory".to_string());
        memory.notes.push(Note {
            ts: "2026-08-01T00:00:00Z".to_string(),
            note: "sponsor meeting Thursdays".to_string(),
        });

        let prompt = build_system_prompt(DEFAULT_POLICY, &profile, &memory);
        assert!(prompt.contains("Marcus"));
        assert!(prompt.contains("step 4"));
        assert!(prompt.contains("resentment inventory"));
        assert!(prompt.contains("sponsor meeting Thursdays"));
    }

    #[test]
    fn prompt_for_guest_is_policy_only_plus_nothing() {
        let prompt = build_system_prompt(DEFAULT_POLICY, &HashMap::new(), &UserMemory::default());
        assert_eq!(prompt, DEFAULT_POLICY);
    }
}
