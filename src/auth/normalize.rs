//! Text canonicalization for credentials and display names.
//!
//! Passphrases must normalize identically at hash time and verify time, or
//! invisible Unicode variation (smart quotes, NBSP, zero-width joiners) locks
//! legitimate users out. Normalization is idempotent.

use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

/// Canonicalize a passphrase: NFKC, strip NBSP/zero-width characters, map
/// curly quotes to ASCII, collapse whitespace runs, trim, lowercase.
///
/// Lower-casing weakens case sensitivity but is kept for compatibility with
/// existing stored credentials.
pub fn normalize_passphrase(raw: &str) -> String {
    let folded: String = raw
        .nfkc()
        .filter(|c| !matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}'))
        .map(|c| match c {
            '\u{00A0}' => ' ',
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            other => other,
        })
        .collect();
    folded
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalize a display name: collapse whitespace and uppercase.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

fn claim_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:i['’ ]?m|i am|my name is)\s+(.{2,80})$").expect("valid claim regex")
    })
}

/// Extract a self-identification claim ("I'm NAME", "I am NAME", "my name is
/// NAME") at the end of an utterance. Returns the normalized name.
pub fn extract_claimed_name(text: &str) -> Option<String> {
    let caps = claim_regex().captures(text.trim())?;
    let name = normalize_name(caps.get(1)?.as_str());
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
