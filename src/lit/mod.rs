//! Literature corpus: citable, page-anchored fragments of source documents.
//!
//! Documents are ingested into ~180-word chunks keyed `"{doc_id}:{i}"`, with a
//! global manifest (`lit:index:all`) listing every chunk id in order. The
//! manifest drives exhaustive scan-based retrieval, so backends without native
//! key scans work the same as those with them.

pub mod index;
pub mod search;

use serde::{Deserialize, Serialize};

/// Stored document record (`lit:doc:{doc_id}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LitDocument {
    pub title: String,
    pub abbrev: String,
    pub pages: usize,
    pub sha256: String,
}

/// Document record plus its id, as returned by listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub doc_id: String,
    #[serde(flatten)]
    pub doc: LitDocument,
}

/// A single citable fragment (`lit:chunk:{doc_id}:{i}`).
///
/// Page numbers are 1-based. `emb` is absent when the corpus was indexed
/// without an embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LitChunk {
    pub doc_id: String,
    pub title: String,
    pub abbrev: String,
    pub page: u32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emb: Option<Vec<f32>>,
}

/// Slugify a title into a document id: alphanumeric runs joined by hyphens,
/// trimmed, lowercased.
pub fn slug(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    for c in title.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    out
}

/// Derive a citation abbreviation from a document title.
///
/// Three known title families get fixed codes; anything else takes the
/// initials of up to six words, uppercased, capped at six characters.
pub fn abbrev_from_title(title: &str) -> String {
    let upper = title.to_uppercase();
    if upper.contains("STEP") && upper.contains("GUIDE") {
        return "SWG".into();
    }
    if upper.contains("BASIC") && upper.contains("TEXT") {
        return "BT".into();
    }
    if upper.contains("JUST") && upper.contains("TODAY") {
        return "JFT".into();
    }
    let abbr: String = title
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .take(6)
        .filter_map(|w| w.chars().next())
        .collect::<String>()
        .to_uppercase();
    if abbr.is_empty() {
        "DOC".into()
    } else {
        abbr.chars().take(6).collect()
    }
}
