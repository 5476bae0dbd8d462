//! Ingest path: source documents → page chunks → store + manifest.
//!
//! Each `.txt`/`.md` file in the content directory becomes one document; form
//! feeds separate pages (a file without them is a single page). Re-ingesting an
//! unchanged document without `overwrite` skips the work but still folds its
//! chunk ids into the rebuilt manifest, so the manifest is always the full
//! ordered union.

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use super::{abbrev_from_title, slug, LitChunk, LitDocument, DocumentSummary};
use crate::providers::Embedder;
use crate::store::{self, keys, KvStore};

#[derive(Debug, Default, Serialize)]
pub struct IngestStats {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub total_chunks: usize,
    pub errors: Vec<IngestError>,
}

#[derive(Debug, Serialize)]
pub struct IngestError {
    pub file: String,
    pub error: String,
}

/// Split text into fixed windows of `target_words` whitespace-separated words.
pub fn chunk_text(text: &str, target_words: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(target_words.max(1))
        .map(|w| w.join(" "))
        .filter(|c| !c.is_empty())
        .collect()
}

/// Read a source document as 1-based (page, text) pairs, splitting on form feeds.
fn read_pages(path: &Path) -> Result<Vec<(u32, String)>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(raw
        .split('\u{0C}')
        .enumerate()
        .map(|(i, page)| (i as u32 + 1, page.to_string()))
        .collect())
}

fn source_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("txt") | Some("md")
            )
        })
        .collect();
    // deterministic ingest order → deterministic manifest order
    files.sort();
    Ok(files)
}

/// Ingest every source document in `dir`, then rebuild the global manifest.
///
/// Per-file failures are recorded in `stats.errors` and skipped; embedding
/// failures leave the document's chunks unembedded.
pub async fn ingest_dir(
    store: &dyn KvStore,
    embedder: Option<&dyn Embedder>,
    dir: &Path,
    overwrite: bool,
    chunk_words: usize,
) -> Result<IngestStats> {
    let mut stats = IngestStats::default();
    let mut all_chunk_ids: Vec<String> = Vec::new();

    for path in source_files(dir)? {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let doc_id = slug(&title);
        if doc_id.is_empty() {
            stats.skipped += 1;
            stats.errors.push(IngestError {
                file: file_name,
                error: "title slug is empty".into(),
            });
            continue;
        }

        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                stats.skipped += 1;
                stats.errors.push(IngestError {
                    file: file_name,
                    error: format!("read failed: {e}"),
                });
                continue;
            }
        };
        let sha256 = hex::encode(Sha256::digest(&bytes));

        let doc_key = keys::lit_doc(&doc_id);
        let existing: Option<LitDocument> = store::get_json(store, &doc_key)?;
        if existing.is_some() && !overwrite {
            // keep its chunks in the manifest even though we skip the work
            if let Some(ids) = store::get_json::<Vec<String>>(store, &keys::lit_chunks(&doc_id))? {
                all_chunk_ids.extend(ids);
            }
            stats.skipped += 1;
            continue;
        }

        let pages = match read_pages(&path) {
            Ok(p) => p,
            Err(e) => {
                stats.skipped += 1;
                stats.errors.push(IngestError {
                    file: file_name,
                    error: e.to_string(),
                });
                continue;
            }
        };
        let page_count = pages.len();
        let abbrev = abbrev_from_title(&title);

        let mut chunks: Vec<LitChunk> = Vec::new();
        for (page, page_text) in &pages {
            if page_text.trim().is_empty() {
                continue;
            }
            for frag in chunk_text(page_text, chunk_words) {
                chunks.push(LitChunk {
                    doc_id: doc_id.clone(),
                    title: title.clone(),
                    abbrev: abbrev.clone(),
                    page: *page,
                    text: frag,
                    emb: None,
                });
            }
        }

        if let Some(embedder) = embedder {
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            if !texts.is_empty() {
                match embedder.embed(&texts).await {
                    Ok(vectors) => {
                        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
                            chunk.emb = Some(vector);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(doc = %doc_id, error = %e, "embedding failed — indexing without vectors");
                    }
                }
            }
        }

        let mut chunk_ids = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let cid = format!("{doc_id}:{i}");
            store::set_json(store, &keys::lit_chunk(&cid), chunk, None)?;
            chunk_ids.push(cid);
        }
        all_chunk_ids.extend(chunk_ids.iter().cloned());

        store::set_json(
            store,
            &doc_key,
            &LitDocument {
                title,
                abbrev,
                pages: page_count,
                sha256,
            },
            None,
        )?;
        store::set_json(store, &keys::lit_chunks(&doc_id), &chunk_ids, None)?;

        if existing.is_some() {
            stats.updated += 1;
        } else {
            stats.added += 1;
        }
        tracing::info!(doc = %doc_id, chunks = chunk_ids.len(), "document indexed");
    }

    stats.total_chunks = all_chunk_ids.len();
    store::set_json(store, keys::LIT_INDEX_ALL, &all_chunk_ids, None)?;
    Ok(stats)
}

/// List all known documents by walking the manifest back to owning documents.
///
/// Scan-free on purpose: simple backends may not support key enumeration, but
/// every backend can follow the manifest.
pub fn list_documents(store: &dyn KvStore) -> Result<Vec<DocumentSummary>> {
    let mut docs: Vec<DocumentSummary> = Vec::new();
    let Some(manifest) = store::get_json::<Vec<String>>(store, keys::LIT_INDEX_ALL)? else {
        return Ok(docs);
    };
    for cid in &manifest {
        let Some(doc_id) = cid.rsplit_once(':').map(|(d, _)| d) else {
            continue;
        };
        if docs.iter().any(|d| d.doc_id == doc_id) {
            continue;
        }
        if let Some(doc) = store::get_json::<LitDocument>(store, &keys::lit_doc(doc_id))? {
            docs.push(DocumentSummary {
                doc_id: doc_id.to_string(),
                doc,
            });
        }
    }
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_exact_windows() {
        let text = "word ".repeat(500);
        let chunks = chunk_text(&text, 180);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].split_whitespace().count(), 180);
        assert_eq!(chunks[1].split_whitespace().count(), 180);
        assert_eq!(chunks[2].split_whitespace().count(), 140);
    }

    #[test]
    fn chunking_small_and_empty() {
        assert_eq!(chunk_text("one two three", 180), vec!["one two three"]);
        assert!(chunk_text("", 180).is_empty());
        assert!(chunk_text("   \n  ", 180).is_empty());
    }
}
