//! Retrieval ranking and citation context rendering.
//!
//! Scoring walks every chunk in the manifest — a deliberate full scan at this
//! corpus scale. Embedding cosine similarity is used when both the query can be
//! embedded and the corpus carries vectors; otherwise keyword overlap. The
//! descending sort is stable, so ties keep manifest order and repeated queries
//! return identical rankings.

use anyhow::Result;
use serde::Serialize;

use super::LitChunk;
use crate::providers::Embedder;
use crate::store::{self, keys, KvStore};

#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub score: f64,
    #[serde(flatten)]
    pub chunk: LitChunk,
}

fn load_chunks(store: &dyn KvStore) -> Result<Vec<LitChunk>> {
    let Some(manifest) = store::get_json::<Vec<String>>(store, keys::LIT_INDEX_ALL)? else {
        return Ok(Vec::new());
    };
    let mut chunks = Vec::with_capacity(manifest.len());
    for cid in &manifest {
        if let Some(chunk) = store::get_json::<LitChunk>(store, &keys::lit_chunk(cid))? {
            chunks.push(chunk);
        }
    }
    Ok(chunks)
}

/// Cosine similarity; 0.0 when either vector has zero norm.
fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let na: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|y| (*y as f64).powi(2)).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| w.len() >= 3)
        .map(str::to_lowercase)
}

/// Keyword overlap: query words (≥3 letters) present in the chunk, normalized
/// by `max(5, chunk word count)` so very short chunks aren't over-rewarded.
fn keyword_score(query: &str, text: &str) -> f64 {
    let query_words: std::collections::HashSet<String> = words(query).collect();
    if query_words.is_empty() {
        return 0.0;
    }
    let chunk_words: Vec<String> = words(text).collect();
    if chunk_words.is_empty() {
        return 0.0;
    }
    let hits = chunk_words.iter().filter(|w| query_words.contains(*w)).count();
    hits as f64 / chunk_words.len().max(5) as f64
}

/// Score every indexed chunk against `query` and return the top `k`.
pub async fn search(
    store: &dyn KvStore,
    embedder: Option<&dyn Embedder>,
    query: &str,
    k: usize,
) -> Result<Vec<ScoredChunk>> {
    let chunks = load_chunks(store)?;
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    // Embedding path only when the corpus actually carries vectors; a failed
    // query embedding degrades to keyword scoring.
    let query_vector = match (embedder, chunks[0].emb.is_some()) {
        (Some(embedder), true) => match embedder.embed(&[query.to_string()]).await {
            Ok(mut vectors) if !vectors.is_empty() => Some(vectors.remove(0)),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed — keyword scoring");
                None
            }
        },
        _ => None,
    };

    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .map(|chunk| {
            let score = match &query_vector {
                // One scale per ranking: a chunk left unembedded (say its
                // batch embed failed) scores as the zero vector, not by
                // keyword overlap.
                Some(qv) => cosine(qv, chunk.emb.as_deref().unwrap_or(&[])),
                None => keyword_score(query, &chunk.text),
            };
            ScoredChunk { score, chunk }
        })
        .collect();

    // stable: equal scores keep manifest order
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    Ok(scored)
}

/// Render the retrieval context block: citation instructions plus one
/// `[ABBREV p.PAGE] text` line per snippet.
pub fn build_context(snippets: &[ScoredChunk]) -> String {
    let mut lines = vec![
        "Use only the approved literature below for step guidance. If it is insufficient, \
         say so and stick to programme principles."
            .to_string(),
        "Cite each suggestion with [ABBREV p.N].".to_string(),
    ];
    for s in snippets {
        lines.push(format!("[{} p.{}] {}", s.chunk.abbrev, s.chunk.page, s.chunk.text));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    struct SpikeEmbedder;

    #[async_trait::async_trait]
    impl Embedder for SpikeEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn chunk(doc_id: &str, text: &str, emb: Option<Vec<f32>>) -> LitChunk {
        LitChunk {
            doc_id: doc_id.into(),
            title: doc_id.into(),
            abbrev: "DOC".into(),
            page: 1,
            text: text.into(),
            emb,
        }
    }

    fn seed(store: &MemoryStore, chunks: &[LitChunk]) {
        let mut manifest = Vec::new();
        for (i, c) in chunks.iter().enumerate() {
            let cid = format!("{}:{i}", c.doc_id);
            store::set_json(store, &keys::lit_chunk(&cid), c, None).unwrap();
            manifest.push(cid);
        }
        store::set_json(store, keys::LIT_INDEX_ALL, &manifest, None).unwrap();
    }

    #[tokio::test]
    async fn unembedded_chunks_score_zero_in_embedding_mode() {
        let store = MemoryStore::new();
        seed(
            &store,
            &[
                chunk("with-vector", "unrelated text", Some(vec![1.0, 0.0])),
                // Text packed with query words; must still lose to cosine.
                chunk("without-vector", "step step step step step", None),
            ],
        );

        let results = search(&store, Some(&SpikeEmbedder), "step", 2).await.unwrap();
        assert_eq!(results[0].chunk.doc_id, "with-vector");
        assert!((results[0].score - 1.0).abs() < 1e-9);
        assert_eq!(results[1].chunk.doc_id, "without-vector");
        assert_eq!(results[1].score, 0.0);
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine(&[1.0], &[]), 0.0);
    }

    #[test]
    fn keyword_score_counts_overlap() {
        // 7 chunk words ≥3 letters, 2 hits
        let s = keyword_score("step one powerless", "the first step taught powerless surrender today");
        assert!((s - 2.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn keyword_score_short_chunk_floor() {
        // 2 chunk words but floor of 5 in the denominator
        let s = keyword_score("step", "step work");
        assert!((s - 1.0 / 5.0).abs() < 1e-9);
    }

    #[test]
    fn keyword_score_degenerate_inputs() {
        assert_eq!(keyword_score("", "some text here"), 0.0);
        assert_eq!(keyword_score("at it do", "short words only"), 0.0); // all <3 letters
        assert_eq!(keyword_score("step", ""), 0.0);
    }

    #[test]
    fn context_block_format() {
        let snippet = ScoredChunk {
            score: 0.5,
            chunk: LitChunk {
                doc_id: "step-working-guides".into(),
                title: "Step Working Guides".into(),
                abbrev: "SWG".into(),
                page: 23,
                text: "We admitted that we were powerless.".into(),
                emb: None,
            },
        };
        let ctx = build_context(&[snippet]);
        assert!(ctx.contains("[SWG p.23] We admitted that we were powerless."));
        assert!(ctx.starts_with("Use only the approved literature"));
    }
}
