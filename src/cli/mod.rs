//! Operator commands: literature ingestion and user management.

use std::path::PathBuf;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{expand_tilde, CairnConfig};
use crate::lit::index;
use crate::providers;
use crate::store;
use crate::users::{self, UpsertStatus, UserUpsert};

/// Ingest the literature directory into the store, embedding when configured.
pub async fn ingest(config: &CairnConfig, dir: Option<PathBuf>, overwrite: bool) -> Result<()> {
    let dir = dir.unwrap_or_else(|| expand_tilde(&config.retrieval.lit_dir));
    let store = store::open(&config.store, &config.resolved_db_path())?;
    let embedder = providers::create_embedder(config)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("indexing {}", dir.display()));
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let stats = index::ingest_dir(
        store.as_ref(),
        embedder.as_deref(),
        &dir,
        overwrite,
        config.retrieval.chunk_words,
    )
    .await?;
    spinner.finish_and_clear();

    println!(
        "Ingest complete: {} added, {} updated, {} skipped, {} chunks indexed.",
        stats.added, stats.updated, stats.skipped, stats.total_chunks
    );
    for err in &stats.errors {
        eprintln!("  failed: {} — {}", err.file, err.error);
    }
    Ok(())
}

/// Create or update a user from the command line, with optional passphrase
/// and reverse mappings.
pub fn user_add(config: &CairnConfig, input: UserUpsert) -> Result<()> {
    anyhow::ensure!(!input.name.trim().is_empty(), "name must not be empty");
    let store = store::open(&config.store, &config.resolved_db_path())?;
    let (user_id, status) = users::upsert_user(store.as_ref(), &input)?;
    match status {
        UpsertStatus::Created => println!("Created user {user_id}"),
        UpsertStatus::Updated => println!("Updated user {user_id}"),
    }
    if input.passphrase.is_some() {
        println!("Passphrase set.");
    }
    Ok(())
}
