use anyhow::Result;
use std::path::Path;

use sounding::config::SoundingConfig;

/// Recompute embeddings for every record in a file, bypassing the cache.
///
/// Use after changing `embedding.model` or `embedding.provider`; the fresh
/// vectors overwrite any cached ones.
pub async fn re_embed(config: &SoundingConfig, file: &Path) -> Result<()> {
    let records = super::load_records(file)?;
    let engine = super::build_engine(config)?;

    for record in records {
        engine.store().insert_or_replace(record)?;
    }

    let total = engine.store().len();
    println!(
        "Re-embedding {total} records with {}...",
        engine.provider().version()
    );
    let pb = super::record_progress(total)?;

    let mut done = 0u64;
    let mut failed = 0u64;
    for record in engine.store().all() {
        match engine.re_embed(record.id()).await {
            Ok(()) => done += 1,
            Err(e) => {
                tracing::warn!(id = record.id(), error = %e, "re-embed failed");
                failed += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!("Re-embed complete: {done} updated, {failed} failed");
    anyhow::ensure!(failed == 0, "{failed} record(s) failed to re-embed");
    Ok(())
}
