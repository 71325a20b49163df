use anyhow::Result;
use std::path::Path;

use sounding::config::SoundingConfig;

/// Embed every record in a JSON file and report per-record outcomes.
///
/// With `storage.persist` enabled the vectors land in the embedding cache, so
/// later searches over the same file skip the provider.
pub async fn ingest(config: &SoundingConfig, file: &Path) -> Result<()> {
    let records = super::load_records(file)?;
    let engine = super::build_engine(config)?;

    println!("Ingesting {} records...", records.len());
    let pb = super::record_progress(records.len())?;

    let mut embedded = 0u64;
    let mut cached = 0u64;
    let mut failed = Vec::new();

    for record in records {
        let id = record.id().to_string();
        match engine.store().insert_or_replace(record) {
            Ok(_) => match engine.ensure_embedded(&id).await {
                Ok(true) => embedded += 1,
                Ok(false) => cached += 1,
                Err(e) => failed.push((id, e.to_string())),
            },
            Err(e) => failed.push((id, e.to_string())),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let stats = engine.stats();
    println!(
        "Ingest complete: {embedded} embedded, {cached} from cache, {} failed ({} records, provider {})",
        failed.len(),
        stats.records,
        stats.provider
    );
    for (id, reason) in &failed {
        println!("  {id}: {reason}");
    }
    if !stats.persistent_cache {
        println!("Note: storage.persist is off, embeddings were not saved.");
    }

    anyhow::ensure!(failed.is_empty(), "{} record(s) failed to ingest", failed.len());
    Ok(())
}
