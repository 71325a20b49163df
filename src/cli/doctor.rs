//! CLI `doctor` command: inspect the embedding cache and provider setup.

use anyhow::{Context, Result};

use sounding::config::SoundingConfig;
use sounding::db::cache::EmbeddingCache;
use sounding::embedding::{self, local::model_paths};

/// Print a health report for the configured provider and embedding cache.
pub fn doctor(config: &SoundingConfig) -> Result<()> {
    println!("Sounding Health Report");
    println!("======================");
    println!();
    println!("Embedding provider:");
    println!("  Configured:      {}", config.embedding.provider);
    if config.embedding.provider == "local" {
        let (model, tokenizer) = model_paths(&config.embedding);
        let present = model.exists() && tokenizer.exists();
        println!("  Model:           {}", config.embedding.model);
        println!(
            "  Model files:     {}",
            if present { "present" } else { "missing (run `sounding model download`)" }
        );
    }

    let version = match embedding::create_provider(&config.embedding) {
        Ok(provider) => {
            let version = provider.version();
            println!("  Version:         {version}");
            println!("  Dimensions:      {}", provider.dimensions());
            Some(version)
        }
        Err(e) => {
            println!("  Status:          UNAVAILABLE ({e:#})");
            None
        }
    };
    println!();

    let cache_path = config.resolved_cache_path();
    if !cache_path.exists() {
        println!("Cache: not found at {}", cache_path.display());
        if !config.storage.persist {
            println!("storage.persist is off; embeddings are recomputed on every run.");
        }
        return Ok(());
    }

    let file_size = std::fs::metadata(&cache_path).map(|m| m.len()).unwrap_or(0);

    // Opening under the configured provider would wipe a mismatched cache, so
    // read the stored provider through a raw connection first.
    let stored = {
        let conn = sounding::db::open_database(&cache_path)
            .context("failed to open cache (may be corrupt)")?;
        sounding::db::schema::get_provider(&conn)?
    };

    println!("Cache:             {}", cache_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!(
        "  Stored provider: {}",
        stored.as_deref().unwrap_or("(not set)")
    );

    if let (Some(stored), Some(version)) = (&stored, &version) {
        if stored != version {
            println!("  WARNING: provider mismatch! Cached vectors will be discarded on next run.");
            return Ok(());
        }
    }

    let Some(version) = version else {
        return Ok(());
    };
    let cache = EmbeddingCache::open(&cache_path, &version)?;
    let report = cache.health().context("failed to run health check")?;

    println!("  Schema version:  {}", report.schema_version);
    println!("  Entries:         {}", report.entries);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery: delete {} and run `sounding ingest` again.", cache_path.display());
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::format_bytes;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
