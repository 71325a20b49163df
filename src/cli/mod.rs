pub mod doctor;
pub mod ingest;
pub mod re_embed;
pub mod search;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use sounding::config::{EmbeddingConfig, SoundingConfig};
use sounding::db::cache::EmbeddingCache;
use sounding::embedding::local::{model_paths, model_urls};
use sounding::embedding::{self, EmbeddingProvider};
use sounding::records::types::{Record, RecordInput};
use sounding::{RecordStore, SearchEngine};

/// Read a JSON array of records.
pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read records file: {}", path.display()))?;
    let inputs: Vec<RecordInput> =
        serde_json::from_str(&json).context("failed to parse records JSON")?;
    Ok(inputs.into_iter().map(Record::from).collect())
}

/// Build an engine from config: provider, empty store, and (if enabled) the disk cache.
pub fn build_engine(config: &SoundingConfig) -> Result<SearchEngine> {
    let provider: Arc<dyn EmbeddingProvider> = Arc::from(
        embedding::create_provider(&config.embedding)
            .context("failed to create embedding provider")?,
    );
    tracing::info!(provider = %provider.version(), "embedding provider ready");

    let store = Arc::new(RecordStore::new(config.duplicate_policy()?));
    let mut engine = SearchEngine::new(store, Arc::clone(&provider), config.engine_options());

    if config.storage.persist {
        let cache = EmbeddingCache::open(config.resolved_cache_path(), &provider.version())
            .context("failed to open embedding cache")?;
        engine = engine.with_cache(Arc::new(cache));
    }
    Ok(engine)
}

/// Download the configured model's ONNX export and tokenizer to the cache directory.
pub async fn model_download(config: &EmbeddingConfig) -> Result<()> {
    let (model_path, tokenizer_path) = model_paths(config);
    let (model_url, tokenizer_url) = model_urls(&config.model);
    if let Some(dir) = model_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create model dir: {}", dir.display()))?;
    }

    for (url, dest, label) in [
        (&model_url, &model_path, "model.onnx"),
        (&tokenizer_url, &tokenizer_path, "tokenizer.json"),
    ] {
        if dest.exists() {
            println!("Already present: {}", dest.display());
            continue;
        }
        println!("Downloading {} {label}...", config.model);
        download_file(url, dest).await?;
        println!("Saved to {}", dest.display());
    }

    println!("Model download complete.");
    Ok(())
}

/// Stream `url` into `dest` chunk by chunk, via a `.part` file renamed on success.
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;
    anyhow::ensure!(
        response.status().is_success(),
        "download of {url} failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
                    .context("invalid progress template")?
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let part = dest.with_extension("part");
    let mut file = tokio::fs::File::create(&part)
        .await
        .with_context(|| format!("failed to create {}", part.display()))?;

    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await.context("error reading response")? {
        file.write_all(&chunk)
            .await
            .with_context(|| format!("error writing {}", part.display()))?;
        written += chunk.len() as u64;
        pb.set_position(written);
    }
    file.flush().await?;
    drop(file);
    anyhow::ensure!(written > 0, "download of {url} returned an empty body");

    tokio::fs::rename(&part, dest)
        .await
        .with_context(|| format!("failed to move download into {}", dest.display()))?;

    pb.finish_and_clear();
    tracing::info!(path = %dest.display(), bytes = written, "download finished");
    Ok(())
}

/// Progress bar over `len` records.
pub(crate) fn record_progress(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} ({eta})")
            .context("invalid progress template")?
            .progress_chars("##-"),
    );
    Ok(pb)
}
