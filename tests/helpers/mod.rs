#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sounding::embedding::hashing::HashingEmbeddingProvider;
use sounding::embedding::EmbeddingProvider;
use sounding::records::query::EngineOptions;
use sounding::{DuplicatePolicy, Record, RecordStore, SearchEngine};

pub const TEST_DIM: usize = 384;

/// Hashing provider that counts calls and can be told to fail or stall.
///
/// Texts containing `FAIL` return an error; texts containing `SLOW` sleep for
/// `delay` before answering.
pub struct CountingProvider {
    inner: HashingEmbeddingProvider,
    calls: AtomicUsize,
    delay: Duration,
    version: String,
}

impl CountingProvider {
    pub fn new() -> Self {
        Self::with_version("counting:v1")
    }

    pub fn with_version(version: &str) -> Self {
        Self {
            inner: HashingEmbeddingProvider::new(TEST_DIM).unwrap(),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            version: version.to_string(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingProvider for CountingProvider {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::ensure!(!text.contains("FAIL"), "provider rejected input");
        if text.contains("SLOW") {
            std::thread::sleep(self.delay);
        }
        self.inner.embed(text)
    }

    fn dimensions(&self) -> usize {
        TEST_DIM
    }

    fn version(&self) -> String {
        self.version.clone()
    }
}

/// The three sample profiles, with their float metadata.
pub fn ocean_records() -> Vec<Record> {
    let rows = [
        ("r1", "Surface water profile near 70°E", 0.0, 70.0, 35.0, 22.0),
        ("r2", "10m depth reading in the Indian Ocean", 1.0, 71.0, 35.1, 22.5),
        ("r3", "20m depth temperature and salinity data", 2.0, 72.0, 34.9, 21.8),
    ];
    rows.into_iter()
        .map(|(id, text, lat, lon, salinity, temperature)| {
            Record::new(id, text)
                .with_field("latitude", lat)
                .with_field("longitude", lon)
                .with_field("salinity", salinity)
                .with_field("temperature", temperature)
                .with_field("time", "2023-03-01")
        })
        .collect()
}

pub fn engine_with(provider: Arc<dyn EmbeddingProvider>, policy: DuplicatePolicy) -> SearchEngine {
    let store = Arc::new(RecordStore::new(policy));
    SearchEngine::new(store, provider, EngineOptions::default())
}

/// Engine over a fresh store, backed by a 384-dim hashing provider.
pub fn hashing_engine() -> SearchEngine {
    let provider: Arc<dyn EmbeddingProvider> =
        Arc::new(HashingEmbeddingProvider::new(TEST_DIM).unwrap());
    engine_with(provider, DuplicatePolicy::Replace)
}

/// Engine with the ocean records already ingested.
pub async fn ocean_engine() -> SearchEngine {
    let engine = hashing_engine();
    let report = engine.ingest_batch(ocean_records()).await;
    assert!(report.is_complete());
    engine
}
