//! Query engine: ingestion, embedding, and ranked retrieval end to end.
//!
//! [`SearchEngine`] ties a [`RecordStore`], an [`EmbeddingProvider`], and an optional
//! persistent [`EmbeddingCache`] together. Queries embed the text, snapshot the
//! store, filter on metadata, and rank; they never write to the store.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::rank::{rank, RankOptions};
use super::store::RecordStore;
use super::types::{IngestReport, InsertOutcome, MetadataValue, RankedResult, Record};
use crate::db::cache::EmbeddingCache;
use crate::embedding::{embed_text, EmbeddingProvider};
use crate::error::{Result, SearchError};

/// Validate a signed result count from an inbound boundary.
pub fn parse_top_n(n: i64) -> Result<usize> {
    usize::try_from(n)
        .map_err(|_| SearchError::invalid_argument(format!("top_n must be non-negative, got {n}")))
}

/// One metadata predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field exists and equals `value`.
    Equals { field: String, value: MetadataValue },
    /// Field exists and lies within the inclusive bounds. Numbers compare
    /// numerically, text lexicographically; mismatched kinds never match.
    Range {
        field: String,
        min: Option<MetadataValue>,
        max: Option<MetadataValue>,
    },
}

fn compare(a: &MetadataValue, b: &MetadataValue) -> Option<Ordering> {
    match (a, b) {
        (MetadataValue::Number(x), MetadataValue::Number(y)) => x.partial_cmp(y),
        (MetadataValue::Text(x), MetadataValue::Text(y)) => Some(x.cmp(y)),
        (MetadataValue::Bool(x), MetadataValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

impl Condition {
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Equals { field, value } => record.metadata().get(field) == Some(value),
            Self::Range { field, min, max } => {
                let Some(v) = record.metadata().get(field) else {
                    return false;
                };
                let above = min
                    .as_ref()
                    .map_or(true, |m| matches!(compare(v, m), Some(Ordering::Greater | Ordering::Equal)));
                let below = max
                    .as_ref()
                    .map_or(true, |m| matches!(compare(v, m), Some(Ordering::Less | Ordering::Equal)));
                above && below
            }
        }
    }
}

/// Conjunction of metadata conditions. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    conditions: Vec<Condition>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.conditions.push(Condition::Equals {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn range(
        mut self,
        field: impl Into<String>,
        min: Option<MetadataValue>,
        max: Option<MetadataValue>,
    ) -> Self {
        self.conditions.push(Condition::Range {
            field: field.into(),
            min,
            max,
        });
        self
    }

    pub fn with(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }
}

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineOptions {
    /// Limit on each provider call. `None` waits indefinitely.
    pub embed_timeout: Option<Duration>,
    /// Record count at which scoring moves to the rayon pool.
    pub parallel_threshold: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            embed_timeout: Some(Duration::from_secs(30)),
            parallel_threshold: RankOptions::default().parallel_threshold,
        }
    }
}

/// Point-in-time counts for display.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub records: usize,
    pub embedded: usize,
    pub dimension: Option<usize>,
    pub provider: String,
    pub persistent_cache: bool,
}

pub struct SearchEngine {
    store: Arc<RecordStore>,
    provider: Arc<dyn EmbeddingProvider>,
    cache: Option<Arc<EmbeddingCache>>,
    options: EngineOptions,
}

impl SearchEngine {
    pub fn new(
        store: Arc<RecordStore>,
        provider: Arc<dyn EmbeddingProvider>,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            provider,
            cache: None,
            options,
        }
    }

    /// Reuse and persist embeddings through `cache`.
    ///
    /// A cache opened for another provider version is not attached.
    pub fn with_cache(mut self, cache: Arc<EmbeddingCache>) -> Self {
        if cache.provider() != self.provider.version() {
            tracing::warn!(
                cache = cache.provider(),
                provider = %self.provider.version(),
                "cache was opened for a different provider, not using it"
            );
            return self;
        }
        self.cache = Some(cache);
        self
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Insert a record and embed it.
    ///
    /// If embedding fails the record stays in the store without an embedding
    /// (not scorable) and the error is returned.
    pub async fn ingest(&self, record: Record) -> Result<InsertOutcome> {
        let id = record.id().to_string();
        let outcome = self.store.insert_or_replace(record)?;
        self.ensure_embedded(&id).await?;
        Ok(outcome)
    }

    /// Ingest many records, reporting each one's outcome separately.
    pub async fn ingest_batch(&self, records: impl IntoIterator<Item = Record>) -> IngestReport {
        let mut outcomes = Vec::new();
        for record in records {
            let id = record.id().to_string();
            let result = self.ingest(record).await.map(|_| ());
            if let Err(ref e) = result {
                tracing::warn!(id = %id, error = %e, "ingest failed");
            }
            outcomes.push((id, result));
        }
        let report = IngestReport { outcomes };
        tracing::info!(
            succeeded = report.succeeded().count(),
            failed = report.failed().count(),
            "batch ingest finished"
        );
        report
    }

    /// Make sure a record carries a fresh embedding.
    ///
    /// Consults the persistent cache before the provider. Returns `Ok(true)` only
    /// if the provider was called.
    pub async fn ensure_embedded(&self, id: &str) -> Result<bool> {
        let version = self.provider.version();
        let Some(job) = self.store.pending_embedding(id, &version)? else {
            return Ok(false);
        };

        if let Some(cache) = &self.cache {
            match cache.lookup(&job.id, &job.text_hash) {
                Ok(Some(vector)) => match self.store.commit_embedding(&job, vector) {
                    Ok(_) => {
                        tracing::debug!(id, "embedding restored from cache");
                        return Ok(false);
                    }
                    Err(e) => tracing::warn!(id, error = %e, "cached embedding rejected"),
                },
                Ok(None) => {}
                Err(e) => tracing::warn!(id, error = %e, "embedding cache lookup failed"),
            }
        }

        self.embed_with_provider(id).await
    }

    async fn embed_with_provider(&self, id: &str) -> Result<bool> {
        let called = self
            .store
            .ensure_embedded(id, &self.provider, self.options.embed_timeout)
            .await?;
        if called {
            self.persist(id);
        }
        Ok(called)
    }

    fn persist(&self, id: &str) {
        let Some(cache) = &self.cache else { return };
        let Ok(record) = self.store.get(id) else { return };
        let Some(embedding) = record.embedding() else {
            return;
        };
        if let Err(e) = cache.store(id, &embedding.text_hash, &embedding.vector) {
            tracing::warn!(id, error = %e, "failed to persist embedding");
        }
    }

    /// Recompute one record's embedding, bypassing every cache.
    pub async fn re_embed(&self, id: &str) -> Result<()> {
        self.store.invalidate(id)?;
        self.embed_with_provider(id).await?;
        Ok(())
    }

    /// Recompute every record's embedding.
    pub async fn re_embed_all(&self) -> IngestReport {
        let mut outcomes = Vec::new();
        for record in self.store.all() {
            let id = record.id().to_string();
            let result = self.re_embed(&id).await;
            outcomes.push((id, result));
        }
        IngestReport { outcomes }
    }

    /// Remove a record and its persisted embedding.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.store.remove(id);
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.remove(id) {
                tracing::warn!(id, error = %e, "failed to drop cached embedding");
            }
        }
        removed
    }

    /// Top-N records most similar to `text`.
    pub async fn query(&self, text: &str, top_n: usize) -> Result<RankedResult> {
        self.query_filtered(text, top_n, &QueryFilter::default()).await
    }

    /// Top-N records most similar to `text` among those matching `filter`.
    pub async fn query_filtered(
        &self,
        text: &str,
        top_n: usize,
        filter: &QueryFilter,
    ) -> Result<RankedResult> {
        if top_n == 0 {
            return Ok(RankedResult::default());
        }

        let query = embed_text(&self.provider, text, self.options.embed_timeout, "query").await?;

        let version = self.provider.version();
        let candidates: Vec<Arc<Record>> = self
            .store
            .all()
            .into_iter()
            .filter(|r| r.is_embedded_by(&version) && filter.matches(r))
            .collect();

        let hits = rank(
            &query,
            &candidates,
            top_n,
            RankOptions {
                parallel_threshold: self.options.parallel_threshold,
            },
        )?;

        tracing::info!(
            top_n,
            candidates = candidates.len(),
            returned = hits.len(),
            "query completed"
        );
        Ok(RankedResult {
            hits,
            candidates: candidates.len(),
        })
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            records: self.store.len(),
            embedded: self.store.embedded_count(),
            dimension: self.store.dimension(),
            provider: self.provider.version(),
            persistent_cache: self.cache.is_some(),
        }
    }
}
