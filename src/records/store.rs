//! The authoritative in-memory collection of records.
//!
//! Records live in an insertion-ordered map behind a single `RwLock`. Entries are
//! `Arc<Record>` and are never mutated in place: attaching an embedding swaps in a
//! new `Arc`, so a snapshot taken by [`RecordStore::all`] is unaffected by later
//! writes. Embedding runs outside the lock; only the commit takes the write lock.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::types::{Embedding, InsertOutcome, Record};
use crate::embedding::{embed_text, EmbeddingProvider};
use crate::error::{Result, SearchError};

/// What to do when an inserted record's id already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Swap in the new record, keeping the original insertion position.
    #[default]
    Replace,
    /// Fail with [`SearchError::DuplicateId`] and leave the store unchanged.
    Reject,
}

impl std::str::FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "replace" => Ok(Self::Replace),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("unknown duplicate policy: {s}. Supported: replace, reject")),
        }
    }
}

/// Work item for computing one record's embedding outside the lock.
#[derive(Debug, Clone)]
pub struct EmbedJob {
    pub id: String,
    pub text: String,
    pub text_hash: String,
    pub provider: String,
}

#[derive(Debug, Default)]
struct Inner {
    records: IndexMap<String, Arc<Record>>,
    dimension: Option<usize>,
}

#[derive(Debug, Default)]
pub struct RecordStore {
    inner: RwLock<Inner>,
    policy: DuplicatePolicy,
}

fn check_vector(vector: &[f32]) -> Result<()> {
    if vector.is_empty() {
        return Err(SearchError::invalid_argument("embedding has zero dimensions"));
    }
    if !crate::vector::is_finite(vector) {
        return Err(SearchError::invalid_argument(
            "embedding contains non-finite components",
        ));
    }
    Ok(())
}

fn check_dimension(store: Option<usize>, actual: usize) -> Result<()> {
    match store {
        Some(expected) if expected != actual => {
            Err(SearchError::DimensionMismatch { expected, actual })
        }
        _ => Ok(()),
    }
}

impl RecordStore {
    /// Empty store; the dimension is fixed by the first embedding it receives.
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            policy,
        }
    }

    /// Empty store with the dimension fixed up front.
    pub fn with_dimension(dimension: usize, policy: DuplicatePolicy) -> Result<Self> {
        if dimension == 0 {
            return Err(SearchError::invalid_argument("store dimension must be positive"));
        }
        Ok(Self {
            inner: RwLock::new(Inner {
                records: IndexMap::new(),
                dimension: Some(dimension),
            }),
            policy,
        })
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    pub fn dimension(&self) -> Option<usize> {
        self.inner.read().dimension
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    /// Records carrying an embedding for their current text.
    pub fn embedded_count(&self) -> usize {
        self.inner
            .read()
            .records
            .values()
            .filter(|r| r.vector().is_some())
            .count()
    }

    /// Insert a record, or replace the one with the same id.
    ///
    /// A carried embedding is validated against the store dimension (or fixes it,
    /// for the first one). On error the store is unchanged.
    pub fn insert_or_replace(&self, record: Record) -> Result<InsertOutcome> {
        if let Some(embedding) = record.embedding() {
            check_vector(&embedding.vector)?;
        }

        let mut inner = self.inner.write();
        if let Some(embedding) = record.embedding() {
            check_dimension(inner.dimension, embedding.dimensions())?;
        }

        let exists = inner.records.contains_key(record.id());
        if exists && self.policy == DuplicatePolicy::Reject {
            return Err(SearchError::DuplicateId(record.id().to_string()));
        }

        if let Some(embedding) = record.embedding() {
            inner.dimension.get_or_insert(embedding.dimensions());
        }
        tracing::debug!(id = record.id(), replaced = exists, "record stored");
        inner.records.insert(record.id().to_string(), Arc::new(record));

        Ok(if exists {
            InsertOutcome::Replaced
        } else {
            InsertOutcome::Inserted
        })
    }

    pub fn get(&self, id: &str) -> Result<Arc<Record>> {
        self.inner
            .read()
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| SearchError::NotFound(id.to_string()))
    }

    /// Remove a record. Returns `true` if something was removed.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.inner.write().records.shift_remove(id).is_some();
        if removed {
            tracing::debug!(id, "record removed");
        }
        removed
    }

    /// Snapshot of every record in insertion order.
    pub fn all(&self) -> Vec<Arc<Record>> {
        self.inner.read().records.values().cloned().collect()
    }

    /// Drop a record's cached embedding so the next ensure recomputes it.
    pub fn invalidate(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let slot = inner
            .records
            .get_mut(id)
            .ok_or_else(|| SearchError::NotFound(id.to_string()))?;
        if slot.embedding().is_some() {
            *slot = Arc::new(slot.replace_embedding(None));
        }
        Ok(())
    }

    /// First half of [`ensure_embedded`](Self::ensure_embedded): `None` if the record
    /// already has a fresh embedding from `provider`.
    pub fn pending_embedding(&self, id: &str, provider: &str) -> Result<Option<EmbedJob>> {
        let record = self.get(id)?;
        if record.is_embedded_by(provider) {
            return Ok(None);
        }
        Ok(Some(EmbedJob {
            id: record.id().to_string(),
            text: record.text().to_string(),
            text_hash: record.text_hash().to_string(),
            provider: provider.to_string(),
        }))
    }

    /// Second half of [`ensure_embedded`](Self::ensure_embedded): attach `vector`.
    ///
    /// Returns `Ok(false)` without writing if the record was replaced with different
    /// text while the job ran, or if another caller already committed.
    pub fn commit_embedding(&self, job: &EmbedJob, vector: Vec<f32>) -> Result<bool> {
        check_vector(&vector)?;

        let mut inner = self.inner.write();
        check_dimension(inner.dimension, vector.len())?;

        let Some(current) = inner.records.get(&job.id).cloned() else {
            return Err(SearchError::NotFound(job.id.clone()));
        };
        if current.text_hash() != job.text_hash {
            tracing::debug!(id = %job.id, "record replaced during embedding, discarding result");
            return Ok(false);
        }
        if current.is_embedded_by(&job.provider) {
            return Ok(false);
        }

        inner.dimension.get_or_insert(vector.len());
        let embedded = current.replace_embedding(Some(Embedding {
            vector: vector.into(),
            text_hash: job.text_hash.clone(),
            provider: job.provider.clone(),
        }));
        inner.records.insert(job.id.clone(), Arc::new(embedded));
        Ok(true)
    }

    /// Compute and cache a record's embedding unless a fresh one exists.
    ///
    /// Returns `Ok(true)` if the provider was called and the result committed. The
    /// provider runs with no lock held; if this future is dropped or times out
    /// before the commit, the record is left without an embedding.
    pub async fn ensure_embedded(
        &self,
        id: &str,
        provider: &Arc<dyn EmbeddingProvider>,
        timeout: Option<Duration>,
    ) -> Result<bool> {
        let Some(job) = self.pending_embedding(id, &provider.version())? else {
            return Ok(false);
        };
        check_dimension(self.dimension(), provider.dimensions())?;

        let vector = embed_text(provider, &job.text, timeout, &job.id).await?;
        self.commit_embedding(&job, vector)
    }
}
