//! Exact top-N ranking by cosine similarity.
//!
//! Every scorable record is scored against the query (a linear scan, no
//! approximate index), then stably sorted best-first and truncated. Records whose
//! similarity is undefined (zero-norm vectors) score `-inf`, which puts them after
//! every real score, in insertion order among themselves.

use std::sync::Arc;

use rayon::prelude::*;

use super::types::{RankedHit, Record};
use crate::error::{Result, SearchError};
use crate::vector::cosine_similarity;

/// Ranking knobs.
#[derive(Debug, Clone, Copy)]
pub struct RankOptions {
    /// Record count at which scoring moves to the rayon pool.
    pub parallel_threshold: usize,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            parallel_threshold: 4096,
        }
    }
}

fn score(query: &[f32], record: &Arc<Record>, vector: &[f32]) -> Result<RankedHit> {
    let score = match cosine_similarity(query, vector) {
        Ok(s) => s,
        Err(SearchError::DegenerateVector) => f64::NEG_INFINITY,
        Err(e) => return Err(e),
    };
    Ok(RankedHit {
        record: Arc::clone(record),
        score,
    })
}

/// Score `records` against `query` and return the best `top_n`, best first.
///
/// Records without an embedding for their current text are skipped. Ties keep
/// the order of `records`. A query whose length differs from the stored
/// embeddings fails with [`SearchError::DimensionMismatch`].
pub fn rank(
    query: &[f32],
    records: &[Arc<Record>],
    top_n: usize,
    options: RankOptions,
) -> Result<Vec<RankedHit>> {
    if top_n == 0 {
        return Ok(Vec::new());
    }

    let scorable: Vec<(&Arc<Record>, &[f32])> = records
        .iter()
        .filter_map(|r| r.vector().map(|v| (r, v)))
        .collect();

    if let Some((_, first)) = scorable.first() {
        if first.len() != query.len() {
            return Err(SearchError::DimensionMismatch {
                expected: first.len(),
                actual: query.len(),
            });
        }
    }

    let mut hits: Vec<RankedHit> = if scorable.len() >= options.parallel_threshold {
        scorable
            .par_iter()
            .map(|(r, v)| score(query, r, v))
            .collect::<Result<_>>()?
    } else {
        scorable
            .iter()
            .map(|(r, v)| score(query, r, v))
            .collect::<Result<_>>()?
    };

    // Stable: equal scores keep insertion order.
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(top_n);

    tracing::trace!(
        scored = scorable.len(),
        returned = hits.len(),
        parallel = scorable.len() >= options.parallel_threshold,
        "ranked records"
    );
    Ok(hits)
}

/// Number of records `rank` would score.
pub fn scorable_count(records: &[Arc<Record>]) -> usize {
    records.iter().filter(|r| r.vector().is_some()).count()
}
