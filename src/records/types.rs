//! Record, embedding, and result type definitions.
//!
//! A [`Record`] is immutable once built; the store swaps whole `Arc<Record>`
//! values when an embedding is attached, so snapshots never change under a reader.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::text_hash;

/// A scalar metadata value carried through for display and filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl MetadataValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a CLI-style literal: `true`/`false`, a number, or text.
    pub fn parse_literal(s: &str) -> Self {
        match s {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => s
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Self::Number)
                .unwrap_or_else(|| Self::Text(s.to_string())),
        }
    }
}

impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// A cached embedding, tagged with what it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Arc<[f32]>,
    /// Hex SHA-256 of the source text.
    pub text_hash: String,
    /// [`EmbeddingProvider::version`](crate::embedding::EmbeddingProvider::version) of the producer.
    pub provider: String,
}

impl Embedding {
    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }
}

/// A searchable record.
#[derive(Debug, Clone)]
pub struct Record {
    id: String,
    text: String,
    text_hash: String,
    metadata: Metadata,
    embedding: Option<Embedding>,
}

impl Record {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: id.into(),
            text_hash: text_hash(&text),
            text,
            metadata: Metadata::new(),
            embedding: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add a single metadata field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach a precomputed embedding for this record's current text.
    pub fn with_embedding(mut self, vector: Vec<f32>, provider: impl Into<String>) -> Self {
        self.embedding = Some(Embedding {
            vector: vector.into(),
            text_hash: self.text_hash.clone(),
            provider: provider.into(),
        });
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn text_hash(&self) -> &str {
        &self.text_hash
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn embedding(&self) -> Option<&Embedding> {
        self.embedding.as_ref()
    }

    /// Embedding vector, if one is present and was computed from the current text.
    pub fn vector(&self) -> Option<&[f32]> {
        self.embedding
            .as_ref()
            .filter(|e| e.text_hash == self.text_hash)
            .map(|e| &*e.vector)
    }

    /// `true` if the embedding matches the current text and `provider`.
    pub fn is_embedded_by(&self, provider: &str) -> bool {
        self.embedding
            .as_ref()
            .is_some_and(|e| e.text_hash == self.text_hash && e.provider == provider)
    }

    pub(crate) fn replace_embedding(&self, embedding: Option<Embedding>) -> Self {
        Self {
            embedding,
            ..self.clone()
        }
    }
}

/// One ranked hit: a record reference and its similarity to the query.
#[derive(Debug, Clone)]
pub struct RankedHit {
    pub record: Arc<Record>,
    /// Cosine similarity, or `f64::NEG_INFINITY` if either vector had zero norm.
    pub score: f64,
}

impl RankedHit {
    /// `true` if the similarity could not be computed (zero-norm vector).
    pub fn is_degenerate(&self) -> bool {
        self.score == f64::NEG_INFINITY
    }
}

/// Ordered query result, best first.
#[derive(Debug, Clone, Default)]
pub struct RankedResult {
    pub hits: Vec<RankedHit>,
    /// Scorable records considered after filtering.
    pub candidates: usize,
}

impl RankedResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.record.id()).collect()
    }
}

/// Display form of a hit, for JSON output.
#[derive(Debug, Serialize)]
pub struct HitView<'a> {
    pub rank: usize,
    pub id: &'a str,
    pub text: &'a str,
    /// `None` for degenerate hits.
    pub score: Option<f64>,
    pub metadata: &'a Metadata,
}

impl RankedResult {
    pub fn views(&self) -> Vec<HitView<'_>> {
        self.hits
            .iter()
            .enumerate()
            .map(|(i, h)| HitView {
                rank: i + 1,
                id: h.record.id(),
                text: h.record.text(),
                score: (!h.is_degenerate()).then_some(h.score),
                metadata: h.record.metadata(),
            })
            .collect()
    }
}

/// Whether an insert added a record or replaced one with the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Replaced,
}

/// Per-record outcome of a bulk operation.
#[derive(Debug)]
pub struct IngestReport {
    pub outcomes: Vec<(String, crate::error::Result<()>)>,
}

impl IngestReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|(_, r)| r.is_ok())
            .map(|(id, _)| id.as_str())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &crate::error::SearchError)> {
        self.outcomes
            .iter()
            .filter_map(|(id, r)| r.as_ref().err().map(|e| (id.as_str(), e)))
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|(_, r)| r.is_ok())
    }
}

/// Record as it appears in a JSON records file.
///
/// `description` is accepted in place of `text`; a missing `id` gets a UUID v7.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(alias = "description")]
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl From<RecordInput> for Record {
    fn from(input: RecordInput) -> Self {
        let id = input
            .id
            .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
        Record::new(id, input.text).with_metadata(input.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_hash_tracks_text() {
        let a = Record::new("a", "Surface water profile near 70°E");
        let b = Record::new("b", "Surface water profile near 70°E");
        let c = Record::new("a", "10m depth reading in the Indian Ocean");
        assert_eq!(a.text_hash(), b.text_hash());
        assert_ne!(a.text_hash(), c.text_hash());
        assert_eq!(a.text_hash().len(), 64);
    }

    #[test]
    fn test_with_embedding_is_fresh() {
        let r = Record::new("a", "x").with_embedding(vec![1.0, 0.0], "p1");
        assert!(r.is_embedded_by("p1"));
        assert!(!r.is_embedded_by("p2"));
        assert_eq!(r.vector(), Some(&[1.0, 0.0][..]));
    }

    #[test]
    fn test_metadata_untagged_json() {
        let json = r#"{"latitude": 0, "time": "2023-03-01", "qc": true}"#;
        let m: Metadata = serde_json::from_str(json).unwrap();
        assert_eq!(m["latitude"], MetadataValue::Number(0.0));
        assert_eq!(m["time"], MetadataValue::Text("2023-03-01".into()));
        assert_eq!(m["qc"], MetadataValue::Bool(true));
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(MetadataValue::parse_literal("35.1"), MetadataValue::Number(35.1));
        assert_eq!(MetadataValue::parse_literal("false"), MetadataValue::Bool(false));
        assert_eq!(
            MetadataValue::parse_literal("2023-03-01"),
            MetadataValue::Text("2023-03-01".into())
        );
        assert_eq!(MetadataValue::parse_literal("NaN"), MetadataValue::Text("NaN".into()));
    }

    #[test]
    fn test_record_input_accepts_description() {
        let json = r#"{"description": "20m depth temperature and salinity data", "metadata": {"salinity": 34.9}}"#;
        let input: RecordInput = serde_json::from_str(json).unwrap();
        let record = Record::from(input);
        assert_eq!(record.text(), "20m depth temperature and salinity data");
        assert!(!record.id().is_empty());
        assert_eq!(record.metadata()["salinity"].as_f64(), Some(34.9));
    }

    #[test]
    fn test_degenerate_hit() {
        let hit = RankedHit {
            record: Arc::new(Record::new("z", "zero")),
            score: f64::NEG_INFINITY,
        };
        assert!(hit.is_degenerate());
        let result = RankedResult {
            hits: vec![hit],
            candidates: 1,
        };
        assert_eq!(result.views()[0].score, None);
    }
}
