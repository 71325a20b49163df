//! Embedding-based similarity search over observation records.
//!
//! Sounding ingests textual records (a description plus scalar metadata such as
//! latitude, longitude, salinity, temperature, and time), computes an embedding for
//! each description, and answers free-text queries by ranking records on cosine
//! similarity between the query embedding and each record's embedding.
//!
//! ```text
//! records ──► EmbeddingProvider ──► RecordStore (cached embeddings)
//!                                        │ snapshot
//! query ────► EmbeddingProvider ──► rank ┴──► RankedResult
//! ```
//!
//! # Architecture
//!
//! - **Embeddings**: local ONNX Runtime with all-MiniLM-L6-v2 (384 dimensions), or a
//!   model-free feature hashing provider
//! - **Storage**: in-memory, insertion-ordered record store with copy-on-write entries;
//!   optional SQLite cache so embeddings survive restarts
//! - **Search**: exact linear scan, stable descending sort, deterministic tie-break by
//!   insertion order; zero-norm vectors rank last instead of failing the query
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite embedding cache keyed by record id, text hash, and provider version
//! - [`embedding`]: The [`embedding::EmbeddingProvider`] trait and its implementations
//! - [`error`]: The [`error::SearchError`] taxonomy
//! - [`records`]: Record store, ranker, and query engine
//! - [`vector`]: Dot product, norm, and cosine similarity

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod records;
pub mod vector;

pub use error::{Result, SearchError};
pub use records::query::{QueryFilter, SearchEngine};
pub use records::store::{DuplicatePolicy, RecordStore};
pub use records::types::{RankedHit, RankedResult, Record};
