pub mod query;
pub mod rank;
pub mod store;
pub mod types;

use sha2::{Digest, Sha256};

/// Hex SHA-256 of a record's text; the staleness key for cached embeddings.
pub fn text_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
