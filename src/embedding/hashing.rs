//! Model-free feature hashing embedder.
//!
//! Each lowercase alphanumeric token is hashed with SHA-256 into one of
//! `dimensions` buckets with a ±1 sign, and the bucket counts are L2-normalized.
//! Texts that share words land close together, which is enough for offline use
//! and for tests that need a deterministic provider without model files.

use anyhow::Result;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;
use crate::vector::l2_normalize;

/// Bag-of-words embedder using the hashing trick.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dimensions: usize) -> Result<Self> {
        anyhow::ensure!(dimensions > 0, "hashing provider needs at least one dimension");
        Ok(Self { dimensions })
    }
}

/// Split text into lowercase alphanumeric tokens.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Bucket index and sign for a token.
fn bucket(token: &str, dimensions: usize) -> (usize, f32) {
    let digest = Sha256::digest(token.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let h = u64::from_le_bytes(head);
    let index = (h % dimensions as u64) as usize;
    let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
    (index, sign)
}

impl EmbeddingProvider for HashingEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            let (index, sign) = bucket(&token, self.dimensions);
            v[index] += sign;
        }
        Ok(l2_normalize(&v))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn version(&self) -> String {
        format!("hashing:sha256-bow:{}", self.dimensions)
    }
}
