//! Text-to-vector embedding providers.
//!
//! Provides the [`EmbeddingProvider`] trait, a local ONNX implementation using
//! all-MiniLM-L6-v2 (384 dimensions, L2-normalized), and a model-free feature
//! hashing implementation. Providers are created via [`create_provider`] from
//! configuration.

pub mod hashing;
pub mod local;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::error::SearchError;

/// Number of dimensions produced by all-MiniLM-L6-v2.
pub const MINILM_DIM: usize = 384;

/// Trait for embedding text into vectors.
///
/// Implementations must be deterministic: identical input yields an identical
/// vector of exactly [`dimensions`](EmbeddingProvider::dimensions) components.
/// All methods are synchronous; async callers go through [`embed_text`].
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of text strings. Implementations may override for batched inference.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Number of dimensions this provider produces.
    fn dimensions(&self) -> usize;

    /// Identifier tagged onto every embedding this provider produces.
    ///
    /// Cached embeddings with a different version are treated as stale.
    fn version(&self) -> String;
}

/// Create an embedding provider from config.
///
/// `"local"` loads the ONNX model (run `sounding model download` first);
/// `"hashing"` needs no model files.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "local" => {
            let provider = local::LocalEmbeddingProvider::new(config)?;
            Ok(Box::new(provider))
        }
        "hashing" => {
            let provider = hashing::HashingEmbeddingProvider::new(config.dimensions)?;
            Ok(Box::new(provider))
        }
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: local, hashing"),
    }
}

/// Run the provider on the blocking pool, optionally time-boxed.
///
/// `target` names what is being embedded (a record id or `"query"`) and ends up in
/// the [`SearchError::EmbeddingFailure`] message. The output is checked against the
/// provider's declared dimension and for non-finite components. Dropping the
/// returned future abandons the result; nothing is written anywhere.
pub async fn embed_text(
    provider: &Arc<dyn EmbeddingProvider>,
    text: &str,
    timeout: Option<Duration>,
    target: &str,
) -> crate::error::Result<Vec<f32>> {
    let ep = Arc::clone(provider);
    let owned = text.to_string();
    let task = tokio::task::spawn_blocking(move || ep.embed(&owned));

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(target_id = target, timeout_ms = limit.as_millis() as u64, "embedding timed out");
                return Err(SearchError::embedding_failure(
                    target,
                    format!("timed out after {}ms", limit.as_millis()),
                ));
            }
        },
        None => task.await,
    };

    let vector = joined
        .map_err(|e| SearchError::embedding_failure(target, format!("provider task failed: {e}")))?
        .map_err(|e| SearchError::embedding_failure(target, format!("{e:#}")))?;

    let expected = provider.dimensions();
    if vector.len() != expected {
        return Err(SearchError::embedding_failure(
            target,
            format!("provider returned {} dimensions, expected {expected}", vector.len()),
        ));
    }
    if !crate::vector::is_finite(&vector) {
        return Err(SearchError::embedding_failure(
            target,
            "provider returned non-finite components",
        ));
    }
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider(Vec<f32>);

    impl EmbeddingProvider for FixedProvider {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
        fn dimensions(&self) -> usize {
            3
        }
        fn version(&self) -> String {
            "fixed".into()
        }
    }

    struct SlowProvider;

    impl EmbeddingProvider for SlowProvider {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(vec![1.0])
        }
        fn dimensions(&self) -> usize {
            1
        }
        fn version(&self) -> String {
            "slow".into()
        }
    }

    struct FailingProvider;

    impl EmbeddingProvider for FailingProvider {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            anyhow::bail!("model exploded")
        }
        fn dimensions(&self) -> usize {
            3
        }
        fn version(&self) -> String {
            "failing".into()
        }
    }

    #[tokio::test]
    async fn embed_text_returns_vector() {
        let p: Arc<dyn EmbeddingProvider> = Arc::new(FixedProvider(vec![1.0, 2.0, 3.0]));
        let v = embed_text(&p, "hi", None, "query").await.unwrap();
        assert_eq!(v, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn embed_text_rejects_wrong_dimension() {
        let p: Arc<dyn EmbeddingProvider> = Arc::new(FixedProvider(vec![1.0, 2.0]));
        let err = embed_text(&p, "hi", None, "r1").await.unwrap_err();
        assert!(matches!(err, SearchError::EmbeddingFailure { ref target, .. } if target == "r1"));
    }

    #[tokio::test]
    async fn embed_text_rejects_non_finite() {
        let p: Arc<dyn EmbeddingProvider> = Arc::new(FixedProvider(vec![1.0, f32::NAN, 0.0]));
        let err = embed_text(&p, "hi", None, "r1").await.unwrap_err();
        assert!(matches!(err, SearchError::EmbeddingFailure { .. }));
    }

    #[tokio::test]
    async fn embed_text_wraps_provider_error() {
        let p: Arc<dyn EmbeddingProvider> = Arc::new(FailingProvider);
        let err = embed_text(&p, "hi", None, "query").await.unwrap_err();
        assert!(err.to_string().contains("model exploded"));
    }

    #[tokio::test]
    async fn embed_text_times_out() {
        let p: Arc<dyn EmbeddingProvider> = Arc::new(SlowProvider);
        let err = embed_text(&p, "hi", Some(Duration::from_millis(20)), "query")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn create_provider_rejects_unknown() {
        let mut config = crate::config::EmbeddingConfig::default();
        config.provider = "bogus".into();
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn create_provider_builds_hashing() {
        let mut config = crate::config::EmbeddingConfig::default();
        config.provider = "hashing".into();
        config.dimensions = 64;
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.dimensions(), 64);
        assert_eq!(provider.embed("salinity").unwrap().len(), 64);
    }
}
