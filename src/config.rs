use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::records::query::EngineOptions;
use crate::records::store::DuplicatePolicy;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SoundingConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file holding persisted embeddings.
    pub cache_path: String,
    /// Set to `false` to keep embeddings in memory only.
    pub persist: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"local"` (ONNX) or `"hashing"`.
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
    /// Output dimension of the hashing provider. The local model is fixed at 384.
    pub dimensions: usize,
    /// Per-call limit on a single embed. `0` disables the limit.
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_n: i64,
    /// `"replace"` or `"reject"`.
    pub duplicate_policy: String,
    /// Record count at which scoring switches to the rayon pool.
    pub parallel_threshold: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let cache_path = default_sounding_dir()
            .join("embeddings.db")
            .to_string_lossy()
            .into_owned();
        Self {
            cache_path,
            persist: true,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_sounding_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
            dimensions: crate::embedding::MINILM_DIM,
            timeout_secs: 30,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_n: 5,
            duplicate_policy: "replace".into(),
            parallel_threshold: 4096,
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Returns `~/.sounding/`, or `./.sounding/` when no home directory is known.
pub fn default_sounding_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sounding")
}

/// Returns the default config file path: `~/.sounding/config.toml`
pub fn default_config_path() -> PathBuf {
    default_sounding_dir().join("config.toml")
}

impl SoundingConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            SoundingConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (SOUNDING_CACHE, SOUNDING_PROVIDER, SOUNDING_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SOUNDING_CACHE") {
            self.storage.cache_path = val;
        }
        if let Ok(val) = std::env::var("SOUNDING_PROVIDER") {
            self.embedding.provider = val;
        }
        if let Ok(val) = std::env::var("SOUNDING_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Resolve the embedding cache path, expanding `~` if needed.
    pub fn resolved_cache_path(&self) -> PathBuf {
        expand_tilde(&self.storage.cache_path)
    }

    pub fn duplicate_policy(&self) -> Result<DuplicatePolicy> {
        self.retrieval
            .duplicate_policy
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
    }

    /// Default result count, validated as a non-negative integer.
    pub fn default_top_n(&self) -> Result<usize> {
        crate::records::query::parse_top_n(self.retrieval.default_top_n)
            .context("invalid retrieval.default_top_n")
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            embed_timeout: self.embedding.timeout(),
            parallel_threshold: self.retrieval.parallel_threshold,
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SoundingConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.embedding.dimensions, 384);
        assert_eq!(config.retrieval.default_top_n, 5);
        assert!(config.storage.persist);
        assert!(config.storage.cache_path.ends_with("embeddings.db"));
        assert_eq!(config.duplicate_policy().unwrap(), DuplicatePolicy::Replace);
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[logging]
level = "debug"

[storage]
cache_path = "/tmp/test-embeddings.db"
persist = false

[embedding]
provider = "hashing"
dimensions = 128
timeout_secs = 0

[retrieval]
default_top_n = 10
duplicate_policy = "reject"
"#;
        let config: SoundingConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.storage.cache_path, "/tmp/test-embeddings.db");
        assert!(!config.storage.persist);
        assert_eq!(config.embedding.provider, "hashing");
        assert_eq!(config.embedding.dimensions, 128);
        assert!(config.embedding.timeout().is_none());
        assert_eq!(config.default_top_n().unwrap(), 10);
        assert_eq!(config.duplicate_policy().unwrap(), DuplicatePolicy::Reject);
        // defaults still apply for unset fields
        assert_eq!(config.embedding.model, "all-MiniLM-L6-v2");
        assert_eq!(config.retrieval.parallel_threshold, 4096);
    }

    #[test]
    fn negative_top_n_is_rejected() {
        let mut config = SoundingConfig::default();
        config.retrieval.default_top_n = -1;
        assert!(config.default_top_n().is_err());
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let mut config = SoundingConfig::default();
        config.retrieval.duplicate_policy = "merge".into();
        assert!(config.duplicate_policy().is_err());
    }

    #[test]
    fn engine_options_follow_config() {
        let config = SoundingConfig::default();
        let options = config.engine_options();
        assert_eq!(options.embed_timeout, Some(Duration::from_secs(30)));
        assert_eq!(options.parallel_threshold, 4096);
    }

    #[test]
    fn expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/var/data.db"), PathBuf::from("/var/data.db"));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = SoundingConfig::default();
        std::env::set_var("SOUNDING_CACHE", "/tmp/override.db");
        std::env::set_var("SOUNDING_PROVIDER", "hashing");
        std::env::set_var("SOUNDING_LOG_LEVEL", "trace");

        config.apply_env_overrides();

        assert_eq!(config.storage.cache_path, "/tmp/override.db");
        assert_eq!(config.embedding.provider, "hashing");
        assert_eq!(config.logging.level, "trace");

        // Clean up
        std::env::remove_var("SOUNDING_CACHE");
        std::env::remove_var("SOUNDING_PROVIDER");
        std::env::remove_var("SOUNDING_LOG_LEVEL");
    }
}
