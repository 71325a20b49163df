//! Persistent embedding cache.
//!
//! Stores one vector per record id, tagged with the text hash it was computed
//! from and the provider version. A lookup only hits when every tag matches, and
//! opening the cache under a different provider version discards all rows.

use std::path::Path;

use anyhow::Result as AnyResult;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::{bytes_to_vector, schema, vector_to_bytes};
use crate::error::Result;

/// Cache diagnostics for `sounding doctor`.
#[derive(Debug, Serialize)]
pub struct CacheHealth {
    pub schema_version: u32,
    pub provider: Option<String>,
    pub entries: usize,
    pub integrity_ok: bool,
    pub integrity_details: String,
}

pub struct EmbeddingCache {
    conn: Mutex<Connection>,
    provider: String,
}

impl EmbeddingCache {
    /// Open the cache file for `provider`, clearing it if it holds another provider's vectors.
    pub fn open(path: impl AsRef<Path>, provider: &str) -> AnyResult<Self> {
        let conn = super::open_database(path)?;
        Ok(Self::attach(conn, provider)?)
    }

    pub fn open_in_memory(provider: &str) -> AnyResult<Self> {
        let conn = super::open_memory_database()?;
        Ok(Self::attach(conn, provider)?)
    }

    fn attach(conn: Connection, provider: &str) -> Result<Self> {
        let stored = schema::get_provider(&conn)?;
        if stored.as_deref() != Some(provider) {
            let dropped = conn.execute("DELETE FROM embeddings", [])?;
            if let Some(old) = stored {
                tracing::warn!(
                    stored = %old,
                    configured = provider,
                    dropped,
                    "embedding provider changed, cached vectors invalidated"
                );
            }
            schema::set_provider(&conn, provider)?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
            provider: provider.to_string(),
        })
    }

    /// Provider version this cache serves.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Cached vector for `id`, if it was computed from text with `text_hash`.
    ///
    /// Rows whose blob length disagrees with their dimension are treated as misses.
    pub fn lookup(&self, id: &str, text_hash: &str) -> Result<Option<Vec<f32>>> {
        let conn = self.conn.lock();
        let row: Option<(usize, Vec<u8>)> = conn
            .query_row(
                "SELECT dimensions, vector FROM embeddings \
                 WHERE id = ?1 AND text_hash = ?2 AND provider = ?3",
                params![id, text_hash, self.provider],
                |row| Ok((row.get::<_, i64>(0)? as usize, row.get(1)?)),
            )
            .optional()?;

        Ok(row.and_then(|(dims, bytes)| {
            let vector = bytes_to_vector(&bytes, dims);
            if vector.is_none() {
                tracing::warn!(id, dims, bytes = bytes.len(), "corrupt cached embedding ignored");
            }
            vector
        }))
    }

    /// Insert or overwrite the vector for `id`.
    pub fn store(&self, id: &str, text_hash: &str, vector: &[f32]) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO embeddings (id, text_hash, provider, dimensions, vector, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                text_hash,
                self.provider,
                vector.len() as i64,
                vector_to_bytes(vector),
                now
            ],
        )?;
        Ok(())
    }

    /// Drop the row for `id`. Returns `true` if one existed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .lock()
            .execute("DELETE FROM embeddings WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Drop every row. Returns the number removed.
    pub fn clear(&self) -> Result<usize> {
        Ok(self.conn.lock().execute("DELETE FROM embeddings", [])?)
    }

    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Schema version, stored provider, row count, and `PRAGMA integrity_check`.
    pub fn health(&self) -> Result<CacheHealth> {
        let conn = self.conn.lock();
        let schema_version = schema::get_schema_version(&conn)?;
        let provider = schema::get_provider(&conn)?;
        let entries: i64 = conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        let integrity_details: String =
            conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(CacheHealth {
            schema_version,
            provider,
            entries: entries as usize,
            integrity_ok: integrity_details == "ok",
            integrity_details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_lookup_hits() {
        let cache = EmbeddingCache::open_in_memory("p1").unwrap();
        cache.store("a", "h1", &[1.0, 2.0]).unwrap();
        assert_eq!(cache.lookup("a", "h1").unwrap(), Some(vec![1.0, 2.0]));
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn changed_text_hash_misses() {
        let cache = EmbeddingCache::open_in_memory("p1").unwrap();
        cache.store("a", "h1", &[1.0]).unwrap();
        assert_eq!(cache.lookup("a", "h2").unwrap(), None);
        assert_eq!(cache.lookup("b", "h1").unwrap(), None);
    }

    #[test]
    fn store_overwrites() {
        let cache = EmbeddingCache::open_in_memory("p1").unwrap();
        cache.store("a", "h1", &[1.0]).unwrap();
        cache.store("a", "h2", &[2.0]).unwrap();
        assert_eq!(cache.len().unwrap(), 1);
        assert_eq!(cache.lookup("a", "h2").unwrap(), Some(vec![2.0]));
    }

    #[test]
    fn remove_and_clear() {
        let cache = EmbeddingCache::open_in_memory("p1").unwrap();
        cache.store("a", "h", &[1.0]).unwrap();
        cache.store("b", "h", &[1.0]).unwrap();
        assert!(cache.remove("a").unwrap());
        assert!(!cache.remove("a").unwrap());
        assert_eq!(cache.clear().unwrap(), 1);
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn corrupt_row_is_a_miss() {
        let cache = EmbeddingCache::open_in_memory("p1").unwrap();
        cache.store("a", "h", &[1.0, 2.0]).unwrap();
        cache
            .conn
            .lock()
            .execute("UPDATE embeddings SET dimensions = 3 WHERE id = 'a'", [])
            .unwrap();
        assert_eq!(cache.lookup("a", "h").unwrap(), None);
    }

    #[test]
    fn health_reports_state() {
        let cache = EmbeddingCache::open_in_memory("p1").unwrap();
        cache.store("a", "h", &[1.0]).unwrap();
        let health = cache.health().unwrap();
        assert!(health.integrity_ok);
        assert_eq!(health.entries, 1);
        assert_eq!(health.provider.as_deref(), Some("p1"));
        assert_eq!(health.schema_version, schema::CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn provider_change_invalidates_file_cache() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("cache.db");

        let cache = EmbeddingCache::open(&path, "model-v1").unwrap();
        cache.store("a", "h", &[1.0, 0.0]).unwrap();
        drop(cache);

        let same = EmbeddingCache::open(&path, "model-v1").unwrap();
        assert_eq!(same.lookup("a", "h").unwrap(), Some(vec![1.0, 0.0]));
        drop(same);

        let upgraded = EmbeddingCache::open(&path, "model-v2").unwrap();
        assert!(upgraded.is_empty().unwrap());
        assert_eq!(upgraded.lookup("a", "h").unwrap(), None);
    }
}
