pub mod cache;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Open (or create) the embedding cache database at the given path with the
/// schema initialized.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // WAL keeps readers from blocking on the writer
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(std::time::Duration::from_millis(5000))?;

    schema::init_schema(&conn).context("failed to initialize schema")?;

    tracing::info!(path = %path.display(), "embedding cache database opened");
    Ok(conn)
}

/// Open an in-memory database with the schema initialized.
pub fn open_memory_database() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    Ok(conn)
}

/// Little-endian bytes of an embedding, as stored in the `vector` column.
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Inverse of [`vector_to_bytes`]. `None` if the length is not `dimensions * 4`.
pub fn bytes_to_vector(bytes: &[u8], dimensions: usize) -> Option<Vec<f32>> {
    if bytes.len() != dimensions * std::mem::size_of::<f32>() {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_bytes_round_trip() {
        let v = vec![0.25f32, -1.5, 3.0e-7];
        let bytes = vector_to_bytes(&v);
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes_to_vector(&bytes, 3), Some(v));
    }

    #[test]
    fn bytes_with_wrong_length_are_rejected() {
        assert_eq!(bytes_to_vector(&[0u8; 10], 3), None);
        assert_eq!(bytes_to_vector(&[0u8; 12], 2), None);
    }

    #[test]
    fn open_database_creates_parent_dirs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("cache.db");
        let conn = open_database(&path).unwrap();
        assert!(path.exists());
        assert_eq!(
            schema::get_schema_version(&conn).unwrap(),
            schema::CURRENT_SCHEMA_VERSION
        );
    }
}
