//! SQL DDL for the embedding cache.
//!
//! Defines the `embeddings` table (one row per record id) and `cache_meta`
//! (schema version and the provider that produced the stored vectors). All DDL
//! uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS embeddings (
    id TEXT PRIMARY KEY,
    text_hash TEXT NOT NULL,
    provider TEXT NOT NULL,
    dimensions INTEGER NOT NULL CHECK(dimensions > 0),
    vector BLOB NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cache_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO cache_meta (key, value) VALUES ('schema_version', ?1)",
        [CURRENT_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Get the stored schema version.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM cache_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

/// Get the provider version the cached vectors belong to, if any.
pub fn get_provider(conn: &Connection) -> rusqlite::Result<Option<String>> {
    match conn.query_row(
        "SELECT value FROM cache_meta WHERE key = 'provider'",
        [],
        |row| row.get::<_, String>(0),
    ) {
        Ok(val) => Ok(Some(val)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn set_provider(conn: &Connection, provider: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO cache_meta (key, value) VALUES ('provider', ?1)",
        [provider],
    )?;
    Ok(())
}
