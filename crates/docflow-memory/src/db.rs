use std::path::Path;

use rusqlite::Connection;

use docflow_core::error::{DocflowError, Result};

/// Open or create a database file and apply `schema`.
pub(crate) fn open(path: &Path, schema: &str) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            DocflowError::Database(format!("Failed to create db directory: {}", e))
        })?;
    }

    let conn = Connection::open(path).map_err(|e| DocflowError::Database(e.to_string()))?;

    // WAL lets the cache and the vector store share one file
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
        .map_err(|e| DocflowError::Database(e.to_string()))?;
    conn.execute_batch(schema)
        .map_err(|e| DocflowError::Database(e.to_string()))?;
    Ok(conn)
}

pub(crate) fn in_memory(schema: &str) -> Result<Connection> {
    let conn = Connection::open_in_memory().map_err(|e| DocflowError::Database(e.to_string()))?;
    conn.execute_batch(schema)
        .map_err(|e| DocflowError::Database(e.to_string()))?;
    Ok(conn)
}
