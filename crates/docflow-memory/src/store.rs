use std::path::Path;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use rusqlite::{params, Connection};
use tracing::debug;

use docflow_core::error::{DocflowError, Result};
use docflow_core::traits::{EmbeddingProvider, VectorStore};
use docflow_core::types::TextChunk;

use crate::db;
use crate::embeddings::{cosine_similarity, from_blob, to_blob};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        doc_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        content TEXT NOT NULL,
        embedding BLOB NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_chunks_doc ON chunks(doc_id, position);";

/// SQLite-backed per-document chunk store with brute-force cosine search.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SqliteVectorStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let conn = db::open(path, SCHEMA)?;
        debug!(path = %path.display(), "Vector store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory(embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(db::in_memory(SCHEMA)?),
            embedder,
        })
    }

    /// Number of distinct documents with stored chunks.
    pub fn document_count(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(|e| DocflowError::Database(e.to_string()))?;
        let n: i64 = conn
            .query_row("SELECT COUNT(DISTINCT doc_id) FROM chunks", [], |row| row.get(0))
            .map_err(|e| DocflowError::Database(e.to_string()))?;
        Ok(n as usize)
    }

    /// Remove every chunk of `doc_id`. Returns the number removed.
    pub fn delete_document(&self, doc_id: &str) -> Result<usize> {
        let conn = self.conn.lock().map_err(|e| DocflowError::Database(e.to_string()))?;
        conn.execute("DELETE FROM chunks WHERE doc_id = ?1", params![doc_id])
            .map_err(|e| DocflowError::Database(e.to_string()))
    }

    fn load_rows(&self, doc_id: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let conn = self.conn.lock().map_err(|e| DocflowError::Database(e.to_string()))?;
        let mut stmt = conn
            .prepare("SELECT content, embedding FROM chunks WHERE doc_id = ?1 ORDER BY position")
            .map_err(|e| DocflowError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![doc_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| DocflowError::Database(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| DocflowError::Database(e.to_string()))?);
        }
        Ok(out)
    }
}

impl VectorStore for SqliteVectorStore {
    fn upsert<'a>(&'a self, chunks: &'a [TextChunk], doc_id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let vectors = self.embedder.embed(chunks).await?;
            if vectors.len() != chunks.len() {
                return Err(DocflowError::VectorStore(format!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    chunks.len()
                )));
            }

            let mut conn = self.conn.lock().map_err(|e| DocflowError::Database(e.to_string()))?;
            let tx = conn
                .transaction()
                .map_err(|e| DocflowError::Database(e.to_string()))?;
            // Re-embedding a document replaces its previous chunks
            tx.execute("DELETE FROM chunks WHERE doc_id = ?1", params![doc_id])
                .map_err(|e| DocflowError::Database(e.to_string()))?;
            for (position, (chunk, vector)) in chunks.iter().zip(&vectors).enumerate() {
                tx.execute(
                    "INSERT INTO chunks (doc_id, position, content, embedding) VALUES (?1, ?2, ?3, ?4)",
                    params![doc_id, position as i64, chunk, to_blob(vector)],
                )
                .map_err(|e| DocflowError::Database(e.to_string()))?;
            }
            tx.commit().map_err(|e| DocflowError::Database(e.to_string()))?;

            debug!(doc_id, chunks = chunks.len(), "Stored document chunks");
            Ok(())
        })
    }

    fn similarity_search<'a>(
        &'a self,
        doc_id: &'a str,
        query: &'a str,
        k: usize,
    ) -> BoxFuture<'a, Result<Vec<TextChunk>>> {
        Box::pin(async move {
            let query_vec = self
                .embedder
                .embed(&[query.to_string()])
                .await?
                .pop()
                .ok_or_else(|| DocflowError::Embedding("no vector for query".into()))?;

            let mut scored: Vec<(f32, String)> = self
                .load_rows(doc_id)?
                .into_iter()
                .map(|(content, blob)| (cosine_similarity(&query_vec, &from_blob(&blob)), content))
                .collect();

            // Stable sort keeps document order among equal scores
            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(k);
            Ok(scored.into_iter().map(|(_, c)| c).collect())
        })
    }

    fn get_all<'a>(&'a self, doc_id: &'a str) -> BoxFuture<'a, Result<Vec<TextChunk>>> {
        Box::pin(async move {
            Ok(self.load_rows(doc_id)?.into_iter().map(|(c, _)| c).collect())
        })
    }

    fn has_chunks<'a>(&'a self, doc_id: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let conn = self.conn.lock().map_err(|e| DocflowError::Database(e.to_string()))?;
            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM chunks WHERE doc_id = ?1)",
                    params![doc_id],
                    |row| row.get(0),
                )
                .map_err(|e| DocflowError::Database(e.to_string()))?;
            Ok(exists)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_test_utils::MockEmbedder;

    fn store() -> SqliteVectorStore {
        let embedder = MockEmbedder::by_keywords(&["rust", "python", "memory"]);
        SqliteVectorStore::in_memory(Arc::new(embedder)).unwrap()
    }

    fn chunks(items: &[&str]) -> Vec<TextChunk> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_upsert_and_get_all() {
        let store = store();
        assert!(!store.has_chunks("doc").await.unwrap());

        store
            .upsert(&chunks(&["rust intro", "python intro", "memory model"]), "doc")
            .await
            .unwrap();
        assert!(store.has_chunks("doc").await.unwrap());
        assert!(!store.has_chunks("other").await.unwrap());
        assert_eq!(
            store.get_all("doc").await.unwrap(),
            chunks(&["rust intro", "python intro", "memory model"])
        );
    }

    #[tokio::test]
    async fn test_upsert_replaces_document() {
        let store = store();
        store.upsert(&chunks(&["old"]), "doc").await.unwrap();
        store.upsert(&chunks(&["new a", "new b"]), "doc").await.unwrap();
        assert_eq!(store.get_all("doc").await.unwrap(), chunks(&["new a", "new b"]));
        assert_eq!(store.document_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_similarity_search_ranks_and_scopes() {
        let store = store();
        store
            .upsert(
                &chunks(&["python scripts", "rust memory safety", "rust rust rust"]),
                "doc",
            )
            .await
            .unwrap();
        store.upsert(&chunks(&["rust elsewhere"]), "other").await.unwrap();

        let hits = store.similarity_search("doc", "rust", 2).await.unwrap();
        assert_eq!(hits, chunks(&["rust rust rust", "rust memory safety"]));

        let hits = store.similarity_search("doc", "python", 10).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0], "python scripts");
    }

    #[tokio::test]
    async fn test_delete_document() {
        let store = store();
        store.upsert(&chunks(&["a", "b"]), "doc").await.unwrap();
        assert_eq!(store.delete_document("doc").unwrap(), 2);
        assert!(!store.has_chunks("doc").await.unwrap());
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let store = SqliteVectorStore::in_memory(Arc::new(MockEmbedder::failing())).unwrap();
        let err = store.upsert(&chunks(&["a"]), "doc").await.unwrap_err();
        assert!(matches!(err, DocflowError::Embedding(_)));
        assert!(!store.has_chunks("doc").await.unwrap());
    }
}
