pub mod cache;
mod db;
pub mod embeddings;
pub mod grouper;
pub mod store;

pub use cache::{CacheStats, SqliteCache};
pub use embeddings::{cosine_similarity, HttpEmbeddingProvider};
pub use grouper::{EmbeddingGrouper, GroupingParams, GroupingStats};
pub use store::SqliteVectorStore;
