//! Collaborator ports consumed by the workflow engine.
//!
//! Every port is object-safe and async via `BoxFuture`, so workflows hold
//! them as `Arc<dyn Port>` and tests swap in mocks.

use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{PageChunk, RunLogRecord, TextChunk};

/// Source document fetching and chunking.
pub trait DocumentLoader: Send + Sync + 'static {
    /// Fetch `url` and split it into ordered plain-text chunks.
    ///
    /// Fails with `ContentExtraction` on empty or unreadable input.
    fn load<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<TextChunk>>>;

    /// Fetch `url` as page-tagged chunks that keep their figure references.
    fn load_pages<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<PageChunk>>>;
}

/// Per-document chunk storage with similarity search.
pub trait VectorStore: Send + Sync + 'static {
    fn upsert<'a>(&'a self, chunks: &'a [TextChunk], doc_id: &'a str)
        -> BoxFuture<'a, Result<()>>;

    /// Top-`k` chunks of `doc_id` most similar to `query`, best first.
    fn similarity_search<'a>(
        &'a self,
        doc_id: &'a str,
        query: &'a str,
        k: usize,
    ) -> BoxFuture<'a, Result<Vec<TextChunk>>>;

    /// All stored chunks of `doc_id` in insertion order.
    fn get_all<'a>(&'a self, doc_id: &'a str) -> BoxFuture<'a, Result<Vec<TextChunk>>>;

    fn has_chunks<'a>(&'a self, doc_id: &'a str) -> BoxFuture<'a, Result<bool>>;
}

/// External web search.
pub trait WebSearch: Send + Sync + 'static {
    fn search<'a>(&'a self, query: &'a str, k: usize) -> BoxFuture<'a, Result<Vec<TextChunk>>>;
}

/// LLM calls.
pub trait LlmExecutor: Send + Sync + 'static {
    /// Run a fully rendered prompt and return the response text.
    fn execute<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>>;

    /// Summarize chunks map-then-combine style.
    fn summarize<'a>(&'a self, chunks: &'a [TextChunk]) -> BoxFuture<'a, Result<String>>;
}

/// Summary cache and run-log sink.
pub trait CacheStore: Send + Sync + 'static {
    fn get_summary<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<String>>>;

    fn set_summary<'a>(&'a self, id: &'a str, summary: &'a str) -> BoxFuture<'a, Result<()>>;

    fn exists_summary<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<bool>>;

    fn append_run_log(&self, record: RunLogRecord) -> BoxFuture<'_, Result<()>>;
}

/// Text embedding model.
pub trait EmbeddingProvider: Send + Sync + 'static {
    /// Embed a batch of texts, one vector per input in input order.
    fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;

    fn dimensions(&self) -> usize;
}

/// Clusters page chunks into coherent tutorial sections.
pub trait SemanticGrouper: Send + Sync + 'static {
    fn group_chunks<'a>(
        &'a self,
        chunks: &'a [PageChunk],
    ) -> BoxFuture<'a, Result<Vec<Vec<PageChunk>>>>;
}
