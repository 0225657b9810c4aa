//! Scripted in-memory implementations of every docflow port.
//!
//! Each mock counts its calls so tests can assert on collaborator traffic,
//! and most can be told to fail a fixed number of times.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use docflow_core::error::{DocflowError, Result};
use docflow_core::traits::{
    CacheStore, DocumentLoader, EmbeddingProvider, LlmExecutor, SemanticGrouper, VectorStore,
    WebSearch,
};
use docflow_core::types::{PageChunk, RunLogRecord, TextChunk};

type ReplyFn = Box<dyn Fn(&str) -> String + Send + Sync>;

enum Reply {
    Fixed(String),
    Sequence(Mutex<VecDeque<String>>),
    Dynamic(ReplyFn),
    Fail(String),
}

struct Rule {
    needle: String,
    reply: Reply,
}

/// LLM mock answering prompts by substring rules, checked in insertion order.
pub struct MockLlm {
    rules: Vec<Rule>,
    default_reply: String,
    summary: std::result::Result<String, String>,
    echo_summary: bool,
    delay: Option<Duration>,
    execute_calls: AtomicUsize,
    summarize_calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    summarized: Mutex<Vec<Vec<TextChunk>>>,
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            rules: vec![],
            default_reply: "ok".to_string(),
            summary: Ok("mock summary".to_string()),
            echo_summary: false,
            delay: None,
            execute_calls: AtomicUsize::new(0),
            summarize_calls: AtomicUsize::new(0),
            prompts: Mutex::new(vec![]),
            summarized: Mutex::new(vec![]),
        }
    }

    /// Reply used when no rule matches.
    pub fn with_default(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    /// Reply with `reply` whenever the prompt contains `needle`.
    pub fn on(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply: Reply::Fixed(reply.into()),
        });
        self
    }

    /// Reply with each entry in turn, repeating the last one once exhausted.
    pub fn on_sequence(mut self, needle: impl Into<String>, replies: &[&str]) -> Self {
        let queue = replies.iter().map(|r| r.to_string()).collect();
        self.rules.push(Rule {
            needle: needle.into(),
            reply: Reply::Sequence(Mutex::new(queue)),
        });
        self
    }

    /// Compute the reply from the full prompt text.
    pub fn on_fn(
        mut self,
        needle: impl Into<String>,
        f: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply: Reply::Dynamic(Box::new(f)),
        });
        self
    }

    /// Fail every prompt containing `needle`.
    pub fn fail_on(mut self, needle: impl Into<String>, message: impl Into<String>) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply: Reply::Fail(message.into()),
        });
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Ok(summary.into());
        self
    }

    /// Summarize by quoting the chunks, so each summary names its source.
    pub fn echoing_summary(mut self) -> Self {
        self.echo_summary = true;
        self
    }

    pub fn failing_summary(mut self, message: impl Into<String>) -> Self {
        self.summary = Err(message.into());
        self
    }

    /// Sleep before every reply so concurrent runs interleave.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub fn summarize_calls(&self) -> usize {
        self.summarize_calls.load(Ordering::SeqCst)
    }

    /// Every prompt passed to `execute`, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn prompts_containing(&self, needle: &str) -> Vec<String> {
        self.prompts()
            .into_iter()
            .filter(|p| p.contains(needle))
            .collect()
    }

    /// Chunk sets passed to `summarize`, in call order.
    pub fn summarized(&self) -> Vec<Vec<TextChunk>> {
        self.summarized.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn reply_for(&self, prompt: &str) -> Result<String> {
        for rule in &self.rules {
            if !prompt.contains(&rule.needle) {
                continue;
            }
            return match &rule.reply {
                Reply::Fixed(text) => Ok(text.clone()),
                Reply::Dynamic(f) => Ok(f(prompt)),
                Reply::Fail(msg) => Err(DocflowError::LlmRequest(msg.clone())),
                Reply::Sequence(queue) => {
                    let mut queue = queue
                        .lock()
                        .map_err(|e| DocflowError::LlmRequest(e.to_string()))?;
                    let next = if queue.len() > 1 {
                        queue.pop_front()
                    } else {
                        queue.front().cloned()
                    };
                    Ok(next.unwrap_or_else(|| self.default_reply.clone()))
                }
            };
        }
        Ok(self.default_reply.clone())
    }
}

impl LlmExecutor for MockLlm {
    fn execute<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.execute_calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.to_string());
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply_for(prompt)
        })
    }

    fn summarize<'a>(&'a self, chunks: &'a [TextChunk]) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.summarize_calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut seen) = self.summarized.lock() {
                seen.push(chunks.to_vec());
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.echo_summary {
                return Ok(format!("summary of {}", chunks.join(" + ")));
            }
            self.summary.clone().map_err(DocflowError::LlmRequest)
        })
    }
}

/// Vector store keeping chunks per document in memory.
///
/// Similarity is the number of query words a chunk shares, ties broken by
/// insertion order.
#[derive(Default)]
pub struct MockVectorStore {
    docs: Mutex<HashMap<String, Vec<TextChunk>>>,
    empty_search: bool,
    upsert_calls: AtomicUsize,
    search_calls: AtomicUsize,
}

impl MockVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, doc_id: &str, chunks: &[&str]) -> Self {
        if let Ok(mut docs) = self.docs.lock() {
            docs.insert(
                doc_id.to_string(),
                chunks.iter().map(|c| c.to_string()).collect(),
            );
        }
        self
    }

    /// Make every similarity search come back empty.
    pub fn with_empty_search(mut self) -> Self {
        self.empty_search = true;
        self
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn chunks(&self, doc_id: &str) -> Vec<TextChunk> {
        self.docs
            .lock()
            .ok()
            .and_then(|d| d.get(doc_id).cloned())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<TextChunk>>>> {
        self.docs
            .lock()
            .map_err(|e| DocflowError::VectorStore(e.to_string()))
    }
}

impl VectorStore for MockVectorStore {
    fn upsert<'a>(
        &'a self,
        chunks: &'a [TextChunk],
        doc_id: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.upsert_calls.fetch_add(1, Ordering::SeqCst);
            self.lock()?
                .entry(doc_id.to_string())
                .or_default()
                .extend(chunks.iter().cloned());
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
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            if self.empty_search {
                return Ok(vec![]);
            }
            let docs = self.lock()?;
            let Some(chunks) = docs.get(doc_id) else {
                return Ok(vec![]);
            };
            let words: Vec<String> = query
                .split_whitespace()
                .map(|w| w.to_lowercase())
                .collect();
            let mut scored: Vec<(usize, usize, &TextChunk)> = chunks
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let lower = c.to_lowercase();
                    let score = words.iter().filter(|w| lower.contains(w.as_str())).count();
                    (score, i, c)
                })
                .collect();
            scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
            Ok(scored.into_iter().take(k).map(|(_, _, c)| c.clone()).collect())
        })
    }

    fn get_all<'a>(&'a self, doc_id: &'a str) -> BoxFuture<'a, Result<Vec<TextChunk>>> {
        Box::pin(async move { Ok(self.lock()?.get(doc_id).cloned().unwrap_or_default()) })
    }

    fn has_chunks<'a>(&'a self, doc_id: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            Ok(self
                .lock()?
                .get(doc_id)
                .is_some_and(|chunks| !chunks.is_empty()))
        })
    }
}

/// Summary cache and run-log sink held in memory.
#[derive(Default)]
pub struct MockCache {
    summaries: Mutex<HashMap<String, String>>,
    run_logs: Mutex<Vec<RunLogRecord>>,
    fail_run_logs: bool,
    set_calls: AtomicUsize,
}

impl MockCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_summary(self, id: &str, summary: &str) -> Self {
        if let Ok(mut s) = self.summaries.lock() {
            s.insert(id.to_string(), summary.to_string());
        }
        self
    }

    /// Make every `append_run_log` fail.
    pub fn failing_run_logs(mut self) -> Self {
        self.fail_run_logs = true;
        self
    }

    pub fn summary(&self, id: &str) -> Option<String> {
        self.summaries.lock().ok().and_then(|s| s.get(id).cloned())
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn run_logs(&self) -> Vec<RunLogRecord> {
        self.run_logs.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn summaries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.summaries
            .lock()
            .map_err(|e| DocflowError::Cache(e.to_string()))
    }
}

impl CacheStore for MockCache {
    fn get_summary<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move { Ok(self.summaries()?.get(id).cloned()) })
    }

    fn set_summary<'a>(&'a self, id: &'a str, summary: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.set_calls.fetch_add(1, Ordering::SeqCst);
            self.summaries()?.insert(id.to_string(), summary.to_string());
            Ok(())
        })
    }

    fn exists_summary<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.summaries()?.contains_key(id)) })
    }

    fn append_run_log(&self, record: RunLogRecord) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.fail_run_logs {
                return Err(DocflowError::Cache("run log sink unavailable".into()));
            }
            self.run_logs
                .lock()
                .map_err(|e| DocflowError::Cache(e.to_string()))?
                .push(record);
            Ok(())
        })
    }
}

/// Loader returning canned chunks, optionally failing the first calls.
#[derive(Default)]
pub struct MockLoader {
    chunks: Vec<TextChunk>,
    by_url: HashMap<String, Vec<TextChunk>>,
    pages: Vec<PageChunk>,
    failures: AtomicUsize,
    failure_message: String,
    calls: AtomicUsize,
}

impl MockLoader {
    pub fn new(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            failure_message: "document unreachable".to_string(),
            ..Default::default()
        }
    }

    /// Serve different chunks per URL. Unknown URLs load as empty.
    pub fn by_url(documents: &[(&str, &[&str])]) -> Self {
        Self {
            by_url: documents
                .iter()
                .map(|(url, chunks)| {
                    (url.to_string(), chunks.iter().map(|c| c.to_string()).collect())
                })
                .collect(),
            failure_message: "document unreachable".to_string(),
            ..Default::default()
        }
    }

    pub fn with_pages(pages: Vec<PageChunk>) -> Self {
        Self {
            pages,
            failure_message: "document unreachable".to_string(),
            ..Default::default()
        }
    }

    /// Fail the next `times` calls with `message`.
    pub fn failing(self, times: usize, message: impl Into<String>) -> Self {
        self.failures.store(times, Ordering::SeqCst);
        Self {
            failure_message: message.into(),
            ..self
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DocflowError::ContentExtraction(self.failure_message.clone()));
        }
        Ok(())
    }
}

impl DocumentLoader for MockLoader {
    fn load<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<TextChunk>>> {
        Box::pin(async move {
            self.check_failure()?;
            let chunks = self.by_url.get(url).unwrap_or(&self.chunks);
            if chunks.is_empty() {
                return Err(DocflowError::ContentExtraction("document is empty".into()));
            }
            Ok(chunks.clone())
        })
    }

    fn load_pages<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<Vec<PageChunk>>> {
        Box::pin(async move {
            self.check_failure()?;
            if self.pages.is_empty() {
                return Err(DocflowError::ContentExtraction("document is empty".into()));
            }
            Ok(self.pages.clone())
        })
    }
}

/// Web search returning canned results.
#[derive(Default)]
pub struct MockWebSearch {
    results: Vec<TextChunk>,
    error: Option<String>,
    queries: Mutex<Vec<(String, usize)>>,
}

impl MockWebSearch {
    pub fn new(results: &[&str]) -> Self {
        Self {
            results: results.iter().map(|r| r.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// `(query, k)` for every search, in call order.
    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

impl WebSearch for MockWebSearch {
    fn search<'a>(&'a self, query: &'a str, k: usize) -> BoxFuture<'a, Result<Vec<TextChunk>>> {
        Box::pin(async move {
            if let Ok(mut q) = self.queries.lock() {
                q.push((query.to_string(), k));
            }
            if let Some(msg) = &self.error {
                return Err(DocflowError::WebSearch(msg.clone()));
            }
            Ok(self.results.iter().take(k).cloned().collect())
        })
    }
}

/// Grouper cutting chunks into fixed-size runs in page order.
pub struct MockGrouper {
    size: usize,
}

impl MockGrouper {
    pub fn by_size(size: usize) -> Self {
        Self { size: size.max(1) }
    }
}

impl SemanticGrouper for MockGrouper {
    fn group_chunks<'a>(
        &'a self,
        chunks: &'a [PageChunk],
    ) -> BoxFuture<'a, Result<Vec<Vec<PageChunk>>>> {
        Box::pin(async move { Ok(chunks.chunks(self.size).map(|g| g.to_vec()).collect()) })
    }
}

/// Embedder with one axis per keyword: component `i` counts occurrences of
/// `keywords[i]` in the lowercased text.
pub struct MockEmbedder {
    keywords: Vec<String>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn by_keywords(keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::by_keywords(&["x"])
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        self.keywords
            .iter()
            .map(|k| lower.matches(k.as_str()).count() as f32)
            .collect()
    }
}

impl EmbeddingProvider for MockEmbedder {
    fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DocflowError::Embedding("embedding service down".into()));
            }
            Ok(texts.iter().map(|t| self.vector(t)).collect())
        })
    }

    fn dimensions(&self) -> usize {
        self.keywords.len()
    }
}
