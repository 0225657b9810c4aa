//! Pieces shared by the document and chat workflows.

use tracing::{debug, error};

use docflow_core::error::Result;
use docflow_core::traits::{CacheStore, LlmExecutor};
use docflow_core::types::{Language, RunLogRecord, TextChunk};

use super::prompts;

/// First word of a model verdict, lowercased, without surrounding
/// punctuation or markup. `"**Yes.**"` reads as `"yes"`.
pub fn verdict(response: &str) -> String {
    response
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .find(|w| !w.is_empty())
        .unwrap_or("")
        .to_lowercase()
}

/// Keep the chunks the model grades as relevant, in their original order.
pub async fn grade_chunks(
    llm: &dyn LlmExecutor,
    query: &str,
    summary: Option<&str>,
    chunks: &[TextChunk],
) -> Result<Vec<TextChunk>> {
    let mut kept = Vec::new();
    for chunk in chunks {
        let response = llm.execute(&prompts::grade(query, chunk, summary)).await?;
        if verdict(&response) == "yes" {
            kept.push(chunk.clone());
        }
    }
    debug!(retrieved = chunks.len(), kept = kept.len(), "Graded retrieved chunks");
    Ok(kept)
}

/// Translate `text` into `lang`, unless it already reads as that language.
pub async fn translate_text(llm: &dyn LlmExecutor, lang: &Language, text: &str) -> Result<String> {
    if lang.is_language_of(text) {
        debug!(lang = %lang, "Text already in target language, skipping translation");
        return Ok(text.to_string());
    }
    let translated = llm.execute(&prompts::translate(lang, text)).await?;
    Ok(translated.trim().to_string())
}

/// Write one run-log line. Failures are logged and never escalate.
pub async fn persist_run_log(cache: &dyn CacheStore, record: RunLogRecord) {
    let file_id = record.file_id.clone();
    if let Err(e) = cache.append_run_log(record).await {
        error!(file_id = %file_id, error = %e, "Failed to persist run log");
    }
}
