//! Map-then-combine summarization over any [`LlmExecutor`].

use futures::future::try_join_all;
use tracing::debug;

use docflow_core::error::{DocflowError, Result};
use docflow_core::traits::LlmExecutor;
use docflow_core::types::TextChunk;

pub fn map_prompt(text: &str) -> String {
    format!(
        "You are a helpful assistant that summarizes the following text.\n\n\
         {text}\n\n\
         Please summarize the text in a concise manner."
    )
}

pub fn combine_prompt(text: &str) -> String {
    format!(
        "You are a helpful assistant that combines the following summaries.\n\n\
         {text}\n\n\
         Please combine the summaries in a concise manner."
    )
}

/// Pack consecutive texts into batches of at most `max_chars` characters.
/// A text longer than the budget gets a batch of its own.
pub fn batch_texts(texts: &[TextChunk], max_chars: usize) -> Vec<String> {
    let mut batches = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for text in texts.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        let len = text.chars().count();
        if !current.is_empty() && current_chars + len + 2 > max_chars {
            batches.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
            current_chars += 2;
        }
        current.push_str(text);
        current_chars += len;
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Summarize each batch, then fold the partial summaries together until one
/// remains.
pub async fn map_combine(
    llm: &dyn LlmExecutor,
    chunks: &[TextChunk],
    max_chars: usize,
) -> Result<String> {
    let batches = batch_texts(chunks, max_chars);
    if batches.is_empty() {
        return Err(DocflowError::Validation("nothing to summarize".into()));
    }

    let mut summaries = try_join_all(batches.iter().map(|b| {
        let prompt = map_prompt(b);
        async move { llm.execute(&prompt).await }
    }))
    .await?;
    debug!(batches = batches.len(), "Mapped summary batches");

    while summaries.len() > 1 {
        let mut groups = batch_texts(&summaries, max_chars);
        // Partials too large to pair up: combine them all at once
        if groups.len() == summaries.len() {
            groups = vec![summaries.join("\n\n")];
        }
        summaries = try_join_all(groups.iter().map(|g| {
            let prompt = combine_prompt(g);
            async move { llm.execute(&prompt).await }
        }))
        .await?;
        debug!(remaining = summaries.len(), "Combined partial summaries");
    }

    summaries
        .pop()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| DocflowError::LlmParse("summarization produced no output".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_test_utils::MockLlm;

    fn texts(items: &[&str]) -> Vec<TextChunk> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_batch_texts() {
        let batches = batch_texts(&texts(&["aaaa", "bbbb", "cccc"]), 10);
        assert_eq!(batches, vec!["aaaa\n\nbbbb", "cccc"]);

        let batches = batch_texts(&texts(&["a very long text", "x"]), 5);
        assert_eq!(batches, vec!["a very long text", "x"]);

        assert!(batch_texts(&texts(&["", "  "]), 10).is_empty());
    }

    #[tokio::test]
    async fn test_single_batch_is_one_call() {
        let llm = MockLlm::new().on("summarizes the following", "short");
        let out = map_combine(&llm, &texts(&["one", "two"]), 100).await.unwrap();
        assert_eq!(out, "short");
        assert_eq!(llm.execute_calls(), 1);
    }

    #[tokio::test]
    async fn test_batches_are_combined() {
        let llm = MockLlm::new()
            .on("summarizes the following", "part")
            .on("combines the following", "whole");
        let chunks = texts(&["aaaaaaaa", "bbbbbbbb", "cccccccc"]);
        let out = map_combine(&llm, &chunks, 10).await.unwrap();

        assert_eq!(out, "whole");
        assert_eq!(llm.prompts_containing("summarizes the following").len(), 3);
        let combines = llm.prompts_containing("combines the following");
        assert!(combines[0].contains("part\n\npart"));
    }

    #[tokio::test]
    async fn test_empty_input_fails() {
        let llm = MockLlm::new();
        let err = map_combine(&llm, &[], 100).await.unwrap_err();
        assert!(matches!(err, DocflowError::Validation(_)));
        assert_eq!(llm.execute_calls(), 0);
    }
}
