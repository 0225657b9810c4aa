//! Prompt templates for the workflow nodes.
//!
//! Each builder returns a fully rendered prompt. The opening line of every
//! template is distinct so logs and test doubles can tell them apart.

use docflow_core::types::{Language, TextChunk};

/// Marker the refine prompt asks the model to return for off-topic queries.
pub const UNRELATED_MARKER: &str = "UNRELATED";

fn numbered(chunks: &[TextChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[{}] {}", i + 1, c))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn determine_web(query: &str, summary: &str) -> String {
    format!(
        "Decide whether the query needs information from the web beyond the document summary.\n\
         Answer `false` when the summary covers the query specifically, including questions about \
         the document's own structure. Answer `true` when the summary is missing key facts, is \
         generic or outdated, or the query asks about recent events, live data, prices or news.\n\
         Reply with one word: true or false.\n\n\
         Query: {query}\n\
         Document summary: {summary}\n"
    )
}

pub fn grade(query: &str, chunk: &str, summary: Option<&str>) -> String {
    format!(
        "You are a relevance grader for retrieved document chunks.\n\
         Reply `yes` if the chunk is on topic and genuinely helps answer the query; keyword \
         overlap alone is not enough. Reply `no` if it is off topic or misleading.\n\
         Reply with one word: yes or no.\n\n\
         Query: {query}\n\
         Chunk: {chunk}\n\
         Document summary (optional): {}\n",
        summary.unwrap_or("")
    )
}

pub fn generate(query: &str, retrieved: &[TextChunk]) -> String {
    format!(
        "Answer the query using only the retrieved information below.\n\
         Return the answer and nothing else.\n\n\
         Query: {query}\n\
         Retrieved:\n{}\n",
        numbered(retrieved)
    )
}

pub fn verify(query: &str, summary: Option<&str>, retrieved: &[TextChunk], answer: &str) -> String {
    format!(
        "Judge the quality of the generated answer against five criteria:\n\
         1. It directly addresses the query.\n\
         2. It is based on the retrieved information.\n\
         3. It is logically consistent.\n\
         4. It is complete and specific.\n\
         5. It makes no unsupported claims.\n\
         Short or conversational queries still need an answer grounded in the retrieved content.\n\
         Reply with one word: good or bad.\n\n\
         Query: {query}\n\
         Summary: {}\n\
         Retrieved:\n{}\n\
         Answer: {answer}\n",
        summary.unwrap_or(""),
        numbered(retrieved)
    )
}

pub fn refine(summary: Option<&str>, query: &str, retrieved: &[TextChunk], answer: Option<&str>) -> String {
    format!(
        "Rewrite the query so that document retrieval returns more relevant information.\n\
         If the query has nothing to do with the document summary, reply with exactly `{UNRELATED_MARKER}`.\n\
         Otherwise reply with the rewritten query only.\n\n\
         Document summary: {}\n\
         Original query: {query}\n\
         Retrieved:\n{}\n\
         Previous answer: {}\n",
        summary.unwrap_or(""),
        numbered(retrieved),
        answer.unwrap_or("")
    )
}

pub fn translate(lang: &Language, text: &str) -> String {
    format!(
        "Translate the text into {} ({}), preserving meaning and tone.\n\
         Return only the translation.\n\n\
         {text}\n",
        lang.name(),
        lang.code()
    )
}

pub fn tutorial_section(chunks: &str) -> String {
    format!(
        "You are an expert tutor. Write a self-study guide section from the chunks below.\n\
         - Use Markdown with H1 to H3 headings.\n\
         - Keep figure placeholders such as [IMG_0_1] exactly as written and only use placeholders \
         that appear in the chunks.\n\
         - After each figure placeholder add a \"**Tutor's note:**\" line explaining it.\n\
         - Keep each section under about 200 words.\n\
         - Finish with a \"Key takeaways\" bullet list.\n\n\
         Chunks:\n{chunks}\n"
    )
}

pub fn tutorial_translate(lang: &Language, section: &str) -> String {
    format!(
        "Translate this tutorial section into {} ({}) without shortening it.\n\
         Keep every heading, list item, link, code block and example. Keep figure placeholders \
         such as [IMG_0_1] exactly as they appear and never add new ones.\n\
         Return only the translated section.\n\n\
         {section}\n",
        lang.name(),
        lang.code()
    )
}

pub fn chat_answer(query: &str, history: &str) -> String {
    format!(
        "Answer the question using the chat history below.\n\n\
         ### Question:\n{query}\n\n\
         ### Chat history:\n{history}\n\n\
         ### Answer:"
    )
}

pub fn chat_verify(query: &str, history: &str, answer: &str) -> String {
    format!(
        "Check whether the answer is grounded in the chat history.\n\
         - Reply `bad` if the answer is unrelated to the chat history.\n\
         - Reply `false` if it is partially wrong or off target.\n\
         - Reply `true` if it is correct and clearly based on the history.\n\
         Reply with one word: true, false or bad.\n\n\
         ### Question:\n{query}\n\n\
         ### Chat history:\n{history}\n\n\
         ### Answer:\n{answer}\n\n\
         ### Verdict:"
    )
}

pub fn chat_refine(query: &str, history: &str, answer: &str) -> String {
    format!(
        "Improve the answer using the chat history below.\n\n\
         ### Question:\n{query}\n\n\
         ### Chat history:\n{history}\n\n\
         ### Answer:\n{answer}\n\n\
         ### Improved answer:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_embed_inputs() {
        let p = grade("what is rust", "rust is a language", Some("about rust"));
        assert!(p.contains("Query: what is rust"));
        assert!(p.contains("Chunk: rust is a language"));
        assert!(p.contains("about rust"));

        let p = generate("q", &["alpha".to_string(), "beta".to_string()]);
        assert!(p.contains("[1] alpha\n\n[2] beta"));
    }

    #[test]
    fn test_translate_names_language() {
        let p = translate(&Language::Korean, "hello");
        assert!(p.contains("Korean (KO)"));
        assert!(p.ends_with("hello\n"));
    }

    #[test]
    fn test_refine_mentions_marker() {
        let p = refine(None, "q", &[], None);
        assert!(p.contains(UNRELATED_MARKER));
    }
}
