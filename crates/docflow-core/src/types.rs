use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Query value that requests a whole-document summary instead of an answer.
pub const SUMMARY_SENTINEL: &str = "SUMMARY_ALL";

/// Fixed answer used when the document cannot answer the query.
pub const NO_ANSWER_APOLOGY: &str = "I'm sorry, I can't find the answer to your question even though I read all the documents. Please ask a question about the document's content.";

/// Fixed answer used when a chat question is unrelated to the history.
pub const CHAT_UNRELATED_APOLOGY: &str = "I'm sorry, I don't know the answer to that question because it's not related to the chat history. Please try again.";

/// A plain-text slice of a source document.
pub type TextChunk = String;

/// Whether `query` is the whole-document summary sentinel.
pub fn is_summary_query(query: &str) -> bool {
    query.trim().eq_ignore_ascii_case(SUMMARY_SENTINEL)
}

/// A figure or table attached to a page chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FigureRef {
    /// Placeholder id as it appears in chunk text, e.g. `IMG_0_1`.
    pub id: String,
    /// Resolved image location.
    pub uri: String,
}

impl FigureRef {
    pub fn new(id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
        }
    }

    /// The placeholder text written into chunks and drafted sections.
    pub fn placeholder(&self) -> String {
        format!("[{}]", self.id)
    }
}

/// Page-level chunk used by tutorial generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageChunk {
    pub id: String,
    /// Zero-based page number.
    pub page: u32,
    pub text: String,
    #[serde(default)]
    pub figures: Vec<FigureRef>,
}

impl PageChunk {
    pub fn new(page: u32, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            page,
            text: text.into(),
            figures: vec![],
        }
    }

    pub fn with_figures(mut self, figures: Vec<FigureRef>) -> Self {
        self.figures = figures;
        self
    }
}

/// Target language of a workflow's output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Language {
    English,
    Korean,
    Japanese,
    Chinese,
    Other(String),
}

impl Language {
    /// Short uppercase code used in prompts and run logs.
    pub fn code(&self) -> &str {
        match self {
            Language::English => "EN",
            Language::Korean => "KO",
            Language::Japanese => "JA",
            Language::Chinese => "ZH",
            Language::Other(code) => code,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Language::English => "English",
            Language::Korean => "Korean",
            Language::Japanese => "Japanese",
            Language::Chinese => "Chinese",
            Language::Other(code) => code,
        }
    }

    /// Guess the language of `text` from the scripts it uses.
    ///
    /// Returns `None` when the text has no letters or mixes scripts too
    /// evenly to call.
    pub fn detect(text: &str) -> Option<Language> {
        let mut hangul = 0usize;
        let mut kana = 0usize;
        let mut han = 0usize;
        let mut latin = 0usize;

        for c in text.chars() {
            match c {
                '\u{AC00}'..='\u{D7A3}' | '\u{1100}'..='\u{11FF}' | '\u{3130}'..='\u{318F}' => {
                    hangul += 1
                }
                '\u{3040}'..='\u{30FF}' => kana += 1,
                '\u{4E00}'..='\u{9FFF}' => han += 1,
                c if c.is_ascii_alphabetic() => latin += 1,
                _ => {}
            }
        }

        let total = hangul + kana + han + latin;
        if total == 0 {
            return None;
        }
        let share = |n: usize| n as f64 / total as f64;

        if share(hangul) >= 0.5 {
            Some(Language::Korean)
        } else if kana > 0 && share(kana + han) >= 0.5 {
            Some(Language::Japanese)
        } else if share(han) >= 0.5 {
            Some(Language::Chinese)
        } else if share(latin) >= 0.8 {
            Some(Language::English)
        } else {
            None
        }
    }

    /// Whether `text` already reads as this language.
    pub fn is_language_of(&self, text: &str) -> bool {
        Self::detect(text).as_ref() == Some(self)
    }
}

impl FromStr for Language {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lang = match s.trim().to_ascii_lowercase().as_str() {
            "en" | "eng" | "english" => Language::English,
            "ko" | "kr" | "kor" | "korean" => Language::Korean,
            "ja" | "jp" | "jpn" | "japanese" => Language::Japanese,
            "zh" | "cn" | "chi" | "chinese" => Language::Chinese,
            _ => Language::Other(s.trim().to_string()),
        };
        Ok(lang)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One run-log line persisted by a workflow's terminal node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogRecord {
    pub file_id: String,
    pub url: String,
    pub query: String,
    pub lang: String,
    pub message: String,
}

/// What a finished workflow produced. Content and error are exclusive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Summary(String),
    Answer(String),
    Tutorial(String),
    Error(String),
}

/// Result record handed back to callers.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    pub cached: bool,
    pub log: Vec<String>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl WorkflowOutput {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Error(e) => Some(e),
            _ => None,
        }
    }

    /// The produced summary, answer, or tutorial text.
    pub fn content(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Summary(s) | Outcome::Answer(s) | Outcome::Tutorial(s) => Some(s),
            Outcome::Error(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_sentinel() {
        assert!(is_summary_query("SUMMARY_ALL"));
        assert!(is_summary_query("  summary_all \n"));
        assert!(!is_summary_query("SUMMARY"));
        assert!(!is_summary_query("What is SUMMARY_ALL?"));
    }

    #[test]
    fn test_language_parse() {
        assert_eq!("EN".parse::<Language>().unwrap(), Language::English);
        assert_eq!("kr".parse::<Language>().unwrap(), Language::Korean);
        assert_eq!("ko".parse::<Language>().unwrap(), Language::Korean);
        assert_eq!("ja".parse::<Language>().unwrap(), Language::Japanese);
        assert_eq!(
            "fr".parse::<Language>().unwrap(),
            Language::Other("fr".to_string())
        );
    }

    #[test]
    fn test_language_detect() {
        assert_eq!(
            Language::detect("The quick brown fox jumps."),
            Some(Language::English)
        );
        assert_eq!(Language::detect("안녕하세요, 반갑습니다."), Some(Language::Korean));
        assert_eq!(Language::detect("これは日本語の文章です。"), Some(Language::Japanese));
        assert_eq!(Language::detect("这是中文句子"), Some(Language::Chinese));
        assert_eq!(Language::detect("12345 !!"), None);
    }

    #[test]
    fn test_is_language_of() {
        assert!(Language::English.is_language_of("Plain English text"));
        assert!(!Language::Korean.is_language_of("Plain English text"));
        assert!(!Language::Other("fr".into()).is_language_of("Bonjour"));
    }

    #[test]
    fn test_output_serializes_flat() {
        let out = WorkflowOutput {
            file_id: Some("doc-1".into()),
            cached: true,
            log: vec!["entry attempt 1 [0ms]".into()],
            outcome: Outcome::Summary("short".into()),
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["file_id"], "doc-1");
        assert_eq!(json["summary"], "short");
        assert!(json.get("error").is_none());
        assert_eq!(out.content(), Some("short"));
        assert!(!out.is_error());
    }

    #[test]
    fn test_output_error_has_no_content() {
        let out = WorkflowOutput {
            file_id: None,
            cached: false,
            log: vec![],
            outcome: Outcome::Error("load failed after 3 tries: boom".into()),
        };
        let json = serde_json::to_value(&out).unwrap();
        assert!(json.get("file_id").is_none());
        assert_eq!(json["error"], "load failed after 3 tries: boom");
        assert!(out.content().is_none());
    }

    #[test]
    fn test_figure_placeholder() {
        let fig = FigureRef::new("IMG_0_1", "https://cdn/x.png");
        assert_eq!(fig.placeholder(), "[IMG_0_1]");
    }
}
