use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocflowError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    // Document errors
    #[error("Content extraction failed: {0}")]
    ContentExtraction(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Retrieval errors
    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Web search failed: {0}")]
    WebSearch(String),

    // Storage errors
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Database error: {0}")]
    Database(String),

    // Engine errors
    #[error("Workflow '{workflow}' exceeded step limit ({limit})")]
    StepLimitExceeded { workflow: String, limit: usize },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DocflowError>;
