use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DocflowError, Result};

/// Top-level docflow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_workspace")]
    pub workspace: String,
    #[serde(default)]
    pub engine: EngineConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub embedding: Option<EmbeddingConfig>,
    #[serde(default)]
    pub web_search: Option<WebSearchConfig>,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub tutorial: TutorialConfig,
}

/// Workflow engine limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Attempts per node before the run records an error.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Pause between failed attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Refine cycles before a question falls back to the apology answer.
    #[serde(default = "default_max_refines")]
    pub max_refines: u32,
    #[serde(default = "default_summary_step_limit")]
    pub summary_step_limit: usize,
    #[serde(default = "default_tutorial_step_limit")]
    pub tutorial_step_limit: usize,
    #[serde(default = "default_chat_step_limit")]
    pub chat_step_limit: usize,
}

impl EngineConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            max_refines: default_max_refines(),
            summary_step_limit: default_summary_step_limit(),
            tutorial_step_limit: default_tutorial_step_limit(),
            chat_step_limit: default_chat_step_limit(),
        }
    }
}

fn default_retry_attempts() -> u32 { 3 }
fn default_retry_delay_ms() -> u64 { 1000 }
fn default_max_refines() -> u32 { 3 }
fn default_summary_step_limit() -> usize { 100 }
fn default_tutorial_step_limit() -> usize { 80 }
fn default_chat_step_limit() -> usize { 80 }

fn default_workspace() -> String { "~/.docflow".to_string() }

/// OpenAI-compatible chat model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Character budget per map-phase batch when summarizing.
    #[serde(default = "default_summary_group_chars")]
    pub summary_group_chars: usize,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.7 }
fn default_summary_group_chars() -> usize { 12_000 }
fn default_request_timeout() -> u64 { 120 }

/// Embedding model used by the vector store and the semantic grouper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dims")]
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_embedding_base_url(),
            api_key: None,
            model: default_embedding_model(),
            dimensions: default_embedding_dims(),
        }
    }
}

fn default_embedding_base_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dims() -> usize { 1536 }

/// Web search provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    #[serde(default = "default_search_provider")]
    pub provider: String,
    pub api_key: String,
}

impl WebSearchConfig {
    /// An empty or unexpanded key disables web retrieval.
    pub fn is_enabled(&self) -> bool {
        !self.api_key.is_empty() && !self.api_key.starts_with("${")
    }
}

fn default_search_provider() -> String { "tavily".to_string() }

/// Document fetching and chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_loader_timeout")]
    pub timeout_secs: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            timeout_secs: default_loader_timeout(),
        }
    }
}

fn default_chunk_size() -> usize { 2000 }
fn default_chunk_overlap() -> usize { 200 }
fn default_loader_timeout() -> u64 { 60 }

/// Summary cache retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Days a cached summary stays valid.
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_days: default_ttl_days(),
        }
    }
}

fn default_ttl_days() -> u32 { 7 }

/// Tutorial clustering and drafting knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorialConfig {
    /// Minimum cosine similarity to the cluster centroid.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Largest page distance between neighbours in one cluster.
    #[serde(default = "default_max_gap_pages")]
    pub max_gap_pages: u32,
    #[serde(default = "default_max_group_size")]
    pub max_group_size: usize,
    /// Cluster text sent to the LLM is cut at this many characters.
    #[serde(default = "default_max_section_chars")]
    pub max_section_chars: usize,
}

impl Default for TutorialConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_gap_pages: default_max_gap_pages(),
            max_group_size: default_max_group_size(),
            max_section_chars: default_max_section_chars(),
        }
    }
}

fn default_similarity_threshold() -> f32 { 0.78 }
fn default_max_gap_pages() -> u32 { 1 }
fn default_max_group_size() -> usize { 3 }
fn default_max_section_chars() -> usize { 6_000 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| DocflowError::ConfigNotFound(path.display().to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse config text, expanding `${ENV_VAR}` references first.
    pub fn from_toml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: AppConfig =
            toml::from_str(&expanded).map_err(|e| DocflowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.engine.retry_attempts == 0 {
            return Err(DocflowError::Config(
                "engine.retry_attempts must be at least 1".into(),
            ));
        }
        if self.loader.chunk_overlap >= self.loader.chunk_size {
            return Err(DocflowError::Config(format!(
                "loader.chunk_overlap ({}) must be smaller than loader.chunk_size ({})",
                self.loader.chunk_overlap, self.loader.chunk_size
            )));
        }
        if self.tutorial.max_group_size == 0 {
            return Err(DocflowError::Config(
                "tutorial.max_group_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the workspace directory (expand ~).
    pub fn workspace_dir(&self) -> PathBuf {
        let ws = &self.workspace;
        if let Some(rest) = ws.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(ws)
    }

    /// SQLite file backing the cache and the vector store.
    pub fn database_path(&self) -> PathBuf {
        self.workspace_dir().join("docflow.db")
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep the reference so doctor can flag it
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_DOCFLOW_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_DOCFLOW_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_DOCFLOW_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_DOCFLOW_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_DOCFLOW_VAR}\"");
    }

    #[test]
    fn test_defaults_from_minimal_toml() {
        let config = AppConfig::from_toml(
            r#"
[model]
model_id = "gpt-4o-mini"
"#,
        )
        .unwrap();
        assert_eq!(config.engine.retry_attempts, 3);
        assert_eq!(config.engine.retry_delay(), Duration::from_secs(1));
        assert_eq!(config.engine.max_refines, 3);
        assert_eq!(config.engine.summary_step_limit, 100);
        assert_eq!(config.engine.tutorial_step_limit, 80);
        assert_eq!(config.engine.chat_step_limit, 80);
        assert_eq!(config.loader.chunk_size, 2000);
        assert_eq!(config.loader.chunk_overlap, 200);
        assert_eq!(config.cache.ttl_days, 7);
        assert!((config.tutorial.similarity_threshold - 0.78).abs() < f32::EPSILON);
        assert_eq!(config.tutorial.max_gap_pages, 1);
        assert_eq!(config.tutorial.max_group_size, 3);
        assert_eq!(config.model.provider, "openai");
        assert!(config.web_search.is_none());
        assert!(config.embedding.is_none());
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let err = AppConfig::from_toml(
            r#"
[engine]
retry_attempts = 0

[model]
model_id = "m"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("retry_attempts"));
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_chunk() {
        let err = AppConfig::from_toml(
            r#"
[model]
model_id = "m"

[loader]
chunk_size = 100
chunk_overlap = 100
"#,
        )
        .unwrap_err();
        assert!(matches!(err, DocflowError::Config(_)));
    }

    #[test]
    fn test_web_search_enabled() {
        let cfg = WebSearchConfig {
            provider: "tavily".into(),
            api_key: "tvly-abc".into(),
        };
        assert!(cfg.is_enabled());

        let cfg = WebSearchConfig {
            provider: "tavily".into(),
            api_key: "${TAVILY_API_KEY}".into(),
        };
        assert!(!cfg.is_enabled());

        let cfg = WebSearchConfig {
            provider: "tavily".into(),
            api_key: String::new(),
        };
        assert!(!cfg.is_enabled());
    }

    #[test]
    fn test_workspace_dir_plain_path() {
        let config = AppConfig::from_toml(
            r#"
workspace = "/tmp/docflow-ws"

[model]
model_id = "m"
"#,
        )
        .unwrap();
        assert_eq!(config.workspace_dir(), PathBuf::from("/tmp/docflow-ws"));
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/docflow-ws/docflow.db")
        );
    }
}
