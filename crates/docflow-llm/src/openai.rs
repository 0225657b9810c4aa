use std::sync::OnceLock;
use std::time::Duration;

use futures::future::BoxFuture;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use docflow_core::config::ModelConfig;
use docflow_core::error::{DocflowError, Result};
use docflow_core::traits::LlmExecutor;
use docflow_core::types::TextChunk;

use crate::presets::get_preset;
use crate::summarize::map_combine;

/// OpenAI-compatible executor. Works with OpenAI, Ollama, vLLM, Groq, OpenRouter, etc.
pub struct OpenAiExecutor {
    http: Client,
    config: ModelConfig,
    endpoint: String,
    headers: Vec<(String, String)>,
}

impl OpenAiExecutor {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let preset = get_preset(&config.provider);
        let endpoint = match (&config.base_url, &preset) {
            (Some(url), _) => chat_endpoint(url),
            (None, Some(p)) => p.default_base_url.to_string(),
            (None, None) => {
                return Err(DocflowError::UnsupportedProvider(format!(
                    "{} (set model.base_url for a custom OpenAI-compatible server)",
                    config.provider
                )))
            }
        };
        if preset.as_ref().is_some_and(|p| p.needs_api_key) && config.api_key.is_none() {
            warn!(provider = %config.provider, "No API key configured for provider");
        }
        let headers = preset
            .map(|p| {
                p.extra_headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DocflowError::LlmRequest(e.to_string()))?;

        Ok(Self {
            http,
            config,
            endpoint,
            headers,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, prompt: &str) -> ChatRequest {
        // o-series models reject temperature
        let is_o_series = ["o1", "o3", "o4"]
            .iter()
            .any(|p| self.config.model_id.starts_with(p));
        ChatRequest {
            model: self.config.model_id.clone(),
            messages: vec![OaiMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: self.config.max_tokens,
            temperature: (!is_o_series && self.config.temperature > 0.0)
                .then_some(self.config.temperature),
            stream: false,
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut req = self.http.post(&self.endpoint).json(&self.request_body(prompt));
        if let Some(api_key) = &self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }

        let response = req
            .send()
            .await
            .map_err(|e| DocflowError::LlmRequest(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(DocflowError::LlmRequest(format!("HTTP {}: {}", status, body)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| DocflowError::LlmRequest(e.to_string()))?;
        let content = parse_completion(&text)?;
        debug!(model = %self.config.model_id, chars = content.len(), "LLM call complete");
        Ok(content)
    }
}

/// Accept either a full `/chat/completions` URL or an API root.
fn chat_endpoint(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with("/chat/completions") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/chat/completions")
    }
}

fn think_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").expect("think pattern is valid"))
}

/// Drop `<think>…</think>` reasoning blocks some models emit before the answer.
pub fn strip_reasoning(text: &str) -> String {
    if !text.contains("</think>") {
        return text.trim().to_string();
    }
    think_block().replace_all(text, "").trim().to_string()
}

fn parse_completion(body: &str) -> Result<String> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| DocflowError::LlmParse(e.to_string()))?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| DocflowError::LlmParse("response has no message content".into()))?;
    Ok(strip_reasoning(&content))
}

impl LlmExecutor for OpenAiExecutor {
    fn execute<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.complete(prompt))
    }

    fn summarize<'a>(&'a self, chunks: &'a [TextChunk]) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let summary = map_combine(self, chunks, self.config.summary_group_chars).await?;
            Ok(strip_reasoning(&summary))
        })
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize)]
struct OaiMessage {
    role: String,
    content: String,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str, base_url: Option<&str>, model: &str) -> ModelConfig {
        ModelConfig {
            provider: provider.into(),
            model_id: model.into(),
            api_key: Some("sk-test".into()),
            base_url: base_url.map(String::from),
            max_tokens: 1024,
            temperature: 0.7,
            summary_group_chars: 12_000,
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_endpoint_resolution() {
        let exec = OpenAiExecutor::new(config("openai", None, "gpt-4o-mini")).unwrap();
        assert_eq!(exec.endpoint(), "https://api.openai.com/v1/chat/completions");

        let exec =
            OpenAiExecutor::new(config("custom", Some("http://gpu:8000/v1/"), "qwen3")).unwrap();
        assert_eq!(exec.endpoint(), "http://gpu:8000/v1/chat/completions");

        let exec = OpenAiExecutor::new(config(
            "ollama",
            Some("http://box:11434/v1/chat/completions"),
            "llama3",
        ))
        .unwrap();
        assert_eq!(exec.endpoint(), "http://box:11434/v1/chat/completions");
    }

    #[test]
    fn test_unknown_provider_without_url() {
        let err = OpenAiExecutor::new(config("anthropic", None, "claude")).err().unwrap();
        assert!(matches!(err, DocflowError::UnsupportedProvider(_)));
    }

    #[test]
    fn test_request_body() {
        let exec = OpenAiExecutor::new(config("openai", None, "gpt-4o-mini")).unwrap();
        let body = serde_json::to_value(exec.request_body("hello")).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
        assert_eq!(body["stream"], false);
        assert!(body["temperature"].is_number());

        let exec = OpenAiExecutor::new(config("openai", None, "o3-mini")).unwrap();
        let body = serde_json::to_value(exec.request_body("hello")).unwrap();
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_parse_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"<think>\nplan\n</think>\n  Answer."}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "Answer.");

        let err = parse_completion(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, DocflowError::LlmParse(_)));
        assert!(parse_completion("not json").is_err());
    }

    #[test]
    fn test_strip_reasoning() {
        assert_eq!(strip_reasoning("  plain  "), "plain");
        assert_eq!(
            strip_reasoning("<think>a</think>one<think>b\nc</think> two"),
            "one two"
        );
    }
}
