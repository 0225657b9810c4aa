pub mod openai;
pub mod presets;
pub mod summarize;

use std::sync::Arc;

use docflow_core::config::ModelConfig;
use docflow_core::error::Result;
use docflow_core::traits::LlmExecutor;

pub use openai::{strip_reasoning, OpenAiExecutor};

/// Create an LLM executor for the configured provider.
///
/// Every provider goes through the OpenAI-compatible chat-completions API;
/// names without a preset need an explicit `base_url`.
pub fn create_executor(config: &ModelConfig) -> Result<Arc<dyn LlmExecutor>> {
    Ok(Arc::new(OpenAiExecutor::new(config.clone())?))
}
