/// Generation adapters over HTTP LLM backends
///
/// `Generator` is the capability seam: the evaluator, the judge, and the
/// chat client all reach a model through `complete(prompt)`. Concrete
/// backends are selected by the `provider` configuration value:
/// - "llama-server": llama.cpp server speaking its native /completion API
/// - "openai-compatible": remote /v1/chat/completions with a bearer key
mod api;
mod server;

pub use api::OpenAiCompatClient;
pub use server::LlamaServerClient;

use crate::config::GeneratorSettings;
use crate::registry::ModelRegistry;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API key not found. Set {env_var} environment variable")]
    MissingApiKey { env_var: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Unsupported provider: {provider}")]
    UnsupportedProvider { provider: String },
}

/// Capability trait for text completion
#[async_trait]
pub trait Generator: Send + Sync {
    /// Run one completion over a fully rendered prompt
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// Model name for logging and run records
    fn model_name(&self) -> &str;
}

/// Construct a generation backend from settings
///
/// For "llama-server" the model must be materialized in the registry; a
/// missing generator model is fatal, unlike embedding models which only
/// skip their runs.
pub fn build_generator(
    settings: &GeneratorSettings,
    registry: &ModelRegistry,
) -> crate::Result<Arc<dyn Generator>> {
    match settings.provider.as_str() {
        "llama-server" => {
            let model_path = registry.llm_path(&settings.llm_name)?;
            tracing::info!(
                "Generator '{}' at {} (model file {}, n_ctx={}, n_batch={})",
                settings.llm_name,
                settings.base_url,
                model_path.display(),
                settings.n_ctx,
                settings.n_batch
            );
            Ok(Arc::new(LlamaServerClient::new(settings)))
        }
        "openai-compatible" => {
            let client = OpenAiCompatClient::new(settings)?;
            Ok(Arc::new(client))
        }
        other => Err(LlmError::UnsupportedProvider {
            provider: other.to_string(),
        }
        .into()),
    }
}

/// Wrap a rendered prompt in a model's chat template
///
/// Unknown formats pass the prompt through untouched.
pub fn format_chat_prompt(prompt: &str, chat_format: Option<&str>) -> String {
    match chat_format {
        Some("phi-3") => format!("<|user|>\n{}<|end|>\n<|assistant|>", prompt),
        Some("llama-3") => format!(
            "<|start_header_id|>user<|end_header_id|>\n\n{}<|eot_id|><|start_header_id|>assistant<|end_header_id|>\n\n",
            prompt
        ),
        _ => prompt.to_string(),
    }
}

/// Stop sequences paired with a chat template
pub fn stop_sequences(chat_format: Option<&str>) -> Vec<String> {
    match chat_format {
        Some("phi-3") => vec!["<|end|>".to_string()],
        Some("llama-3") => vec!["<|eot_id|>".to_string()],
        _ => Vec::new(),
    }
}
