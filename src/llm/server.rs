//! llama.cpp server client speaking the native /completion API

use crate::config::GeneratorSettings;
use crate::llm::{format_chat_prompt, stop_sequences, Generator, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const KNOWN_CHAT_FORMATS: &[&str] = &["phi-3", "llama-3"];

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: usize,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: String,
}

/// Client for a locally running llama-server instance
///
/// The server owns the model file; this client only renders prompts and
/// bounds the completion length.
pub struct LlamaServerClient {
    client: reqwest::Client,
    base_url: String,
    model_name: String,
    max_new_tokens: usize,
    temperature: f32,
    chat_format: Option<String>,
}

impl LlamaServerClient {
    pub fn new(settings: &GeneratorSettings) -> Self {
        let chat_format = match settings.chat_format.as_deref() {
            Some(format) if KNOWN_CHAT_FORMATS.contains(&format) => Some(format.to_string()),
            Some(format) => {
                tracing::warn!("Unknown chat format '{}', sending prompts unwrapped", format);
                None
            }
            None => None,
        };

        Self {
            client: reqwest::Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model_name: settings.llm_name.clone(),
            max_new_tokens: settings.max_new_tokens,
            temperature: settings.temperature,
            chat_format,
        }
    }
}

#[async_trait]
impl Generator for LlamaServerClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/completion", self.base_url);
        let rendered = format_chat_prompt(prompt, self.chat_format.as_deref());

        let request = CompletionRequest {
            prompt: &rendered,
            n_predict: self.max_new_tokens,
            temperature: self.temperature,
            stop: stop_sequences(self.chat_format.as_deref()),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Network {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let completion: CompletionResponse =
            response.json().await.map_err(|e| LlmError::ParseError {
                message: e.to_string(),
            })?;

        Ok(completion.content.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(chat_format: Option<&str>) -> GeneratorSettings {
        GeneratorSettings {
            provider: "llama-server".to_string(),
            llm_name: "phi-3-mini".to_string(),
            base_url: "http://127.0.0.1:8080/".to_string(),
            api_key_env: None,
            temperature: 0.0,
            max_new_tokens: 256,
            n_ctx: 4096,
            n_ctx_margin: 768,
            n_batch: 512,
            chat_format: chat_format.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = LlamaServerClient::new(&settings(None));
        assert_eq!(client.base_url, "http://127.0.0.1:8080");
    }

    #[test]
    fn test_unknown_chat_format_dropped() {
        let client = LlamaServerClient::new(&settings(Some("vicuna")));
        assert!(client.chat_format.is_none());

        let client = LlamaServerClient::new(&settings(Some("phi-3")));
        assert_eq!(client.chat_format.as_deref(), Some("phi-3"));
    }

    #[test]
    fn test_request_serialization() {
        let request = CompletionRequest {
            prompt: "Hello",
            n_predict: 256,
            temperature: 0.0,
            stop: vec!["<|end|>".to_string()],
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["prompt"], "Hello");
        assert_eq!(value["n_predict"], 256);
        assert_eq!(value["stop"][0], "<|end|>");
    }

    #[test]
    fn test_empty_stop_list_omitted() {
        let request = CompletionRequest {
            prompt: "Hello",
            n_predict: 256,
            temperature: 0.0,
            stop: Vec::new(),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("stop").is_none());
    }
}
