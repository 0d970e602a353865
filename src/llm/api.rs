//! OpenAI-compatible chat completions client for remote providers

use crate::config::GeneratorSettings;
use crate::llm::{Generator, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    /// Null for some models mid-reasoning
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Client for hosted endpoints speaking the OpenAI chat completions API
///
/// The chat template is applied server-side, so prompts go out as plain
/// user messages.
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    model_name: String,
    api_key: String,
    max_new_tokens: usize,
    temperature: f32,
}

impl OpenAiCompatClient {
    pub fn new(settings: &GeneratorSettings) -> Result<Self, LlmError> {
        let env_var = settings
            .api_key_env
            .clone()
            .unwrap_or_else(|| "API_KEY".to_string());
        let api_key = std::env::var(&env_var).map_err(|_| LlmError::MissingApiKey {
            env_var: env_var.clone(),
        })?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model_name: settings.llm_name.clone(),
            api_key,
            max_new_tokens: settings.max_new_tokens,
            temperature: settings.temperature,
        })
    }
}

#[async_trait]
impl Generator for OpenAiCompatClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let request = ChatCompletionRequest {
            model: self.model_name.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: self.max_new_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Network {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let error_msg = serde_json::from_str::<ApiErrorResponse>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message: error_msg,
            });
        }

        let completion: ChatCompletionResponse =
            response.json().await.map_err(|e| LlmError::ParseError {
                message: e.to_string(),
            })?;

        completion
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|content| content.trim().to_string())
            .ok_or_else(|| LlmError::ParseError {
                message: format!("No response content from model '{}'", self.model_name),
            })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
