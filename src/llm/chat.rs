//! Chat-completions client for OpenAI-compatible endpoints.
//!
//! Both judge calls and task-agent turns go through [`LlmProvider`], so tests
//! can swap the HTTP client for a scripted provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::LlmError;

/// Default endpoint used when `SWEVOTE_LLM_API_BASE` is unset.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Request timeout in seconds. Reasoning models can take minutes per call.
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender ("system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Request for text generation from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model identifier. Empty means "use the client's default".
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Output budget for reasoning models, which reject `max_tokens`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            max_completion_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_max_completion_tokens(mut self, max_completion_tokens: u32) -> Self {
        self.max_completion_tokens = Some(max_completion_tokens);
        self
    }
}

/// Response from an LLM generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl GenerationResponse {
    /// Content of the first choice, if any.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// A single generated choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: String,
}

/// Token usage statistics for a generation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Trait for LLM providers that can generate text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a response for the given request.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError>;
}

/// Client for OpenAI-compatible `/chat/completions` APIs.
pub struct ChatClient {
    api_base: String,
    api_key: Option<String>,
    default_model: String,
    http_client: Client,
}

impl ChatClient {
    /// Create a client with explicit configuration.
    ///
    /// # Arguments
    ///
    /// * `api_base` - Base URL, e.g. "https://api.openai.com/v1"
    /// * `api_key` - Bearer token, if the endpoint requires one
    /// * `default_model` - Model used when a request leaves `model` empty
    pub fn new(api_base: String, api_key: Option<String>, default_model: String) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            default_model,
            http_client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Create a client from environment variables.
    ///
    /// Reads:
    /// - `SWEVOTE_LLM_API_BASE`: base URL (defaults to [`DEFAULT_API_BASE`])
    /// - `SWEVOTE_LLM_API_KEY`, falling back to `OPENAI_API_KEY` (required)
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingApiKey` if neither key variable is set.
    pub fn from_env(default_model: impl Into<String>) -> Result<Self, LlmError> {
        let api_base =
            env::var("SWEVOTE_LLM_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let api_key = env::var("SWEVOTE_LLM_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .map_err(|_| LlmError::MissingApiKey)?;

        Ok(Self::new(api_base, Some(api_key), default_model.into()))
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    index: u32,
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    role: String,
    // Null when the model answers with tool calls or a refusal.
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    code: Option<serde_json::Value>,
}

#[async_trait]
impl LlmProvider for ChatClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model
        };

        let api_request = ApiRequest {
            model,
            messages: request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            max_completion_tokens: request.max_completion_tokens,
        };

        let url = format!("{}/chat/completions", self.api_base);
        let mut http_request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json");

        if let Some(ref api_key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", api_key));
        }

        let http_response = http_request
            .json(&api_request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            if let Ok(error_response) = serde_json::from_str::<ApiErrorResponse>(&error_text) {
                if status_code == 429 {
                    return Err(LlmError::RateLimited(error_response.error.message));
                }
                let is_context_error = error_response
                    .error
                    .code
                    .as_ref()
                    .and_then(|c| c.as_str())
                    .is_some_and(|c| c == "context_length_exceeded");
                if is_context_error {
                    return Err(LlmError::ContextLengthExceeded {
                        limit: parse_context_limit(&error_response.error.message),
                    });
                }
                return Err(LlmError::ApiError {
                    code: status_code,
                    message: error_response.error.message,
                });
            }

            if status_code == 429 {
                return Err(LlmError::RateLimited(error_text));
            }
            return Err(LlmError::ApiError {
                code: status_code,
                message: error_text,
            });
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

        let choices = api_response
            .choices
            .into_iter()
            .map(|choice| Choice {
                index: choice.index,
                message: Message {
                    role: choice.message.role,
                    content: choice.message.content.unwrap_or_default(),
                },
                finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            })
            .collect();

        let usage = api_response
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(GenerationResponse {
            id: api_response.id,
            model: api_response.model,
            choices,
            usage,
        })
    }
}

/// Pull the first number out of a "maximum context length is N tokens" message.
fn parse_context_limit(message: &str) -> u32 {
    message
        .split(|c: char| !c.is_ascii_digit())
        .find(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::system("a").role, "system");
        assert_eq!(Message::user("b").role, "user");
        let assistant = Message::assistant("c");
        assert_eq!(assistant.role, "assistant");
        assert_eq!(assistant.content, "c");
    }

    #[test]
    fn test_generation_request_builder() {
        let request = GenerationRequest::new("o1-mini", vec![Message::user("test")])
            .with_temperature(1.0)
            .with_max_completion_tokens(4096);

        assert_eq!(request.model, "o1-mini");
        assert_eq!(request.temperature, Some(1.0));
        assert_eq!(request.max_tokens, None);
        assert_eq!(request.max_completion_tokens, Some(4096));
    }

    #[test]
    fn test_api_request_skips_unset_fields() {
        let request = ApiRequest {
            model: "o1-mini".to_string(),
            messages: vec![Message::user("test")],
            temperature: Some(1.0),
            max_tokens: None,
            max_completion_tokens: Some(4096),
        };

        let json = serde_json::to_string(&request).expect("serialization should succeed");
        assert!(json.contains("\"max_completion_tokens\":4096"));
        assert!(!json.contains("\"max_tokens\""));
    }

    #[test]
    fn test_api_response_tolerates_null_content_and_missing_usage() {
        let raw = r#"{
            "id": "r1",
            "model": "m",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": null}, "finish_reason": null}]
        }"#;
        let parsed: ApiResponse = serde_json::from_str(raw).expect("should parse");
        assert!(parsed.usage.is_none());
        assert!(parsed.choices[0].message.content.is_none());
    }

    #[test]
    fn test_parse_context_limit() {
        assert_eq!(
            parse_context_limit("This model's maximum context length is 128000 tokens."),
            128000
        );
        assert_eq!(parse_context_limit("no digits"), 0);
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ChatClient::new(
            "http://localhost:4000/".to_string(),
            None,
            "gpt-4o".to_string(),
        );
        assert_eq!(client.api_base(), "http://localhost:4000");
        assert_eq!(client.default_model(), "gpt-4o");
        assert!(!client.has_api_key());
    }

    #[tokio::test]
    async fn test_generate_connection_error() {
        let client = ChatClient::new(
            "http://localhost:65535".to_string(),
            None,
            "gpt-4o".to_string(),
        );

        let request = GenerationRequest::new("", vec![Message::user("test")]);
        let result = client.generate(request).await;

        assert!(matches!(result, Err(LlmError::RequestFailed(_))));
    }
}
