//! Never-failing system/human prompt calls used by the judge and summarizer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::chat::{GenerationRequest, LlmProvider, Message};
use super::retry::{retry_with_exponential_backoff, RetryPolicy};
use crate::error::LlmError;

/// Output budget used by the human-only profile.
pub const REASONING_MAX_COMPLETION_TOKENS: u32 = 4096;

/// How a (system, human) prompt pair is turned into a chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelProfile {
    /// System + human messages at temperature 0 (Claude-style chat models).
    #[default]
    SystemAndHuman,
    /// Human message only at temperature 1 with `max_completion_tokens`
    /// (reasoning models that reject system prompts).
    HumanOnly,
}

impl ModelProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelProfile::SystemAndHuman => "system-and-human",
            ModelProfile::HumanOnly => "human-only",
        }
    }

    /// Build the request this profile sends for a prompt pair.
    pub fn build_request(&self, model: &str, system: &str, human: &str) -> GenerationRequest {
        match self {
            ModelProfile::SystemAndHuman => GenerationRequest::new(
                model,
                vec![Message::system(system), Message::user(human)],
            )
            .with_temperature(0.0),
            ModelProfile::HumanOnly => GenerationRequest::new(model, vec![Message::user(human)])
                .with_temperature(1.0)
                .with_max_completion_tokens(REASONING_MAX_COMPLETION_TOKENS),
        }
    }
}

impl fmt::Display for ModelProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "system-and-human" | "claude" | "chat" => Ok(ModelProfile::SystemAndHuman),
            "human-only" | "openai" | "reasoning" => Ok(ModelProfile::HumanOnly),
            other => Err(format!(
                "unknown model profile '{}': expected 'system-and-human' or 'human-only'",
                other
            )),
        }
    }
}

/// Sends prompt pairs to a provider with retries, folding failures into text.
#[derive(Clone)]
pub struct LlmResponder {
    provider: Arc<dyn LlmProvider>,
    model: String,
    profile: ModelProfile,
    retry: RetryPolicy,
}

impl LlmResponder {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>, profile: ModelProfile) -> Self {
        Self {
            provider,
            model: model.into(),
            profile,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn profile(&self) -> ModelProfile {
        self.profile
    }

    /// Send one prompt pair, retrying with exponential backoff.
    pub async fn try_respond(&self, system: &str, human: &str) -> Result<String, LlmError> {
        let request = self.profile.build_request(&self.model, system, human);
        let provider = &self.provider;

        let response = retry_with_exponential_backoff(&self.retry, || {
            let request = request.clone();
            async move { provider.generate(request).await }
        })
        .await?;

        response
            .first_content()
            .map(|s| s.to_string())
            .ok_or_else(|| LlmError::ParseError("No content in LLM response".to_string()))
    }

    /// Like [`try_respond`](Self::try_respond) but never fails: the final error
    /// is rendered into the returned text.
    pub async fn respond(&self, system: &str, human: &str) -> String {
        match self.try_respond(system, human).await {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(model = %self.model, error = %err, "LLM call failed after retries");
                format!("Error while calling llm {}: \n{}\n", self.model, err)
            }
        }
    }
}
