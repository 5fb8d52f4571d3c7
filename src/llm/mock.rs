//! Scripted provider for unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::chat::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
use crate::error::LlmError;

/// Replays queued replies in order and records every request it receives.
/// Once the queue is empty it keeps answering with `fallback`.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    fallback: String,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            fallback: String::new(),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))?;

        Ok(text_response(request.model, reply))
    }
}

/// A single-choice response carrying `text`.
pub fn text_response(model: impl Into<String>, text: impl Into<String>) -> GenerationResponse {
    GenerationResponse {
        id: "scripted".to_string(),
        model: model.into(),
        choices: vec![Choice {
            index: 0,
            message: Message::assistant(text),
            finish_reason: "stop".to_string(),
        }],
        usage: Usage::default(),
    }
}
