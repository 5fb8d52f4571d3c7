//! LLM integration for swe-vote.
//!
//! - [`chat`]: the [`LlmProvider`] trait and an OpenAI-compatible HTTP client
//! - [`retry`]: exponential-backoff wrapper around any async call
//! - [`responder`]: prompt-pair calls that never fail, used by the judge
//!
//! ```ignore
//! use swe_vote::llm::{ChatClient, LlmResponder, ModelProfile};
//! use std::sync::Arc;
//!
//! let client = Arc::new(ChatClient::from_env("o1-mini")?);
//! let responder = LlmResponder::new(client, "o1-mini", ModelProfile::HumanOnly);
//! let text = responder.respond("You are a judge.", "Pick a patch.").await;
//! ```

pub mod chat;
#[cfg(test)]
pub(crate) mod mock;
pub mod responder;
pub mod retry;

pub use chat::{
    ChatClient, Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage,
    DEFAULT_API_BASE,
};
pub use responder::{LlmResponder, ModelProfile, REASONING_MAX_COMPLETION_TOKENS};
pub use retry::{retry_with_exponential_backoff, RetryPolicy};
