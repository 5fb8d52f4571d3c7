//! swe-vote: best-of-N coding agents on SWE-bench with an LLM judge.
//!
//! Several agents attempt each issue in their own Docker workspace; a judge
//! model accepts one patch or sends the agents back with feedback. The crate
//! also ships a trigger-driven browser agent that summarizes product reviews
//! into Slack.

pub mod agent;
pub mod bench;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod llm;
pub mod reviews;
pub mod toolset;
pub mod utils;

// Re-export commonly used error types
pub use error::{
    AgentError, BenchError, ConfigError, DatasetError, LlmError, ToolsetError, WorkspaceError,
};
