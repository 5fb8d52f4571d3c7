//! Error types for swe-vote operations.
//!
//! One enum per subsystem:
//! - LLM API interactions
//! - Toolset actions and triggers (hosted or local workspace)
//! - Docker workspace management
//! - Dataset loading
//! - Coding/task agent runs
//! - Benchmark runs
//! - Configuration

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: SWEVOTE_LLM_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Context length exceeded: {limit} tokens")]
    ContextLengthExceeded { limit: u32 },

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while executing toolset actions or managing triggers.
#[derive(Debug, Error)]
pub enum ToolsetError {
    #[error("Missing toolset API key: SWEVOTE_TOOLSET_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    #[error("Action '{action}' is not supported by this toolset")]
    Unsupported { action: String },

    #[error("Invalid parameters for '{action}': {reason}")]
    InvalidParams { action: String, reason: String },

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Toolset API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to parse toolset response: {0}")]
    ParseError(String),

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while managing a Docker-backed workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Failed to spawn docker: {0}")]
    Spawn(String),

    #[error("Container '{container}' failed to start: {stderr}")]
    StartFailed { container: String, stderr: String },

    #[error("Command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Invalid {kind} '{value}': {reason}")]
    InvalidInput {
        kind: &'static str,
        value: String,
        reason: String,
    },

    #[error("Setup step '{step}' failed: {stderr}")]
    SetupFailed { step: String, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while loading benchmark instances.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Invalid test split '{0}': expected 'start:end'")]
    InvalidSplit(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Dataset API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to parse dataset rows: {0}")]
    ParseError(String),

    #[error("Instance '{0}' not found in dataset")]
    InstanceNotFound(String),
}

/// Errors raised by coding and task agents.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Recursion limit of {limit} steps reached without finishing")]
    RecursionLimit { limit: usize },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Toolset error: {0}")]
    Toolset(#[from] ToolsetError),

    #[error("Agent command failed with exit code {exit_code}: {output}")]
    CommandFailed { exit_code: i32, output: String },

    #[error("No workspace registered under id '{0}'")]
    UnknownWorkspace(String),

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that end a benchmark run.
///
/// Per-worker failures inside the voting loop are logged and skipped; these
/// are the ones that cannot be.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Failed to render prompt: {0}")]
    Prompt(#[from] tera::Error),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
