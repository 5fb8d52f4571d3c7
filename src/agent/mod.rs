//! Agents that act on a repository or a web page through a [`Toolset`].
//!
//! Two kinds live here:
//! - coding agents for the benchmark, created per workspace by an
//!   [`AgentFactory`] and driven through the [`CodingAgent`] trait
//!   ([`CommandAgent`] runs an external agent program inside the container)
//! - [`ToolAgentExecutor`], a JSON tool-call loop over a fixed set of
//!   actions, used for the browser review tasks

pub mod command;
pub mod executor;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::AgentError;
use crate::toolset::Toolset;

pub use command::{CommandAgent, CommandAgentFactory, STEP_LIMIT_EXIT_CODE};
pub use executor::{ExecutorConfig, ExecutorOutcome, ExecutorStep, ToolAgentExecutor, ToolCall};

/// An agent that works on an issue until it stops or runs out of steps.
#[async_trait]
pub trait CodingAgent: Send + Sync {
    /// Hand the agent one message and let it run.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::RecursionLimit` when the agent used up
    /// `recursion_limit` steps without finishing.
    async fn invoke(&self, message: &str, recursion_limit: usize) -> Result<(), AgentError>;
}

/// Everything one agent run needs: the agent, the toolset it acts through
/// and the file its transcript is written to.
pub struct AgentSession {
    pub agent: Box<dyn CodingAgent>,
    pub toolset: Arc<dyn Toolset>,
    pub run_file: PathBuf,
}

/// Builds agent sessions bound to a workspace.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    /// `repo_name` is the short repository name (`django`, not `django/django`).
    async fn session(&self, repo_name: &str, workspace_id: &str) -> Result<AgentSession, AgentError>;
}
