//! Coding agent backed by an external program run inside the workspace.
//!
//! The agent command receives the issue prompt through a file and the step
//! budget through `AGENT_MAX_STEPS`:
//!
//! ```text
//! AGENT_MAX_STEPS=50 python -m baseagent --prompt-file /tmp/swe-vote-prompt-<id>.txt --workdir /home/user/django
//! ```
//!
//! Everything it prints is appended to the session's run file, which the
//! judge later summarizes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::io::AsyncWriteExt;

use super::{AgentFactory, AgentSession, CodingAgent};
use crate::error::AgentError;
use crate::toolset::docker::shell_quote;
use crate::toolset::{DockerWorkspace, Toolset};
use crate::utils::truncate;

/// Exit code an agent program uses to report that it ran out of steps.
pub const STEP_LIMIT_EXIT_CODE: i32 = 3;

/// Runs `agent_cmd` inside a [`DockerWorkspace`].
pub struct CommandAgent {
    workspace: Arc<DockerWorkspace>,
    agent_cmd: String,
    timeout_ms: u64,
    run_file: PathBuf,
}

impl CommandAgent {
    pub fn new(
        workspace: Arc<DockerWorkspace>,
        agent_cmd: impl Into<String>,
        timeout_ms: u64,
        run_file: PathBuf,
    ) -> Self {
        Self {
            workspace,
            agent_cmd: agent_cmd.into(),
            timeout_ms,
            run_file,
        }
    }

    fn command_line(&self, prompt_path: &str, recursion_limit: usize) -> String {
        build_command_line(
            &self.agent_cmd,
            prompt_path,
            self.workspace.repo_dir(),
            recursion_limit,
        )
    }
}

fn build_command_line(agent_cmd: &str, prompt_path: &str, workdir: &str, limit: usize) -> String {
    format!(
        "AGENT_MAX_STEPS={} {} --prompt-file {} --workdir {}",
        limit,
        agent_cmd,
        shell_quote(prompt_path),
        shell_quote(workdir)
    )
}

fn prompt_file_path() -> String {
    format!("/tmp/swe-vote-prompt-{}.txt", uuid::Uuid::new_v4().simple())
}

fn remove_file_command(path: &str) -> String {
    format!("rm -f {}", shell_quote(path))
}

#[async_trait]
impl CodingAgent for CommandAgent {
    async fn invoke(&self, message: &str, recursion_limit: usize) -> Result<(), AgentError> {
        let prompt_path = prompt_file_path();
        self.workspace.write_file(&prompt_path, message).await?;

        let cmd = self.command_line(&prompt_path, recursion_limit);
        tracing::info!(
            workspace = %self.workspace.id(),
            recursion_limit = recursion_limit,
            "Starting agent command"
        );
        let out = self
            .workspace
            .exec_in(self.workspace.repo_dir(), &cmd, self.timeout_ms)
            .await;

        let cleanup = self.workspace.exec(&remove_file_command(&prompt_path), 10_000).await;
        if !cleanup.success() {
            tracing::debug!(path = %prompt_path, stderr = %cleanup.stderr.trim(), "Failed to remove prompt file");
        }

        append_run_file(
            &self.run_file,
            &format!(
                "$ {}\n{}\n{}\n[exit {}]\n",
                cmd, out.stdout, out.stderr, out.exit_code
            ),
        )
        .await?;

        match out.exit_code {
            0 => Ok(()),
            STEP_LIMIT_EXIT_CODE => Err(AgentError::RecursionLimit {
                limit: recursion_limit,
            }),
            exit_code => {
                let output = if out.stderr.trim().is_empty() {
                    out.stdout
                } else {
                    out.stderr
                };
                Err(AgentError::CommandFailed {
                    exit_code,
                    output: truncate(output.trim(), 2000),
                })
            }
        }
    }
}

async fn append_run_file(path: &Path, text: &str) -> Result<(), AgentError> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Hands out [`CommandAgent`] sessions for registered workspaces.
pub struct CommandAgentFactory {
    workspaces: RwLock<HashMap<String, Arc<DockerWorkspace>>>,
    agent_cmd: String,
    timeout_ms: u64,
    run_dir: PathBuf,
}

impl CommandAgentFactory {
    pub fn new(agent_cmd: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            workspaces: RwLock::new(HashMap::new()),
            agent_cmd: agent_cmd.into(),
            timeout_ms,
            run_dir: std::env::temp_dir(),
        }
    }

    /// Directory run files are created in (default: the system temp dir).
    pub fn with_run_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.run_dir = dir.into();
        self
    }

    /// Make `workspace` available to sessions; returns its id.
    pub fn register(&self, workspace: Arc<DockerWorkspace>) -> String {
        let id = workspace.id().to_string();
        match self.workspaces.write() {
            Ok(mut map) => map.insert(id.clone(), workspace),
            Err(poisoned) => poisoned.into_inner().insert(id.clone(), workspace),
        };
        id
    }

    pub fn remove(&self, workspace_id: &str) -> Option<Arc<DockerWorkspace>> {
        match self.workspaces.write() {
            Ok(mut map) => map.remove(workspace_id),
            Err(poisoned) => poisoned.into_inner().remove(workspace_id),
        }
    }

    fn get(&self, workspace_id: &str) -> Option<Arc<DockerWorkspace>> {
        match self.workspaces.read() {
            Ok(map) => map.get(workspace_id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(workspace_id).cloned(),
        }
    }

    fn create_run_file(&self) -> Result<PathBuf, AgentError> {
        tempfile::Builder::new()
            .prefix("swe-vote-run-")
            .suffix(".log")
            .tempfile_in(&self.run_dir)?
            .into_temp_path()
            .keep()
            .map_err(|e| AgentError::Io(e.error))
    }
}

#[async_trait]
impl AgentFactory for CommandAgentFactory {
    async fn session(&self, repo_name: &str, workspace_id: &str) -> Result<AgentSession, AgentError> {
        let workspace = self
            .get(workspace_id)
            .ok_or_else(|| AgentError::UnknownWorkspace(workspace_id.to_string()))?;

        if !workspace.repo_dir().ends_with(repo_name) {
            tracing::warn!(
                workspace = %workspace_id,
                repo = repo_name,
                repo_dir = %workspace.repo_dir(),
                "Workspace checkout does not match repository"
            );
        }

        let run_file = self.create_run_file()?;
        let agent = CommandAgent::new(
            workspace.clone(),
            self.agent_cmd.clone(),
            self.timeout_ms,
            run_file.clone(),
        );
        let toolset: Arc<dyn Toolset> = workspace;

        Ok(AgentSession {
            agent: Box::new(agent),
            toolset,
            run_file,
        })
    }
}
