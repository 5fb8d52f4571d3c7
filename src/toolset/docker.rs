//! Docker-backed workspace serving the file and shell actions locally.
//!
//! Each workspace is one long-lived container with the repository cloned
//! under [`WORKSPACE_HOME`]. The container is driven through `docker exec`,
//! and a working directory is tracked across calls so `cd` behaves like it
//! does in a persistent shell.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::action::required_str;
use super::{Action, ActionResponse, Toolset};
use crate::error::{ToolsetError, WorkspaceError};
use crate::utils::truncate;

/// Home directory inside the container; repositories live directly below it.
pub const WORKSPACE_HOME: &str = "/home/user";

/// Printed after every shell command so the new working directory can be read back.
const CWD_MARKER: &str = "__SWEVOTE_CWD__";

/// Options for starting a workspace container.
#[derive(Debug, Clone)]
pub struct WorkspaceOptions {
    pub image: String,
    /// Host directory mounted read-only at `/agent`.
    pub agent_dir: Option<PathBuf>,
    /// Extra environment variables for the container.
    pub env: Vec<(String, String)>,
    /// Leave the container running after the workspace is dropped.
    pub keep: bool,
    /// Default timeout for toolset shell actions.
    pub command_timeout_ms: u64,
}

impl Default for WorkspaceOptions {
    fn default() -> Self {
        Self {
            image: "python:3.12-slim".to_string(),
            agent_dir: None,
            env: Vec::new(),
            keep: false,
            command_timeout_ms: 300_000,
        }
    }
}

/// Shell command output from inside the container.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    fn failure(message: String) -> Self {
        Self {
            stdout: String::new(),
            stderr: message,
            exit_code: -1,
        }
    }
}

/// A repository checked out inside an ephemeral Docker container.
pub struct DockerWorkspace {
    id: String,
    container_name: String,
    repo_dir: String,
    cwd: Mutex<String>,
    keep: bool,
    command_timeout_ms: u64,
}

impl DockerWorkspace {
    /// Start a container and clone `repo` (`owner/name`) at `base_commit`.
    pub async fn start(
        repo: &str,
        base_commit: &str,
        options: &WorkspaceOptions,
    ) -> Result<Self, WorkspaceError> {
        validate_repo_name(repo)?;
        if !base_commit.is_empty() {
            validate_git_ref(base_commit)?;
        }

        let id = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();
        let repo_short = repo_short_name(repo);
        let container_name = format!("swe-vote-{}-{}", repo.replace('/', "-"), id);
        let repo_dir = format!("{}/{}", WORKSPACE_HOME, repo_short);

        // Stale container from an earlier run
        if let Err(e) = Command::new("docker")
            .args(["rm", "-f", &container_name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            tracing::debug!(container = %container_name, error = %e, "Failed to remove stale container");
        }

        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            container_name.clone(),
            "--network=host".into(),
            "-e".into(),
            format!("HOME={}", WORKSPACE_HOME),
        ];
        for (key, value) in &options.env {
            args.push("-e".into());
            args.push(format!("{}={}", key, value));
        }
        if let Some(ref dir) = options.agent_dir {
            let abs = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.clone());
            args.push("-v".into());
            args.push(format!("{}:/agent:ro", abs.display()));
        }
        args.extend([
            "-w".into(),
            WORKSPACE_HOME.into(),
            options.image.clone(),
            "sleep".into(),
            "14400".into(),
        ]);

        let run_output = Command::new("docker")
            .args(&args)
            .output()
            .await
            .map_err(|e| WorkspaceError::Spawn(e.to_string()))?;

        if !run_output.status.success() {
            return Err(WorkspaceError::StartFailed {
                container: container_name,
                stderr: String::from_utf8_lossy(&run_output.stderr).to_string(),
            });
        }

        let workspace = Self {
            id,
            container_name,
            repo_dir: repo_dir.clone(),
            cwd: Mutex::new(repo_dir.clone()),
            keep: options.keep,
            command_timeout_ms: options.command_timeout_ms,
        };

        let steps = [
            (
                "install git",
                "command -v git >/dev/null 2>&1 || (apt-get update -qq && apt-get install -y -qq git > /dev/null 2>&1)".to_string(),
                300_000,
            ),
            (
                "clone",
                format!(
                    "mkdir -p {home} && git clone https://github.com/{repo}.git {dir} 2>&1",
                    home = WORKSPACE_HOME,
                    repo = repo,
                    dir = repo_dir
                ),
                900_000,
            ),
            (
                "configure git",
                format!(
                    "cd {} && git config user.email 'agent@swe-vote.local' && git config user.name 'swe-vote'",
                    repo_dir
                ),
                10_000,
            ),
        ];
        for (step, cmd, timeout_ms) in steps {
            workspace.setup_step(step, &cmd, timeout_ms).await?;
        }

        if !base_commit.is_empty() {
            let cmd = format!("cd {} && git checkout {} --force 2>&1", repo_dir, base_commit);
            workspace.setup_step("checkout", &cmd, 120_000).await?;
        }

        tracing::info!(
            workspace = %workspace.id,
            container = %workspace.container_name,
            image = %options.image,
            repo = repo,
            "Docker workspace ready"
        );

        Ok(workspace)
    }

    async fn setup_step(&self, step: &str, cmd: &str, timeout_ms: u64) -> Result<(), WorkspaceError> {
        let out = self.exec_in(WORKSPACE_HOME, cmd, timeout_ms).await;
        if out.success() {
            return Ok(());
        }
        self.destroy().await;
        Err(WorkspaceError::SetupFailed {
            step: step.to_string(),
            stderr: truncate(&format!("{}{}", out.stdout, out.stderr), 500),
        })
    }

    /// Workspace identifier used in logs and agent sessions.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.container_name
    }

    /// Absolute path of the repository checkout.
    pub fn repo_dir(&self) -> &str {
        &self.repo_dir
    }

    pub fn cwd(&self) -> String {
        self.cwd.lock().map(|c| c.clone()).unwrap_or_else(|p| p.into_inner().clone())
    }

    fn set_cwd(&self, dir: String) {
        match self.cwd.lock() {
            Ok(mut cwd) => *cwd = dir,
            Err(poisoned) => *poisoned.into_inner() = dir,
        }
    }

    /// Run `cmd` with bash in the tracked working directory.
    pub async fn exec(&self, cmd: &str, timeout_ms: u64) -> ExecOutput {
        let cwd = self.cwd();
        self.exec_in(&cwd, cmd, timeout_ms).await
    }

    /// Run `cmd` with bash in `workdir`.
    pub async fn exec_in(&self, workdir: &str, cmd: &str, timeout_ms: u64) -> ExecOutput {
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            Command::new("docker")
                .args([
                    "exec",
                    "-w",
                    workdir,
                    &self.container_name,
                    "bash",
                    "-c",
                    cmd,
                ])
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => ExecOutput {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                exit_code: output.status.code().unwrap_or(-1),
            },
            Ok(Err(e)) => ExecOutput::failure(format!("Docker exec error: {}", e)),
            Err(_) => ExecOutput::failure(
                WorkspaceError::Timeout { timeout_ms }.to_string(),
            ),
        }
    }

    /// Write `content` to `path` inside the container through stdin.
    ///
    /// Used for payloads too large to pass as a command-line argument.
    pub async fn write_file(&self, path: &str, content: &str) -> Result<(), WorkspaceError> {
        let mut child = Command::new("docker")
            .args([
                "exec",
                "-i",
                &self.container_name,
                "sh",
                "-c",
                &format!("cat > {}", shell_quote(path)),
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkspaceError::Spawn(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(content.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(WorkspaceError::SetupFailed {
                step: format!("write {}", path),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }

    /// Run a command the way a persistent shell would, carrying `cd` over.
    async fn shell(&self, cmd: &str) -> ExecOutput {
        let wrapped = format!(
            "{cmd}\n__rc=$?\nprintf '\\n{marker}%s' \"$(pwd)\"\nexit $__rc",
            cmd = cmd,
            marker = CWD_MARKER
        );
        let mut out = self.exec(&wrapped, self.command_timeout_ms).await;
        if let Some((stdout, cwd)) = split_cwd_marker(&out.stdout) {
            self.set_cwd(cwd);
            out.stdout = stdout;
        }
        out
    }

    async fn change_dir(&self, path: &str) -> ActionResponse {
        let target = expand_home(path);
        let cmd = format!("cd {} && pwd", shell_quote(&target));
        let out = self.exec(&cmd, 10_000).await;
        if out.success() {
            let dir = out.stdout.trim().to_string();
            self.set_cwd(dir.clone());
            ActionResponse::ok(json!({ "current_working_directory": dir }))
        } else {
            ActionResponse::failed(format!("Cannot change directory to '{}': {}", path, out.stderr.trim()))
        }
    }

    async fn git_patch(&self, new_file_paths: &[String]) -> ActionResponse {
        let out = self.exec(&git_patch_command(new_file_paths), 60_000).await;
        if out.success() {
            ActionResponse::ok(json!({ "patch": out.stdout }))
        } else {
            ActionResponse {
                successful: true,
                data: json!({ "error": truncate(out.stderr.trim(), 2000) }),
                error: None,
            }
        }
    }

    async fn repo_tree(&self) -> ActionResponse {
        let out = self.exec("git ls-files", 60_000).await;
        if out.success() {
            ActionResponse::ok(json!({ "tree": out.stdout }))
        } else {
            ActionResponse::failed(truncate(out.stderr.trim(), 2000))
        }
    }

    /// Remove the container.
    pub async fn destroy(&self) {
        if let Err(e) = Command::new("docker")
            .args(["rm", "-f", &self.container_name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            tracing::debug!(container = %self.container_name, error = %e, "Failed to destroy container");
        }
        tracing::debug!(container = %self.container_name, "Docker workspace destroyed");
    }
}

#[async_trait]
impl Toolset for DockerWorkspace {
    async fn execute_action(
        &self,
        action: Action,
        params: Value,
    ) -> Result<ActionResponse, ToolsetError> {
        tracing::debug!(workspace = %self.id, action = %action, "Executing workspace action");
        let response = match action {
            Action::FiletoolChangeWorkingDirectory => {
                let path = required_str(action, &params, "path")?;
                self.change_dir(path).await
            }
            Action::FiletoolGitPatch => {
                let new_files: Vec<String> = params
                    .get("new_file_paths")
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()?
                    .unwrap_or_default();
                self.git_patch(&new_files).await
            }
            Action::FiletoolGitRepoTree => self.repo_tree().await,
            Action::ShelltoolExecCommand => {
                let cmd = required_str(action, &params, "cmd")?;
                let out = self.shell(cmd).await;
                ActionResponse {
                    successful: out.success(),
                    data: json!({
                        "stdout": out.stdout,
                        "stderr": out.stderr,
                        "exit_code": out.exit_code,
                    }),
                    error: (!out.success()).then(|| truncate(out.stderr.trim(), 2000)),
                }
            }
            other => {
                return Err(ToolsetError::Unsupported {
                    action: other.to_string(),
                })
            }
        };
        Ok(response)
    }
}

impl Drop for DockerWorkspace {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        let name = self.container_name.clone();
        std::thread::spawn(move || {
            let _ = std::process::Command::new("docker")
                .args(["rm", "-f", &name])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
        });
    }
}

/// Last path segment of `owner/repo`.
pub fn repo_short_name(repo: &str) -> &str {
    repo.rsplit('/').next().unwrap_or(repo)
}

/// Single-quote `s` for bash.
pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn expand_home(path: &str) -> String {
    if path == "~" {
        WORKSPACE_HOME.to_string()
    } else if let Some(rest) = path.strip_prefix("~/") {
        format!("{}/{}", WORKSPACE_HOME, rest)
    } else {
        path.to_string()
    }
}

/// Split the trailing cwd marker off a command's stdout.
fn split_cwd_marker(stdout: &str) -> Option<(String, String)> {
    let idx = stdout.rfind(CWD_MARKER)?;
    let cwd = stdout[idx + CWD_MARKER.len()..].trim().to_string();
    if cwd.is_empty() {
        return None;
    }
    let body = stdout[..idx].strip_suffix('\n').unwrap_or(&stdout[..idx]);
    Some((body.to_string(), cwd))
}

/// Validate a git ref (commit SHA, branch name) before it reaches a shell.
pub fn validate_git_ref(s: &str) -> Result<(), WorkspaceError> {
    let invalid = |reason: String| WorkspaceError::InvalidInput {
        kind: "git ref",
        value: s.to_string(),
        reason,
    };
    if s.is_empty() {
        return Err(invalid("empty".to_string()));
    }
    if s.len() > 256 {
        return Err(invalid(format!("too long ({} chars, max 256)", s.len())));
    }
    if s.starts_with('-') {
        return Err(invalid("must not start with '-'".to_string()));
    }
    if s.contains("..") {
        return Err(invalid("must not contain '..'".to_string()));
    }
    if let Some(ch) = s
        .chars()
        .find(|ch| !matches!(ch, 'a'..='z' | 'A'..='Z' | '0'..='9' | '/' | '.' | '-' | '_' | '~' | '^'))
    {
        return Err(invalid(format!("invalid character '{}'", ch)));
    }
    Ok(())
}

/// Validate a GitHub `owner/repo` name before it reaches a shell.
pub fn validate_repo_name(s: &str) -> Result<(), WorkspaceError> {
    let invalid = |reason: String| WorkspaceError::InvalidInput {
        kind: "repository name",
        value: s.to_string(),
        reason,
    };
    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() != 2 {
        return Err(invalid("expected 'owner/repo' format".to_string()));
    }
    for part in parts {
        if part.is_empty() {
            return Err(invalid("owner and repo must be non-empty".to_string()));
        }
        if part.starts_with('.') || part.starts_with('-') {
            return Err(invalid("parts must not start with '.' or '-'".to_string()));
        }
        if let Some(ch) = part
            .chars()
            .find(|ch| !matches!(ch, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.'))
        {
            return Err(invalid(format!("invalid character '{}'", ch)));
        }
    }
    Ok(())
}

/// Stage everything (plus explicitly listed ignored files), print the diff
/// and unstage again. Callers reset with `git clean` between attempts so
/// untracked files from an earlier attempt never reach this diff.
fn git_patch_command(new_file_paths: &[String]) -> String {
    let mut cmd = String::from("git add -A");
    for path in new_file_paths {
        cmd.push_str(&format!(" && git add -f -- {}", shell_quote(path)));
    }
    cmd.push_str(" && git diff --cached --binary; __rc=$?; git reset -q; exit $__rc");
    cmd
}
