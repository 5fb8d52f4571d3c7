//! One agent attempt at an issue inside one workspace.

use serde_json::{json, Value};
use std::sync::Arc;

use super::judge::AgentRun;
use super::prompts::build_issue_prompt;
use crate::agent::AgentFactory;
use crate::dataset::IssueConfig;
use crate::error::{AgentError, BenchError};
use crate::toolset::{Action, ActionResponse, Toolset, WORKSPACE_HOME};

/// Step budget handed to each agent invocation.
pub const DEFAULT_RECURSION_LIMIT: usize = 50;

/// Collect the working-tree diff of `/home/user/{repo_name}`.
///
/// Every failure (action error, unsuccessful response, missing data,
/// missing patch) is logged and yields an empty patch.
pub async fn get_patch_from_response(toolset: &dyn Toolset, repo_name: &str) -> String {
    let repo_dir = format!("{}/{}", WORKSPACE_HOME, repo_name);
    if let Err(e) = toolset
        .execute_action(
            Action::FiletoolChangeWorkingDirectory,
            json!({ "path": repo_dir }),
        )
        .await
    {
        tracing::warn!(repo = repo_name, error = %e, "Failed to change into repository");
    }

    let response = match toolset
        .execute_action(Action::FiletoolGitPatch, json!({}))
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(repo = repo_name, error = %e, "Error in get_patch");
            return String::new();
        }
    };

    patch_from_response(&response, repo_name)
}

fn patch_from_response(response: &ActionResponse, repo_name: &str) -> String {
    if !response.successful {
        match response.error.as_deref() {
            Some(error) => tracing::warn!(repo = repo_name, error = error, "Error in get_patch"),
            None => tracing::warn!(repo = repo_name, "Unknown error occurred in get_patch"),
        }
        return String::new();
    }

    let has_data = match &response.data {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        _ => true,
    };
    if !has_data {
        tracing::warn!(repo = repo_name, "No data found in the patch response");
        return String::new();
    }

    match response.data_str("patch").filter(|p| !p.is_empty()) {
        Some(patch) => {
            tracing::debug!(repo = repo_name, bytes = patch.len(), "Collected patch");
            patch.to_string()
        }
        None => {
            match response.data_str("error") {
                Some(error) => tracing::warn!(repo = repo_name, error = error, "Error in patch data"),
                None => tracing::warn!(repo = repo_name, "No patch found in the response data"),
            }
            String::new()
        }
    }
}

/// Restore the checkout to `base_commit` for the next round. Untracked
/// files are removed too, or the next patch would pick them up again.
fn reset_command(base_commit: &str) -> String {
    format!("git reset --hard {} && git clean -fd", base_commit)
}

/// Text of a repo-tree response as shown to the agent.
fn tree_text(response: &ActionResponse) -> String {
    match response.data_str("tree") {
        Some(tree) => tree.to_string(),
        None => serde_json::to_string(response).unwrap_or_default(),
    }
}

/// Runs agents on issues through sessions from an [`AgentFactory`].
#[derive(Clone)]
pub struct AgentRunner {
    factory: Arc<dyn AgentFactory>,
    recursion_limit: usize,
}

impl AgentRunner {
    pub fn new(factory: Arc<dyn AgentFactory>) -> Self {
        Self {
            factory,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    /// Let one agent attempt `issue` in `workspace_id` and return its patch
    /// and transcript.
    ///
    /// Agent failures (including running out of steps) are logged and the
    /// patch is collected anyway. Afterwards the checkout is reset to the
    /// issue's base commit.
    ///
    /// # Errors
    ///
    /// Fails only when no session can be opened for the workspace.
    pub async fn run_agent_function(
        &self,
        workspace_id: &str,
        issue: &IssueConfig,
        previous_feedback: &str,
    ) -> Result<AgentRun, BenchError> {
        let repo_name = issue.repo_short_name();
        let session = self.factory.session(repo_name, workspace_id).await?;
        let toolset = session.toolset.as_ref();

        let tree = match toolset
            .execute_action(Action::FiletoolGitRepoTree, json!({}))
            .await
        {
            Ok(response) => tree_text(&response),
            Err(e) => {
                tracing::warn!(workspace = workspace_id, error = %e, "Failed to read repository tree");
                format!("ERROR: {}", e)
            }
        };

        if let Err(e) = toolset
            .execute_action(
                Action::ShelltoolExecCommand,
                json!({ "cmd": format!("cd ~/{}", repo_name) }),
            )
            .await
        {
            tracing::warn!(workspace = workspace_id, error = %e, "Failed to cd into repository");
        }

        let prompt = build_issue_prompt(&issue.description(), &tree, previous_feedback);

        tracing::info!(
            instance_id = %issue.instance_id,
            workspace = workspace_id,
            retry = !previous_feedback.is_empty(),
            "Running agent"
        );
        match session.agent.invoke(&prompt, self.recursion_limit).await {
            Ok(()) => {}
            Err(AgentError::RecursionLimit { limit }) => {
                tracing::warn!(workspace = workspace_id, limit = limit, "Agent hit recursion limit");
            }
            Err(e) => {
                tracing::warn!(workspace = workspace_id, error = %e, "Error in agent invocation");
            }
        }

        let patch = get_patch_from_response(toolset, repo_name).await;

        let run_content = match tokio::fs::read_to_string(&session.run_file).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %session.run_file.display(), error = %e, "Failed to read run file");
                String::new()
            }
        };
        if let Err(e) = tokio::fs::remove_file(&session.run_file).await {
            tracing::debug!(path = %session.run_file.display(), error = %e, "Failed to remove run file");
        }

        if let Err(e) = toolset
            .execute_action(
                Action::ShelltoolExecCommand,
                json!({ "cmd": reset_command(&issue.base_commit_id) }),
            )
            .await
        {
            tracing::warn!(workspace = workspace_id, error = %e, "Failed to reset repository");
        }

        Ok(AgentRun { patch, run_content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::mock::ScriptedAgentFactory;
    use crate::toolset::mock::RecordingToolset;

    fn issue() -> IssueConfig {
        IssueConfig {
            instance_id: "astropy__astropy-12907".to_string(),
            repo_name: "astropy/astropy".to_string(),
            base_commit_id: "d16bfe05a744".to_string(),
            issue_desc: "separability_matrix is wrong for nested models".to_string(),
            hints: String::new(),
        }
    }

    #[tokio::test]
    async fn test_get_patch_success() {
        let toolset = RecordingToolset::new().respond(
            Action::FiletoolGitPatch,
            ActionResponse::ok(json!({ "patch": "diff --git a/x b/x" })),
        );
        let patch = get_patch_from_response(&toolset, "astropy").await;
        assert_eq!(patch, "diff --git a/x b/x");
        assert_eq!(
            toolset.calls_to(Action::FiletoolChangeWorkingDirectory),
            vec![json!({ "path": "/home/user/astropy" })]
        );
    }

    #[test]
    fn test_patch_from_response_failures() {
        let cases = [
            ActionResponse::failed("boom"),
            ActionResponse {
                successful: false,
                data: Value::Null,
                error: None,
            },
            ActionResponse::ok(Value::Null),
            ActionResponse::ok(json!({})),
            ActionResponse::ok(json!({ "patch": "" })),
            ActionResponse::ok(json!({ "error": "not a git repository" })),
        ];
        for response in cases {
            assert_eq!(patch_from_response(&response, "repo"), "", "{:?}", response);
        }
    }

    #[test]
    fn test_reset_command_removes_untracked_files() {
        let cmd = reset_command("cffd4e0f86");
        assert!(cmd.starts_with("git reset --hard cffd4e0f86"));
        assert!(cmd.ends_with("&& git clean -fd"));
    }

    #[test]
    fn test_tree_text() {
        assert_eq!(tree_text(&ActionResponse::ok(json!({ "tree": "a.py" }))), "a.py");
        let raw = tree_text(&ActionResponse::ok(json!({ "files": ["a.py"] })));
        assert!(raw.contains("\"files\""));
    }

    #[tokio::test]
    async fn test_run_agent_function_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(ScriptedAgentFactory::new(dir.path()).workspace("ws-1", &["diff --git a/fix"]));
        let runner = AgentRunner::new(factory.clone());

        let run = runner.run_agent_function("ws-1", &issue(), "").await.unwrap();
        assert_eq!(run.patch, "diff --git a/fix");
        assert_eq!(run.run_content, "transcript of ws-1");

        let messages = factory.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.starts_with("separability_matrix is wrong for nested models.\n Output to git tree command setup.py"));

        let (_, toolset) = &factory.toolsets()[0];
        let calls: Vec<Action> = toolset.calls().into_iter().map(|(a, _)| a).collect();
        assert_eq!(
            calls,
            vec![
                Action::FiletoolGitRepoTree,
                Action::ShelltoolExecCommand,
                Action::FiletoolChangeWorkingDirectory,
                Action::FiletoolGitPatch,
                Action::ShelltoolExecCommand,
            ]
        );
        let shell = toolset.calls_to(Action::ShelltoolExecCommand);
        assert_eq!(shell[0], json!({ "cmd": "cd ~/astropy" }));
        assert_eq!(shell[1], json!({ "cmd": "git reset --hard d16bfe05a744 && git clean -fd" }));

        // Run file is removed once read
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_hints_reach_the_agent() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(ScriptedAgentFactory::new(dir.path()).workspace("ws-1", &["diff"]));
        let runner = AgentRunner::new(factory.clone());
        let issue = IssueConfig {
            hints: "Check _separable for CompoundModel".to_string(),
            ..issue()
        };

        runner.run_agent_function("ws-1", &issue, "").await.unwrap();
        let messages = factory.messages();
        assert!(messages[0]
            .1
            .starts_with("separability_matrix is wrong for nested models\n\nHints:\nCheck _separable for CompoundModel.\n"));
    }

    #[tokio::test]
    async fn test_agent_failure_still_collects_patch() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(
            ScriptedAgentFactory::new(dir.path())
                .workspace("ws-1", &["diff --git a/partial"])
                .failing_agents(),
        );
        let runner = AgentRunner::new(factory).with_recursion_limit(5);

        let run = runner
            .run_agent_function("ws-1", &issue(), "patch 1 was wrong")
            .await
            .unwrap();
        assert_eq!(run.patch, "diff --git a/partial");
    }

    #[tokio::test]
    async fn test_unknown_workspace_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = AgentRunner::new(Arc::new(ScriptedAgentFactory::new(dir.path())));
        let err = runner.run_agent_function("missing", &issue(), "").await.unwrap_err();
        assert!(matches!(err, BenchError::Agent(AgentError::UnknownWorkspace(_))));
    }
}
