//! Scripted agent factory for unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::{AgentFactory, AgentSession, CodingAgent};
use crate::error::AgentError;
use crate::toolset::mock::RecordingToolset;
use crate::toolset::{Action, ActionResponse};

/// Per workspace, a queue of patches handed out one per session. The last
/// patch repeats. Unknown workspaces fail to open a session.
pub struct ScriptedAgentFactory {
    dir: PathBuf,
    patches: Mutex<HashMap<String, Vec<String>>>,
    messages: Arc<Mutex<Vec<(String, String)>>>,
    toolsets: Mutex<Vec<(String, Arc<RecordingToolset>)>>,
    agent_error: bool,
}

impl ScriptedAgentFactory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            patches: Mutex::new(HashMap::new()),
            messages: Arc::new(Mutex::new(Vec::new())),
            toolsets: Mutex::new(Vec::new()),
            agent_error: false,
        }
    }

    pub fn workspace(self, id: &str, patches: &[&str]) -> Self {
        self.patches.lock().unwrap().insert(
            id.to_string(),
            patches.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    /// Make every agent invocation fail after writing its transcript.
    pub fn failing_agents(mut self) -> Self {
        self.agent_error = true;
        self
    }

    /// `(workspace_id, message)` for every agent invocation.
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn toolsets(&self) -> Vec<(String, Arc<RecordingToolset>)> {
        self.toolsets.lock().unwrap().clone()
    }

    fn next_patch(&self, workspace_id: &str) -> Option<String> {
        let mut patches = self.patches.lock().unwrap();
        let queue = patches.get_mut(workspace_id)?;
        Some(match queue.len() {
            0 => String::new(),
            1 => queue[0].clone(),
            _ => queue.remove(0),
        })
    }
}

struct ScriptedAgent {
    workspace_id: String,
    run_file: PathBuf,
    messages: Arc<Mutex<Vec<(String, String)>>>,
    fail: bool,
}

#[async_trait]
impl CodingAgent for ScriptedAgent {
    async fn invoke(&self, message: &str, recursion_limit: usize) -> Result<(), AgentError> {
        self.messages
            .lock()
            .unwrap()
            .push((self.workspace_id.clone(), message.to_string()));
        std::fs::write(
            &self.run_file,
            format!("transcript of {}", self.workspace_id),
        )?;
        if self.fail {
            return Err(AgentError::RecursionLimit {
                limit: recursion_limit,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AgentFactory for ScriptedAgentFactory {
    async fn session(&self, _repo_name: &str, workspace_id: &str) -> Result<AgentSession, AgentError> {
        let patch = self
            .next_patch(workspace_id)
            .ok_or_else(|| AgentError::UnknownWorkspace(workspace_id.to_string()))?;

        let toolset = Arc::new(
            RecordingToolset::new()
                .respond(
                    Action::FiletoolGitRepoTree,
                    ActionResponse::ok(serde_json::json!({ "tree": "setup.py\nsrc/lib.py" })),
                )
                .respond(
                    Action::FiletoolGitPatch,
                    ActionResponse::ok(serde_json::json!({ "patch": patch })),
                ),
        );
        self.toolsets
            .lock()
            .unwrap()
            .push((workspace_id.to_string(), toolset.clone()));

        let run_file = self
            .dir
            .join(format!("{}-{}.log", workspace_id, uuid::Uuid::new_v4().simple()));
        std::fs::write(&run_file, "")?;

        Ok(AgentSession {
            agent: Box::new(ScriptedAgent {
                workspace_id: workspace_id.to_string(),
                run_file: run_file.clone(),
                messages: self.messages.clone(),
                fail: self.agent_error,
            }),
            toolset,
            run_file,
        })
    }
}
