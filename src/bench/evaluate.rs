//! Evaluation harness: load instances, provision workspaces, vote, record.
//!
//! Output layout under `{output_dir}/{run_id}/`:
//! - `predictions.jsonl`: one SWE-bench prediction per instance, appended as
//!   each instance finishes
//! - `summary.json`: run metadata and counts, written at the end

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use super::vote::Bench;
use crate::agent::CommandAgentFactory;
use crate::dataset::IssueConfig;
use crate::error::BenchError;
use crate::toolset::{DockerWorkspace, WorkspaceOptions};

/// `model_name_or_path` written into every prediction.
pub const MODEL_NAME_OR_PATH: &str = "swe-vote";

pub const PREDICTIONS_FILE: &str = "predictions.jsonl";
pub const SUMMARY_FILE: &str = "summary.json";

/// One line of `predictions.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub instance_id: String,
    pub model_name_or_path: String,
    pub model_patch: String,
}

/// What a run did, written to `summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    /// Instances selected for the run.
    pub instances: Vec<String>,
    /// Instances that ended with a non-empty patch.
    pub patched: usize,
    /// Instances whose workspaces or judge failed.
    pub failed: Vec<String>,
}

/// Provides workspace ids for an issue and tears them down afterwards.
#[async_trait]
pub trait WorkspacePool: Send + Sync {
    async fn acquire(&self, issue: &IssueConfig, count: usize) -> Result<Vec<String>, BenchError>;

    async fn release(&self, workspace_ids: &[String]);
}

/// Docker containers registered with a [`CommandAgentFactory`].
pub struct DockerPool {
    factory: Arc<CommandAgentFactory>,
    options: WorkspaceOptions,
}

impl DockerPool {
    pub fn new(factory: Arc<CommandAgentFactory>, options: WorkspaceOptions) -> Self {
        Self { factory, options }
    }
}

#[async_trait]
impl WorkspacePool for DockerPool {
    async fn acquire(&self, issue: &IssueConfig, count: usize) -> Result<Vec<String>, BenchError> {
        let started = join_all(
            (0..count).map(|_| DockerWorkspace::start(&issue.repo_name, &issue.base_commit_id, &self.options)),
        )
        .await;

        let mut workspaces = Vec::with_capacity(count);
        let mut first_error = None;
        for result in started {
            match result {
                Ok(workspace) => workspaces.push(workspace),
                Err(e) => {
                    tracing::error!(instance_id = %issue.instance_id, error = %e, "Failed to start workspace");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            for workspace in &workspaces {
                workspace.destroy().await;
            }
            return Err(e.into());
        }

        Ok(workspaces
            .into_iter()
            .map(|workspace| self.factory.register(Arc::new(workspace)))
            .collect())
    }

    async fn release(&self, workspace_ids: &[String]) {
        for id in workspace_ids {
            if let Some(workspace) = self.factory.remove(id) {
                if !self.options.keep {
                    workspace.destroy().await;
                }
            }
        }
    }
}

/// Runs [`Bench`] over a list of issues and records predictions.
pub struct Harness {
    bench: Bench,
    pool: Arc<dyn WorkspacePool>,
    num_instances: usize,
    model: String,
}

impl Harness {
    pub fn new(bench: Bench, pool: Arc<dyn WorkspacePool>, num_instances: usize) -> Self {
        Self {
            bench,
            pool,
            num_instances: num_instances.max(1),
            model: String::new(),
        }
    }

    /// Judge model name recorded in the summary.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn solve(&self, issue: &IssueConfig) -> Result<String, BenchError> {
        let workspace_ids = self.pool.acquire(issue, self.num_instances).await?;
        let result = self.bench.bench(&workspace_ids, issue).await;
        self.pool.release(&workspace_ids).await;
        result
    }

    /// Evaluate `issues` one after another, writing into `run_dir`.
    ///
    /// An instance that fails still gets a prediction line (with an empty
    /// patch) and is listed under `failed` in the summary.
    pub async fn run(&self, issues: &[IssueConfig], run_dir: &Path, run_id: &str) -> Result<RunSummary, BenchError> {
        tokio::fs::create_dir_all(run_dir).await?;
        let predictions_path = run_dir.join(PREDICTIONS_FILE);
        let started_at = Utc::now();
        let mut patched = 0;
        let mut failed = Vec::new();

        for (i, issue) in issues.iter().enumerate() {
            tracing::info!(
                instance_id = %issue.instance_id,
                repo = %issue.repo_name,
                progress = format!("{}/{}", i + 1, issues.len()),
                "Evaluating instance"
            );

            let patch = match self.solve(issue).await {
                Ok(patch) => patch,
                Err(e) => {
                    tracing::error!(instance_id = %issue.instance_id, error = %e, "Instance failed");
                    failed.push(issue.instance_id.clone());
                    String::new()
                }
            };
            if !patch.is_empty() {
                patched += 1;
            }

            append_prediction(
                &predictions_path,
                &Prediction {
                    instance_id: issue.instance_id.clone(),
                    model_name_or_path: MODEL_NAME_OR_PATH.to_string(),
                    model_patch: patch,
                },
            )
            .await?;
        }

        let summary = RunSummary {
            run_id: run_id.to_string(),
            model: self.model.clone(),
            started_at,
            finished_at: Utc::now(),
            dry_run: false,
            instances: issues.iter().map(|i| i.instance_id.clone()).collect(),
            patched,
            failed,
        };
        write_summary(run_dir, &summary).await?;

        tracing::info!(
            run_id = run_id,
            instances = summary.instances.len(),
            patched = summary.patched,
            failed = summary.failed.len(),
            "Run complete"
        );
        Ok(summary)
    }
}

/// Summary for a run that only resolves its instance selection.
pub fn dry_run_summary(issues: &[IssueConfig], run_id: &str, model: &str) -> RunSummary {
    let now = Utc::now();
    RunSummary {
        run_id: run_id.to_string(),
        model: model.to_string(),
        started_at: now,
        finished_at: now,
        dry_run: true,
        instances: issues.iter().map(|i| i.instance_id.clone()).collect(),
        patched: 0,
        failed: Vec::new(),
    }
}

/// `{output_dir}/{run_id}`.
pub fn run_dir(output_dir: &Path, run_id: &str) -> PathBuf {
    output_dir.join(run_id)
}

async fn append_prediction(path: &Path, prediction: &Prediction) -> Result<(), BenchError> {
    let mut line = serde_json::to_string(prediction)?;
    line.push('\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

pub async fn write_summary(run_dir: &Path, summary: &RunSummary) -> Result<(), BenchError> {
    tokio::fs::create_dir_all(run_dir).await?;
    let json = serde_json::to_string_pretty(summary)?;
    tokio::fs::write(run_dir.join(SUMMARY_FILE), json).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::mock::ScriptedAgentFactory;
    use crate::bench::judge::Judge;
    use crate::bench::runner::AgentRunner;
    use crate::error::AgentError;
    use crate::llm::mock::ScriptedProvider;
    use crate::llm::{LlmResponder, ModelProfile, RetryPolicy};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Hands out `{instance_id}-{n}` ids; fails for instances in `broken`.
    #[derive(Default)]
    struct FakePool {
        broken: Vec<String>,
        released: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WorkspacePool for FakePool {
        async fn acquire(&self, issue: &IssueConfig, count: usize) -> Result<Vec<String>, BenchError> {
            if self.broken.contains(&issue.instance_id) {
                return Err(AgentError::UnknownWorkspace(issue.instance_id.clone()).into());
            }
            Ok((0..count).map(|n| format!("{}-{}", issue.instance_id, n)).collect())
        }

        async fn release(&self, workspace_ids: &[String]) {
            self.released.lock().unwrap().extend(workspace_ids.iter().cloned());
        }
    }

    fn issue(id: &str) -> IssueConfig {
        IssueConfig {
            instance_id: id.to_string(),
            repo_name: "pallets/flask".to_string(),
            base_commit_id: "4346498c".to_string(),
            issue_desc: format!("issue {id}"),
            hints: String::new(),
        }
    }

    fn harness(factory: ScriptedAgentFactory, pool: Arc<FakePool>, judge_dir: &Path) -> Harness {
        // Summaries and verdicts alike answer "patch 1"
        let provider = Arc::new(ScriptedProvider::new(vec![]).with_fallback("patch 1"));
        let responder = LlmResponder::new(provider, "judge", ModelProfile::HumanOnly)
            .with_retry_policy(RetryPolicy::new(1, Duration::from_millis(1)));
        let judge = Arc::new(Judge::new(responder, judge_dir.join("error.txt")));
        let bench = Bench::new(AgentRunner::new(Arc::new(factory)), judge);
        Harness::new(bench, pool, 1).with_model("judge")
    }

    #[tokio::test]
    async fn test_run_writes_predictions_and_summary() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let factory = ScriptedAgentFactory::new(work.path())
            .workspace("flask-1-0", &["diff --git a/app.py"])
            .workspace("flask-2-0", &[""]);
        let pool = Arc::new(FakePool {
            broken: vec!["flask-3".to_string()],
            ..Default::default()
        });
        let harness = harness(factory, pool.clone(), work.path());

        let run_dir = run_dir(out.path(), "temp");
        let summary = harness
            .run(&[issue("flask-1"), issue("flask-2"), issue("flask-3")], &run_dir, "temp")
            .await
            .unwrap();

        assert_eq!(summary.instances, vec!["flask-1", "flask-2", "flask-3"]);
        assert_eq!(summary.patched, 1);
        assert_eq!(summary.failed, vec!["flask-3"]);
        assert_eq!(
            *pool.released.lock().unwrap(),
            vec!["flask-1-0".to_string(), "flask-2-0".to_string()]
        );

        let lines: Vec<Prediction> = std::fs::read_to_string(run_dir.join(PREDICTIONS_FILE))
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].model_patch, "diff --git a/app.py");
        assert_eq!(lines[0].model_name_or_path, MODEL_NAME_OR_PATH);
        assert_eq!(lines[1].model_patch, "");
        assert_eq!(lines[2].instance_id, "flask-3");

        let written: RunSummary =
            serde_json::from_str(&std::fs::read_to_string(run_dir.join(SUMMARY_FILE)).unwrap()).unwrap();
        assert_eq!(written.run_id, "temp");
        assert!(!written.dry_run);
        assert!(written.finished_at >= written.started_at);
    }

    #[tokio::test]
    async fn test_dry_run_summary() {
        let out = tempfile::tempdir().unwrap();
        let summary = dry_run_summary(&[issue("a"), issue("b")], "dry", "o1-mini");
        assert!(summary.dry_run);
        assert_eq!(summary.instances.len(), 2);

        write_summary(&run_dir(out.path(), "dry"), &summary).await.unwrap();
        assert!(out.path().join("dry").join(SUMMARY_FILE).exists());
        assert!(!out.path().join("dry").join(PREDICTIONS_FILE).exists());
    }
}
