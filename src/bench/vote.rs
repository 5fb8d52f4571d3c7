//! Best-of-N voting loop.
//!
//! Every round runs one agent per workspace on a bounded worker pool and
//! asks the soft judge to accept a patch. A rejected round feeds the judge's
//! reasoning to the next round's agents. When all rounds are rejected the
//! hard judge must pick one of the last round's patches.

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;

use super::judge::{AgentRun, Judge};
use super::runner::AgentRunner;
use crate::dataset::IssueConfig;
use crate::error::BenchError;

pub const DEFAULT_WORKERS: usize = 3;
pub const DEFAULT_MAX_ROUNDS: usize = 3;

/// Runs the voting loop for one issue at a time.
pub struct Bench {
    runner: AgentRunner,
    judge: Arc<Judge>,
    workers: usize,
    max_rounds: usize,
}

impl Bench {
    pub fn new(runner: AgentRunner, judge: Arc<Judge>) -> Self {
        Self {
            runner,
            judge,
            workers: DEFAULT_WORKERS,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds.max(1);
        self
    }

    /// Run every workspace once, `workers` at a time, collecting results
    /// as they finish. Failed workers are logged and left out.
    async fn run_round(
        &self,
        workspace_ids: &[String],
        issue: &IssueConfig,
        previous_feedback: &str,
    ) -> Vec<AgentRun> {
        let semaphore = Semaphore::new(self.workers);
        let mut pending: FuturesUnordered<_> = workspace_ids
            .iter()
            .map(|workspace_id| {
                let semaphore = &semaphore;
                async move {
                    let _permit = semaphore.acquire().await.ok();
                    let result = self
                        .runner
                        .run_agent_function(workspace_id, issue, previous_feedback)
                        .await;
                    (workspace_id, result)
                }
            })
            .collect();

        let mut runs = Vec::with_capacity(workspace_ids.len());
        while let Some((workspace_id, result)) = pending.next().await {
            match result {
                Ok(run) => {
                    if !run.has_patch() {
                        tracing::info!(workspace = %workspace_id, "Agent produced no patch");
                    }
                    runs.push(run);
                }
                Err(e) => {
                    tracing::error!(workspace = %workspace_id, error = %e, "Agent worker failed");
                }
            }
        }
        runs
    }

    /// Produce the final patch for `issue` using the given workspaces.
    ///
    /// Returns an empty string when no round produced a patch, or when the
    /// hard judge still declines to pick one.
    pub async fn bench(&self, workspace_ids: &[String], issue: &IssueConfig) -> Result<String, BenchError> {
        let mut feedback = String::new();
        let mut last_runs = Vec::new();

        for round in 1..=self.max_rounds {
            let runs = self.run_round(workspace_ids, issue, &feedback).await;
            let candidates = runs.iter().filter(|r| r.has_patch()).count();
            tracing::info!(
                instance_id = %issue.instance_id,
                round = round,
                runs = runs.len(),
                candidates = candidates,
                "Round finished"
            );

            let outcome = self.judge.choose_patch(&runs, issue, false).await?;
            if outcome.accepted {
                tracing::info!(instance_id = %issue.instance_id, round = round, "Patch accepted");
                return Ok(outcome.patch);
            }

            feedback = outcome.patch;
            last_runs = runs;
        }

        tracing::info!(
            instance_id = %issue.instance_id,
            rounds = self.max_rounds,
            "No patch accepted, asking hard judge"
        );
        let outcome = self.judge.choose_patch(&last_runs, issue, true).await?;
        if outcome.accepted {
            Ok(outcome.patch)
        } else {
            tracing::warn!(instance_id = %issue.instance_id, "Hard judge chose no patch");
            Ok(String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::mock::ScriptedAgentFactory;
    use crate::bench::prompts::SUMMARIZER_SYSTEM_PROMPT;
    use crate::error::LlmError;
    use crate::llm::mock::text_response;
    use crate::llm::{
        GenerationRequest, GenerationResponse, LlmProvider, LlmResponder, ModelProfile, RetryPolicy,
    };
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    fn issue() -> IssueConfig {
        IssueConfig {
            instance_id: "sympy__sympy-20590".to_string(),
            repo_name: "sympy/sympy".to_string(),
            base_commit_id: "cffd4e0f86".to_string(),
            issue_desc: "Symbol instances have __dict__".to_string(),
            hints: String::new(),
        }
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn bench_with(
        factory: Arc<ScriptedAgentFactory>,
        verdicts: Vec<&str>,
        dir: &Path,
    ) -> (Bench, Arc<VerdictProvider>) {
        let provider = Arc::new(VerdictProvider::new(verdicts));
        let responder = LlmResponder::new(provider.clone(), "judge", ModelProfile::SystemAndHuman)
            .with_retry_policy(RetryPolicy::new(1, Duration::from_millis(1)));
        let judge = Arc::new(Judge::new(responder, dir.join("error.txt")));
        (Bench::new(AgentRunner::new(factory), judge), provider)
    }

    /// Answers summary prompts with "summary" and judge prompts from a queue.
    struct VerdictProvider {
        verdicts: Mutex<VecDeque<String>>,
        judge_prompts: Mutex<Vec<String>>,
    }

    impl VerdictProvider {
        fn new(verdicts: Vec<&str>) -> Self {
            Self {
                verdicts: Mutex::new(verdicts.into_iter().map(String::from).collect()),
                judge_prompts: Mutex::new(Vec::new()),
            }
        }

        fn judge_prompts(&self) -> Vec<String> {
            self.judge_prompts.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for VerdictProvider {
        async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
            let reply = if request.messages[0].content == SUMMARIZER_SYSTEM_PROMPT {
                "summary".to_string()
            } else {
                self.judge_prompts
                    .lock()
                    .unwrap()
                    .push(request.messages[1].content.clone());
                self.verdicts.lock().unwrap().pop_front().unwrap_or_default()
            };
            Ok(text_response(request.model, reply))
        }
    }

    #[tokio::test]
    async fn test_accepts_in_first_round() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(
            ScriptedAgentFactory::new(dir.path())
                .workspace("a", &["diff a"])
                .workspace("b", &["diff b"]),
        );
        let (bench, provider) = bench_with(factory.clone(), vec![r#"{"patch": "1"}"#], dir.path());

        let patch = bench.bench(&ids(&["a", "b"]), &issue()).await.unwrap();
        assert!(patch == "diff a" || patch == "diff b");
        assert_eq!(provider.judge_prompts().len(), 1);
        assert_eq!(factory.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_feedback_flows_into_next_round() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(
            ScriptedAgentFactory::new(dir.path()).workspace("a", &["diff a1", "diff a2"]),
        );
        let (bench, provider) = bench_with(
            factory.clone(),
            vec![r#"RUN AGAIN: the fix misses __slots__"#, r#"{"patch": 1}"#],
            dir.path(),
        );

        let patch = bench.bench(&ids(&["a"]), &issue()).await.unwrap();
        assert_eq!(patch, "diff a2");

        let messages = factory.messages();
        assert_eq!(messages.len(), 2);
        assert!(!messages[0].1.contains("already tried"));
        assert!(messages[1].1.contains("RUN AGAIN: the fix misses __slots__"));
        assert_eq!(provider.judge_prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_hard_judge_after_all_rounds_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(
            ScriptedAgentFactory::new(dir.path()).workspace("a", &["diff r1", "diff r2", "diff r3"]),
        );
        let (bench, provider) = bench_with(
            factory,
            vec!["RUN AGAIN", "RUN AGAIN", "RUN AGAIN", "Patch 1"],
            dir.path(),
        );

        let patch = bench.with_max_rounds(3).bench(&ids(&["a"]), &issue()).await.unwrap();
        assert_eq!(patch, "diff r3");

        let prompts = provider.judge_prompts();
        assert_eq!(prompts.len(), 4);
        assert!(prompts[3].contains("Patch 1:\ndiff r3"));
        assert!(!prompts[3].contains("Summary of the agent"));
    }

    #[tokio::test]
    async fn test_hard_judge_run_again_yields_empty_patch() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(ScriptedAgentFactory::new(dir.path()).workspace("a", &["diff"]));
        let (bench, _) = bench_with(factory, vec!["RUN AGAIN"; 3], dir.path());

        let patch = bench.with_max_rounds(2).bench(&ids(&["a"]), &issue()).await.unwrap();
        assert_eq!(patch, "");
    }

    #[tokio::test]
    async fn test_failed_workers_and_empty_patches_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(
            ScriptedAgentFactory::new(dir.path())
                .workspace("empty", &[""])
                .workspace("good", &["diff good"]),
        );
        let (bench, provider) = bench_with(factory, vec!["patch 1 it is"], dir.path());

        let patch = bench
            .with_workers(2)
            .bench(&ids(&["missing", "empty", "good"]), &issue())
            .await
            .unwrap();
        assert_eq!(patch, "diff good");
        let prompt = &provider.judge_prompts()[0];
        assert!(prompt.contains("Patch 1:\ndiff good"));
        assert!(!prompt.contains("Patch 2:"));
    }

    #[tokio::test]
    async fn test_no_patches_in_any_round() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(ScriptedAgentFactory::new(dir.path()).workspace("a", &[""]));
        let (bench, provider) = bench_with(factory.clone(), vec![], dir.path());

        let patch = bench.bench(&ids(&["a"]), &issue()).await.unwrap();
        assert_eq!(patch, "");
        assert!(provider.judge_prompts().is_empty());
        assert_eq!(factory.messages().len(), DEFAULT_MAX_ROUNDS);
    }
}
