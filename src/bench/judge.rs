//! LLM judge choosing among candidate patches.

use futures::future::join_all;
use rand::seq::IndexedRandom;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::prompts::{
    build_comparison_prompt, build_comparison_prompt_hard, build_patch_block,
    build_summary_prompt, JUDGE_SYSTEM_PROMPT, RUN_AGAIN, SUMMARIZER_SYSTEM_PROMPT,
};
use crate::dataset::IssueConfig;
use crate::error::BenchError;
use crate::llm::LlmResponder;

/// One worker's output: the patch it produced and its run transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRun {
    pub patch: String,
    pub run_content: String,
}

impl AgentRun {
    pub fn new(patch: impl Into<String>, run_content: impl Into<String>) -> Self {
        Self {
            patch: patch.into(),
            run_content: run_content.into(),
        }
    }

    pub fn has_patch(&self) -> bool {
        !self.patch.trim().is_empty()
    }
}

/// The judge's decision.
///
/// When `accepted` is false, `patch` holds the judge's full response, which
/// becomes the feedback for the next round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeOutcome {
    pub patch: String,
    pub accepted: bool,
}

impl JudgeOutcome {
    fn accepted(patch: impl Into<String>) -> Self {
        Self {
            patch: patch.into(),
            accepted: true,
        }
    }

    fn rejected(response: impl Into<String>) -> Self {
        Self {
            patch: response.into(),
            accepted: false,
        }
    }
}

fn patch_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)patch.*?(\d+)").expect("valid regex"))
}

/// Patch number the judge chose, if it names one in `1..=count`.
///
/// The first "patch ... <number>" occurrence wins; the number must be in
/// range for the response to count.
pub fn parse_patch_number(response: &str, count: usize) -> Option<usize> {
    let caps = patch_number_re().captures(response)?;
    let number: usize = caps.get(1)?.as_str().parse().ok()?;
    (1..=count).contains(&number).then_some(number)
}

/// Chooses the best patch among candidates with an LLM.
pub struct Judge {
    responder: LlmResponder,
    error_path: PathBuf,
}

impl Judge {
    /// `error_path` receives the raw response whenever it cannot be parsed.
    pub fn new(responder: LlmResponder, error_path: impl Into<PathBuf>) -> Self {
        Self {
            responder,
            error_path: error_path.into(),
        }
    }

    pub fn error_path(&self) -> &Path {
        &self.error_path
    }

    async fn summarize(&self, run_content: &str) -> Result<String, BenchError> {
        let prompt = build_summary_prompt(run_content)?;
        Ok(self.responder.respond(SUMMARIZER_SYSTEM_PROMPT, &prompt).await)
    }

    /// Pick a patch from `runs` (runs without a patch are ignored).
    ///
    /// - no candidates: empty patch, not accepted
    /// - soft mode: each candidate's run is summarized first; a `RUN AGAIN`
    ///   answer is returned unaccepted as feedback
    /// - an unparseable answer is written to the error file and a random
    ///   candidate is accepted
    pub async fn choose_patch(
        &self,
        runs: &[AgentRun],
        issue: &IssueConfig,
        hard: bool,
    ) -> Result<JudgeOutcome, BenchError> {
        let candidates: Vec<&AgentRun> = runs.iter().filter(|r| r.has_patch()).collect();
        if candidates.is_empty() {
            return Ok(JudgeOutcome::rejected(""));
        }

        let summaries: Vec<Option<String>> = if hard {
            vec![None; candidates.len()]
        } else {
            join_all(candidates.iter().map(|run| self.summarize(&run.run_content)))
                .await
                .into_iter()
                .map(|s| s.map(Some))
                .collect::<Result<_, _>>()?
        };

        let patch_str = build_patch_block(
            candidates
                .iter()
                .zip(&summaries)
                .map(|(run, summary)| (run.patch.as_str(), summary.as_deref())),
        );

        let repo_name = issue.repo_short_name();
        let issue_desc = issue.description();
        let prompt = if hard {
            build_comparison_prompt_hard(repo_name, &issue_desc, &patch_str)?
        } else {
            build_comparison_prompt(repo_name, &issue_desc, &patch_str)?
        };
        let response = self.responder.respond(JUDGE_SYSTEM_PROMPT, &prompt).await;

        if response.contains(RUN_AGAIN) {
            tracing::info!(
                instance_id = %issue.instance_id,
                candidates = candidates.len(),
                hard = hard,
                "Judge asked to run again"
            );
            return Ok(JudgeOutcome::rejected(response));
        }

        if let Some(number) = parse_patch_number(&response, candidates.len()) {
            tracing::info!(
                instance_id = %issue.instance_id,
                patch = number,
                candidates = candidates.len(),
                hard = hard,
                "Judge chose patch"
            );
            return Ok(JudgeOutcome::accepted(candidates[number - 1].patch.clone()));
        }

        tracing::warn!(
            instance_id = %issue.instance_id,
            path = %self.error_path.display(),
            "Could not parse judge response, choosing a random patch"
        );
        if let Err(e) = tokio::fs::write(&self.error_path, &response).await {
            tracing::warn!(path = %self.error_path.display(), error = %e, "Failed to write judge response");
        }

        let patch = candidates
            .choose(&mut rand::rng())
            .map(|run| run.patch.clone())
            .unwrap_or_default();
        Ok(JudgeOutcome::accepted(patch))
    }
}
