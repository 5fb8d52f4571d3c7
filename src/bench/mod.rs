//! Best-of-N SWE-bench runner.
//!
//! Several coding agents attempt the same issue in separate workspaces; an
//! LLM judge picks the patch to submit or sends the agents back for another
//! round with its reasoning.
//!
//! - [`prompts`]: judge, summary and issue prompts
//! - [`judge`]: `choose_patch` and the judge response parsing
//! - [`runner`]: one agent attempt (`run_agent_function`) and patch collection
//! - [`vote`]: the round loop (`bench`)
//! - [`evaluate`]: dataset-wide harness writing `predictions.jsonl`

pub mod evaluate;
pub mod judge;
pub mod prompts;
pub mod runner;
pub mod vote;

pub use evaluate::{
    dry_run_summary, run_dir, write_summary, DockerPool, Harness, Prediction, RunSummary,
    WorkspacePool, MODEL_NAME_OR_PATH, PREDICTIONS_FILE, SUMMARY_FILE,
};
pub use judge::{parse_patch_number, AgentRun, Judge, JudgeOutcome};
pub use runner::{get_patch_from_response, AgentRunner, DEFAULT_RECURSION_LIMIT};
pub use vote::{Bench, DEFAULT_MAX_ROUNDS, DEFAULT_WORKERS};
