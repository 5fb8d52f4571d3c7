//! Command-line interface for swe-vote.
//!
//! Provides the benchmark runner, the review bot listener and trigger
//! management commands.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
