//! Run configuration for the benchmark and the review bot.
//!
//! Values come from three layers, later ones winning:
//! defaults, then an optional YAML file, then `SWEVOTE_*` environment
//! variables. CLI flags are applied on top by the caller through the
//! `with_*` builders.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::llm::{ModelProfile, RetryPolicy};

/// Default judge/summarizer model.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20240620";

/// Default trigger the review bot listens for.
pub const SLACK_RECEIVE_MESSAGE: &str = "slack_receive_message";

/// Configuration for `swe-vote bench`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    // Voting
    /// Size of the worker pool running agents concurrently.
    pub workers: usize,
    /// Soft-judged rounds before the hard judge decides.
    pub max_rounds: usize,
    /// Step budget handed to each agent run.
    pub recursion_limit: usize,
    /// File the judge's unparseable responses are written to.
    pub judge_error_path: PathBuf,

    // LLM
    pub model: String,
    pub model_profile: ModelProfile,
    pub llm_max_retries: u32,
    pub llm_base_delay_ms: u64,

    // Agent + workspace
    /// Command that runs the coding agent inside the workspace.
    pub agent_cmd: String,
    /// Host directory mounted at `/agent` in each workspace.
    pub agent_dir: Option<PathBuf>,
    pub agent_timeout_secs: u64,
    pub docker_image: String,
    pub keep_workspaces: bool,

    // Output
    pub output_dir: PathBuf,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            max_rounds: 3,
            recursion_limit: 50,
            judge_error_path: PathBuf::from("error.txt"),
            model: DEFAULT_MODEL.to_string(),
            model_profile: ModelProfile::SystemAndHuman,
            llm_max_retries: 5,
            llm_base_delay_ms: 1000,
            agent_cmd: "python -m baseagent".to_string(),
            agent_dir: None,
            agent_timeout_secs: 1800,
            docker_image: "python:3.12-slim".to_string(),
            keep_workspaces: false,
            output_dir: PathBuf::from("./bench-runs"),
        }
    }
}

impl BenchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a (possibly partial) YAML config file over the defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Defaults overridden by environment variables.
    ///
    /// - `SWEVOTE_WORKERS` (default: 3)
    /// - `SWEVOTE_MAX_ROUNDS` (default: 3)
    /// - `SWEVOTE_RECURSION_LIMIT` (default: 50)
    /// - `SWEVOTE_JUDGE_ERROR_PATH` (default: error.txt)
    /// - `SWEVOTE_LLM_MODEL` (default: claude-3-5-sonnet-20240620)
    /// - `SWEVOTE_MODEL_PROFILE`: system-and-human | human-only
    /// - `SWEVOTE_LLM_MAX_RETRIES` (default: 5)
    /// - `SWEVOTE_LLM_BASE_DELAY_MS` (default: 1000)
    /// - `SWEVOTE_AGENT_CMD` (default: python -m baseagent)
    /// - `SWEVOTE_AGENT_DIR`
    /// - `SWEVOTE_AGENT_TIMEOUT_SECS` (default: 1800)
    /// - `SWEVOTE_DOCKER_IMAGE` (default: python:3.12-slim)
    /// - `SWEVOTE_KEEP_WORKSPACES` (default: false)
    /// - `SWEVOTE_OUTPUT_DIR` (default: ./bench-runs)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Apply `SWEVOTE_*` overrides on top of `self`.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Some(val) = env_var("SWEVOTE_WORKERS") {
            self.workers = parse_env_value(&val, "SWEVOTE_WORKERS")?;
        }
        if let Some(val) = env_var("SWEVOTE_MAX_ROUNDS") {
            self.max_rounds = parse_env_value(&val, "SWEVOTE_MAX_ROUNDS")?;
        }
        if let Some(val) = env_var("SWEVOTE_RECURSION_LIMIT") {
            self.recursion_limit = parse_env_value(&val, "SWEVOTE_RECURSION_LIMIT")?;
        }
        if let Some(val) = env_var("SWEVOTE_JUDGE_ERROR_PATH") {
            self.judge_error_path = PathBuf::from(val);
        }
        if let Some(val) = env_var("SWEVOTE_LLM_MODEL") {
            self.model = val;
        }
        if let Some(val) = env_var("SWEVOTE_MODEL_PROFILE") {
            self.model_profile = val.parse().map_err(|message| ConfigError::InvalidValue {
                key: "SWEVOTE_MODEL_PROFILE".to_string(),
                message,
            })?;
        }
        if let Some(val) = env_var("SWEVOTE_LLM_MAX_RETRIES") {
            self.llm_max_retries = parse_env_value(&val, "SWEVOTE_LLM_MAX_RETRIES")?;
        }
        if let Some(val) = env_var("SWEVOTE_LLM_BASE_DELAY_MS") {
            self.llm_base_delay_ms = parse_env_value(&val, "SWEVOTE_LLM_BASE_DELAY_MS")?;
        }
        if let Some(val) = env_var("SWEVOTE_AGENT_CMD") {
            self.agent_cmd = val;
        }
        if let Some(val) = env_var("SWEVOTE_AGENT_DIR") {
            self.agent_dir = Some(PathBuf::from(val));
        }
        if let Some(val) = env_var("SWEVOTE_AGENT_TIMEOUT_SECS") {
            self.agent_timeout_secs = parse_env_value(&val, "SWEVOTE_AGENT_TIMEOUT_SECS")?;
        }
        if let Some(val) = env_var("SWEVOTE_DOCKER_IMAGE") {
            self.docker_image = val;
        }
        if let Some(val) = env_var("SWEVOTE_KEEP_WORKSPACES") {
            self.keep_workspaces = parse_env_bool(&val, "SWEVOTE_KEEP_WORKSPACES")?;
        }
        if let Some(val) = env_var("SWEVOTE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(val);
        }
        Ok(self)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "workers must be greater than 0".to_string(),
            ));
        }
        if self.max_rounds == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_rounds must be greater than 0".to_string(),
            ));
        }
        if self.recursion_limit == 0 {
            return Err(ConfigError::ValidationFailed(
                "recursion_limit must be greater than 0".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "model cannot be empty".to_string(),
            ));
        }
        if self.agent_cmd.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "agent_cmd cannot be empty".to_string(),
            ));
        }
        if self.docker_image.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "docker_image cannot be empty".to_string(),
            ));
        }
        if self.agent_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "agent_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.llm_max_retries,
            Duration::from_millis(self.llm_base_delay_ms),
        )
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds;
        self
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_judge_error_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.judge_error_path = path.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_model_profile(mut self, profile: ModelProfile) -> Self {
        self.model_profile = profile;
        self
    }

    pub fn with_agent_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.agent_cmd = cmd.into();
        self
    }

    pub fn with_agent_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.agent_dir = Some(dir.into());
        self
    }

    pub fn with_docker_image(mut self, image: impl Into<String>) -> Self {
        self.docker_image = image.into();
        self
    }

    pub fn with_keep_workspaces(mut self, keep: bool) -> Self {
        self.keep_workspaces = keep;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

/// Configuration for `swe-vote reviews listen`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Only messages from this Slack channel are handled.
    pub channel_id: String,
    pub trigger_name: String,
    pub listen_addr: String,
    pub model: String,
    /// Tool-call steps allowed per task.
    pub max_steps: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            channel_id: String::new(),
            trigger_name: SLACK_RECEIVE_MESSAGE.to_string(),
            listen_addr: "0.0.0.0:8787".to_string(),
            model: "gpt-4o".to_string(),
            max_steps: 15,
        }
    }
}

impl ReviewConfig {
    /// Defaults overridden by `SWEVOTE_SLACK_CHANNEL_ID`,
    /// `SWEVOTE_TRIGGER_NAME`, `SWEVOTE_LISTEN_ADDR`,
    /// `SWEVOTE_REVIEW_MODEL` and `SWEVOTE_REVIEW_MAX_STEPS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(val) = env_var("SWEVOTE_SLACK_CHANNEL_ID") {
            config.channel_id = val;
        }
        if let Some(val) = env_var("SWEVOTE_TRIGGER_NAME") {
            config.trigger_name = val;
        }
        if let Some(val) = env_var("SWEVOTE_LISTEN_ADDR") {
            config.listen_addr = val;
        }
        if let Some(val) = env_var("SWEVOTE_REVIEW_MODEL") {
            config.model = val;
        }
        if let Some(val) = env_var("SWEVOTE_REVIEW_MAX_STEPS") {
            config.max_steps = parse_env_value(&val, "SWEVOTE_REVIEW_MAX_STEPS")?;
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_id.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "channel_id cannot be empty".to_string(),
            ));
        }
        if self.trigger_name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "trigger_name cannot be empty".to_string(),
            ));
        }
        if self.max_steps == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_steps must be greater than 0".to_string(),
            ));
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: "listen_addr".to_string(),
                message: format!("could not parse '{}' as host:port", self.listen_addr),
            })
    }

    pub fn with_channel_id(mut self, channel: impl Into<String>) -> Self {
        self.channel_id = channel.into();
        self
    }

    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_bench_config() {
        let config = BenchConfig::default();
        assert_eq!(config.workers, 3);
        assert_eq!(config.max_rounds, 3);
        assert_eq!(config.recursion_limit, 50);
        assert_eq!(config.judge_error_path, PathBuf::from("error.txt"));
        assert_eq!(config.model_profile, ModelProfile::SystemAndHuman);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bench_config_builder() {
        let config = BenchConfig::new()
            .with_workers(5)
            .with_max_rounds(2)
            .with_recursion_limit(80)
            .with_model("o1-mini")
            .with_model_profile(ModelProfile::HumanOnly)
            .with_agent_cmd("python -m myagent")
            .with_docker_image("ubuntu:22.04")
            .with_keep_workspaces(true)
            .with_output_dir("/tmp/runs");

        assert_eq!(config.workers, 5);
        assert_eq!(config.max_rounds, 2);
        assert_eq!(config.recursion_limit, 80);
        assert_eq!(config.model, "o1-mini");
        assert_eq!(config.model_profile, ModelProfile::HumanOnly);
        assert_eq!(config.agent_cmd, "python -m myagent");
        assert!(config.keep_workspaces);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/runs"));
    }

    #[test]
    fn test_bench_validation_failures() {
        let cases = [
            (BenchConfig::default().with_workers(0), "workers"),
            (BenchConfig::default().with_max_rounds(0), "max_rounds"),
            (BenchConfig::default().with_recursion_limit(0), "recursion_limit"),
            (BenchConfig::default().with_model(" "), "model"),
            (BenchConfig::default().with_agent_cmd(""), "agent_cmd"),
            (BenchConfig::default().with_docker_image(""), "docker_image"),
        ];
        for (config, field) in cases {
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(field), "{err} should mention {field}");
        }
    }

    #[test]
    fn test_bench_config_from_partial_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "workers: 6\nmodel_profile: human-only\nmodel: o1-mini").unwrap();

        let config = BenchConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.workers, 6);
        assert_eq!(config.model_profile, ModelProfile::HumanOnly);
        assert_eq!(config.max_rounds, 3);
    }

    #[test]
    fn test_bench_config_rejects_bad_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "workers: many").unwrap();
        assert!(matches!(
            BenchConfig::from_yaml_file(file.path()),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_review_config() {
        let config = ReviewConfig::default();
        assert_eq!(config.trigger_name, "slack_receive_message");
        assert!(config.validate().is_err());

        let config = config.with_channel_id("C0123").with_listen_addr("127.0.0.1:9000");
        assert!(config.validate().is_ok());
        assert_eq!(config.socket_addr().unwrap().port(), 9000);

        let bad = ReviewConfig::default()
            .with_channel_id("C1")
            .with_listen_addr("nowhere");
        assert!(matches!(bad.validate(), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_parse_env_helpers() {
        assert_eq!(parse_env_value::<usize>(" 4 ", "K").unwrap(), 4);
        assert!(parse_env_value::<usize>("x", "K").is_err());
        assert!(parse_env_bool("YES", "K").unwrap());
        assert!(!parse_env_bool("off", "K").unwrap());
        assert!(parse_env_bool("maybe", "K").is_err());
    }
}
