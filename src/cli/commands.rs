//! CLI command definitions for swe-vote.
//!
//! `bench` runs the best-of-N voting loop over SWE-bench instances,
//! `reviews listen` serves the Slack review bot and `triggers` manages
//! trigger instances on the hosted toolset.

use crate::agent::CommandAgentFactory;
use crate::bench::{
    dry_run_summary, run_dir, write_summary, AgentRunner, Bench, DockerPool, Harness, Judge,
    RunSummary, PREDICTIONS_FILE,
};
use crate::config::{BenchConfig, ReviewConfig};
use crate::dataset::{InstanceSelection, SweBenchLoader, DEFAULT_DATASET, DEFAULT_SPLIT};
use crate::llm::{ChatClient, LlmResponder, ModelProfile};
use crate::reviews::ReviewBot;
use crate::toolset::{HttpToolset, TriggerListener, TriggerStatus, WorkspaceOptions};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Best-of-N SWE-bench runner and trigger-driven review agent.
#[derive(Parser)]
#[command(name = "swe-vote")]
#[command(about = "Run coding agents best-of-N on SWE-bench with an LLM judge")]
#[command(version)]
#[command(
    long_about = "swe-vote runs several coding agents on each SWE-bench issue, lets an LLM judge pick a patch or send them back for another round, and writes SWE-bench predictions.\n\nIt also serves a Slack-triggered browser agent that summarizes product reviews.\n\nExample usage:\n  swe-vote bench --test-split 1:5 --num-instances 3 --run-id nightly"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the voting benchmark over SWE-bench instances.
    Bench(Box<BenchArgs>),

    /// Slack review bot.
    Reviews(ReviewsArgs),

    /// Manage trigger instances on the hosted toolset.
    Triggers(TriggersArgs),
}

/// Arguments for `swe-vote bench`.
#[derive(Parser, Debug)]
pub struct BenchArgs {
    /// Test range `start:end` into the split. Maximum 500 tests per project.
    #[arg(long, default_value = "1:2")]
    pub test_split: String,

    /// Comma-separated instance ids; when given the whole 0:500 range is searched.
    #[arg(long)]
    pub test_instance_ids: Option<String>,

    /// Run identifier; outputs land in `{output}/{run_id}`.
    #[arg(long, default_value = "temp")]
    pub run_id: String,

    /// HuggingFace dataset id, or a local `.jsonl` file of instances.
    #[arg(long, default_value = DEFAULT_DATASET)]
    pub dataset: String,

    /// Parallel workspaces per issue.
    #[arg(long, default_value = "1")]
    pub num_instances: usize,

    /// Dataset split.
    #[arg(long, default_value = DEFAULT_SPLIT)]
    pub split: String,

    /// Command that runs the coding agent inside each workspace.
    #[arg(long)]
    pub agent_cmd: Option<String>,

    /// Docker image for the workspaces.
    #[arg(long)]
    pub docker_image: Option<String>,

    /// Output directory (defaults to ./bench-runs).
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// YAML config file layered under environment overrides.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Resolve the instance selection and write summary.json without running agents.
    #[arg(long)]
    pub dry_run: bool,

    /// How prompts are shaped for the judge model (system-and-human, human-only).
    #[arg(long)]
    pub model_profile: Option<String>,

    /// Judge and summarizer model.
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Include the dataset's hints in the issue description.
    #[arg(long)]
    pub hints: bool,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// `swe-vote reviews` entrypoint arguments.
#[derive(Parser, Debug)]
pub struct ReviewsArgs {
    #[command(subcommand)]
    pub command: ReviewsSubcommand,
}

#[derive(clap::Subcommand, Debug)]
pub enum ReviewsSubcommand {
    /// Listen for Slack messages and summarize the linked product's reviews.
    Listen(ReviewsListenArgs),
}

/// Arguments for `swe-vote reviews listen`.
#[derive(Parser, Debug)]
pub struct ReviewsListenArgs {
    /// Slack channel to watch and reply in.
    #[arg(long)]
    pub channel: Option<String>,

    /// Webhook listen address (host:port).
    #[arg(long)]
    pub addr: Option<String>,

    /// Model driving the browser agent.
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Trigger name to react to.
    #[arg(long)]
    pub trigger_name: Option<String>,
}

/// `swe-vote triggers` entrypoint arguments.
#[derive(Parser, Debug)]
pub struct TriggersArgs {
    #[command(subcommand)]
    pub command: TriggersSubcommand,

    /// Output JSON.
    #[arg(short = 'j', long, global = true)]
    pub json: bool,
}

#[derive(clap::Subcommand, Debug)]
pub enum TriggersSubcommand {
    /// List available triggers.
    List {
        /// Comma-separated app names to filter on (e.g. slack,github).
        #[arg(long)]
        apps: Option<String>,
    },

    /// Create a trigger instance for a connected account.
    Setup {
        /// Trigger name, e.g. slack_receive_message.
        trigger_name: String,

        /// Connected account the trigger is attached to.
        #[arg(long)]
        connected_account: String,

        /// Trigger configuration as a JSON object.
        #[arg(long, default_value = "{}")]
        config: String,
    },

    /// Enable a trigger instance.
    Enable { trigger_id: String },

    /// Disable a trigger instance.
    Disable { trigger_id: String },
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Bench(args) => run_bench_command(*args).await,
        Commands::Reviews(args) => match args.command {
            ReviewsSubcommand::Listen(args) => run_reviews_listen_command(args).await,
        },
        Commands::Triggers(args) => run_triggers_command(args).await,
    }
}

// ============================================================================
// Bench
// ============================================================================

/// Layer defaults, the YAML file, `SWEVOTE_*` variables and CLI flags.
fn resolve_bench_config(args: &BenchArgs) -> anyhow::Result<BenchConfig> {
    let mut config = match &args.config {
        Some(path) => BenchConfig::from_yaml_file(path)?.apply_env()?,
        None => BenchConfig::from_env()?,
    };

    if let Some(cmd) = &args.agent_cmd {
        config = config.with_agent_cmd(cmd.clone());
    }
    if let Some(image) = &args.docker_image {
        config = config.with_docker_image(image.clone());
    }
    if let Some(output) = &args.output {
        config = config.with_output_dir(output.clone());
    }
    if let Some(model) = &args.model {
        config = config.with_model(model.clone());
    }
    if let Some(profile) = &args.model_profile {
        let profile: ModelProfile = profile.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        config = config.with_model_profile(profile);
    }

    config.validate()?;
    Ok(config)
}

async fn run_bench_command(args: BenchArgs) -> anyhow::Result<()> {
    let config = resolve_bench_config(&args)?;
    let selection = InstanceSelection::from_args(
        &args.test_split,
        args.test_instance_ids.as_deref().unwrap_or_default(),
    )?;

    let loader = SweBenchLoader::new(args.dataset.clone(), args.split.clone()).with_hints(args.hints);
    let issues = loader.load(&selection).await?;
    let out_dir = run_dir(&config.output_dir, &args.run_id);
    info!(
        dataset = %args.dataset,
        split = %args.split,
        instances = issues.len(),
        run_dir = %out_dir.display(),
        "Loaded instances"
    );

    if args.dry_run {
        let summary = dry_run_summary(&issues, &args.run_id, &config.model);
        write_summary(&out_dir, &summary).await?;
        print_summary(&summary, &out_dir, args.json)?;
        return Ok(());
    }

    let client = Arc::new(ChatClient::from_env(config.model.clone()).map_err(|e| {
        anyhow::anyhow!(
            "Failed to initialize LLM client: {}. Set SWEVOTE_LLM_API_KEY or OPENAI_API_KEY.",
            e
        )
    })?);
    let responder = LlmResponder::new(client, config.model.clone(), config.model_profile)
        .with_retry_policy(config.retry_policy());
    let judge = Arc::new(Judge::new(responder, config.judge_error_path.clone()));

    let factory = Arc::new(CommandAgentFactory::new(
        config.agent_cmd.clone(),
        config.agent_timeout_secs.saturating_mul(1000),
    ));
    let runner = AgentRunner::new(factory.clone()).with_recursion_limit(config.recursion_limit);
    let bench = Bench::new(runner, judge)
        .with_workers(config.workers)
        .with_max_rounds(config.max_rounds);

    let options = WorkspaceOptions {
        image: config.docker_image.clone(),
        agent_dir: config.agent_dir.clone(),
        keep: config.keep_workspaces,
        ..WorkspaceOptions::default()
    };
    let pool = Arc::new(DockerPool::new(factory, options));
    let harness = Harness::new(bench, pool, args.num_instances).with_model(config.model.clone());

    let summary = harness.run(&issues, &out_dir, &args.run_id).await?;
    print_summary(&summary, &out_dir, args.json)
}

fn print_summary(summary: &RunSummary, out_dir: &Path, json: bool) -> anyhow::Result<()> {
    if json {
        let output = serde_json::to_string_pretty(summary)
            .map_err(|e| anyhow::anyhow!("Failed to serialize summary JSON: {}", e))?;
        println!("{}", output);
        return Ok(());
    }

    println!("Run {} ({})", summary.run_id, summary.model);
    println!("  Instances: {}", summary.instances.len());
    if summary.dry_run {
        for id in &summary.instances {
            println!("    {}", id);
        }
        println!("  Dry run: no agents were started");
    } else {
        println!("  Patched:   {}", summary.patched);
        println!("  Failed:    {}", summary.failed.len());
        println!("  Predictions: {}", out_dir.join(PREDICTIONS_FILE).display());
    }
    Ok(())
}

// ============================================================================
// Reviews
// ============================================================================

fn resolve_review_config(args: &ReviewsListenArgs) -> anyhow::Result<ReviewConfig> {
    let mut config = ReviewConfig::from_env()?;
    if let Some(channel) = &args.channel {
        config = config.with_channel_id(channel.clone());
    }
    if let Some(addr) = &args.addr {
        config = config.with_listen_addr(addr.clone());
    }
    if let Some(model) = &args.model {
        config = config.with_model(model.clone());
    }
    if let Some(trigger) = &args.trigger_name {
        config.trigger_name = trigger.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn run_reviews_listen_command(args: ReviewsListenArgs) -> anyhow::Result<()> {
    let config = resolve_review_config(&args)?;
    let toolset = Arc::new(HttpToolset::from_env()?);
    let llm = Arc::new(ChatClient::from_env(config.model.clone())?);
    let addr = config.socket_addr()?;

    let bot = Arc::new(ReviewBot::new(toolset, llm, &config));
    let mut listener = TriggerListener::new();
    bot.register(&mut listener, &config.trigger_name);

    info!(
        channel = %config.channel_id,
        trigger = %config.trigger_name,
        addr = %addr,
        "Review bot listening"
    );
    listener.listen(addr).await?;
    Ok(())
}

// ============================================================================
// Triggers
// ============================================================================

fn parse_app_filter(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn print_status(action: &str, status: &TriggerStatus, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
    } else {
        match &status.trigger_id {
            Some(id) => println!("{}: {} ({})", action, status.status, id),
            None => println!("{}: {}", action, status.status),
        }
    }
    if !status.is_success() {
        warn!(action = action, status = %status.status, "Trigger request did not succeed");
    }
    Ok(())
}

async fn run_triggers_command(args: TriggersArgs) -> anyhow::Result<()> {
    let toolset = HttpToolset::from_env()?;
    info!(base_url = %toolset.base_url(), api_key = %toolset.api_key_masked(), "Using hosted toolset");

    match args.command {
        TriggersSubcommand::List { apps } => {
            let triggers = toolset.list_triggers(&parse_app_filter(apps.as_deref())).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&triggers)?);
            } else {
                for trigger in &triggers {
                    println!("{:<40} {:<12} {}", trigger.name, trigger.app_name, trigger.display_name);
                }
                println!("{} triggers", triggers.len());
            }
        }
        TriggersSubcommand::Setup {
            trigger_name,
            connected_account,
            config,
        } => {
            let config: serde_json::Value = serde_json::from_str(&config)
                .map_err(|e| anyhow::anyhow!("--config is not valid JSON: {}", e))?;
            let status = toolset
                .setup_trigger(&connected_account, &trigger_name, config)
                .await?;
            print_status("setup", &status, args.json)?;
        }
        TriggersSubcommand::Enable { trigger_id } => {
            let status = toolset.enable_trigger(&trigger_id).await?;
            print_status("enable", &status, args.json)?;
        }
        TriggersSubcommand::Disable { trigger_id } => {
            let status = toolset.disable_trigger(&trigger_id).await?;
            print_status("disable", &status, args.json)?;
        }
    }
    Ok(())
}
