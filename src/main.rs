//! hintcal CLI - calibration rewards and evaluation for hint policies.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hintcal::{Agent, Config, RewardFn, RewardFunction, RewardInput, RunArgs, ServedModel};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "hintcal")]
#[command(version)]
#[command(about = "Calibration rewards and evaluation for hint-generating policy models")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Root folder for trial logs
    #[arg(long, global = true, default_value = "logs")]
    log_folder: PathBuf,

    /// Trial name; logs go to <log-folder>/<trial-name>
    #[arg(long, global = true, default_value = "default")]
    trial_name: String,

    /// Estimate answer entropy by Monte Carlo sampling during eval
    #[arg(long, global = true)]
    entropy: bool,

    /// Downstream model is a closed-source provider model
    #[arg(long, global = true)]
    closed_source: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the served policy on the evaluation split
    Eval,

    /// Compute rewards for a JSONL batch of completions
    Score {
        /// JSONL file, one {completion, question, gt_answer, options} per line
        #[arg(short, long)]
        batch: PathBuf,

        /// Write the reward array here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

impl Cli {
    fn run_args(&self) -> RunArgs {
        RunArgs {
            log_folder: self.log_folder.clone(),
            trial_name: self.trial_name.clone(),
            entropy: self.entropy,
            closed_source: self.closed_source,
        }
    }

    fn load_config(&self) -> Result<Config> {
        Config::from_file(&self.config)
            .with_context(|| format!("Failed to load config from {:?}", self.config))
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# hintcal configuration file

[model]
# Policy model handed to the trainer (hub id or local path)
policy = "Qwen/Qwen2.5-1.5B-Instruct"
# Downstream model; omit to use the first model served on downstream_port
# downstream = "gpt-4o-mini"

[downstream]
# closed_source = false
# base_url = "http://localhost:8000/v1"
gen_temperature = 0.7
top_p = 1.0
max_completion_tokens = 1024
timeout_secs = 180

[downstream.retry]
max_retries = 3
base_backoff_ms = 1000
max_backoff_secs = 60

[policy]
# Served policy used by `hintcal eval`; defaults to localhost:<action_port>
# base_url = "http://localhost:8001/v1"

[resources]
downstream_port = 8000
action_port = 8001

[train]
learning_rate = 1e-6
logging_steps = 10
save_steps = 250
gen_temperature = 0.9
top_p = 1.0
top_k = 50
use_vllm = true
scale_rewards = true
max_prompt_length = 512
max_completion_length = 256
num_generations = 8
max_grad_norm = 1.0
num_iterations = 1
per_device_train_batch_size = 8
beta = 0.04

[dataset]
name = "mmlu"
path = "data/mmlu"
split_names = ["train", "test"]

[eval]
mc_samples = 40
ece_bins = 10

[api_keys]
# openai = "${OPENAI_API_KEY}"
# anthropic = "${ANTHROPIC_API_KEY}"
"#;
    println!("{example}");
}

fn load_batch(path: &Path) -> Result<Vec<RewardInput>> {
    let file = File::open(path).with_context(|| format!("Failed to open batch {path:?}"))?;
    let mut batch = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("Failed to read batch")?;
        if line.trim().is_empty() {
            continue;
        }
        let input: RewardInput = serde_json::from_str(&line)
            .with_context(|| format!("Invalid batch entry on line {}", line_num + 1))?;
        batch.push(input);
    }
    Ok(batch)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match &cli.command {
        Commands::Example => {
            print_example_config();
        }

        Commands::Validate => {
            let config = cli.load_config()?;
            let endpoint = config
                .downstream_endpoint(cli.closed_source)
                .context("Failed to resolve downstream endpoint")?;

            info!("Configuration is valid");
            info!("  Policy model: {}", config.model.policy);
            info!(
                "  Downstream: {} ({})",
                endpoint.model.as_deref().unwrap_or("first served model"),
                endpoint.base_url
            );
            info!(
                "  Dataset: {} at {:?}, splits {:?}",
                config.dataset.name, config.dataset.path, config.dataset.split_names
            );
            info!(
                "  Eval: {} MC samples, {} ECE bins",
                config.eval.mc_samples, config.eval.ece_bins
            );
        }

        Commands::Score { batch, output } => {
            let config = cli.load_config()?;
            let inputs = load_batch(batch)?;
            let downstream = ServedModel::downstream(&config, cli.closed_source)
                .context("Failed to configure downstream model")?;

            let reward_fn = RewardFunction::new(&downstream, config.dataset.name.clone());
            let rewards = reward_fn
                .rewards(&inputs)
                .await
                .context("Failed to compute rewards")?;

            let json = serde_json::to_string(&rewards)?;
            match output {
                Some(path) => {
                    let mut file = File::create(path)
                        .with_context(|| format!("Failed to create {path:?}"))?;
                    writeln!(file, "{json}")?;
                    info!(count = rewards.len(), path = ?path, "Rewards written");
                }
                None => println!("{json}"),
            }
        }

        Commands::Eval => {
            let config = cli.load_config()?;
            let policy = ServedModel::policy(&config).context("Failed to configure policy")?;
            let agent = Agent::new(cli.run_args(), config).context("Failed to set up agent")?;

            let results = agent.eval(&policy).await.context("Evaluation failed")?;

            let fmt_entropy =
                |e: Option<f64>| e.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"));
            println!("\n=== Evaluation Complete ===");
            println!("                 calibrated   baseline");
            println!(
                "Accuracy:        {:>10.4} {:>10.4}",
                results.calibrated_accuracy, results.baseline_accuracy
            );
            println!(
                "ECE:             {:>10.4} {:>10.4}",
                results.calibrated_ece, results.baseline_ece
            );
            println!(
                "Confidence avg:  {:>10.4} {:>10.4}",
                results.calibrated_confidence_avg, results.baseline_confidence_avg
            );
            println!(
                "Confidence std:  {:>10.4} {:>10.4}",
                results.calibrated_confidence_std, results.baseline_confidence_std
            );
            println!(
                "Entropy mean:    {:>10} {:>10}",
                fmt_entropy(results.calibrated_entropy_mean),
                fmt_entropy(results.baseline_entropy_mean)
            );
            println!(
                "Checkpoint:      {}",
                results.checkpoint.as_deref().unwrap_or("none")
            );
            println!("Output:          {:?}", agent.log_path());
        }
    }

    Ok(())
}
