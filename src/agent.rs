//! The agent: composition root for training and evaluation.
//!
//! Construction resolves the trial's log path, discovers the checkpoint to
//! resume from (once), writes the run snapshot and builds the downstream
//! model. The downstream model is then lent read-only to the reward
//! function and the evaluation loop.

use crate::checkpoint::{LogDir, find_last_checkpoint};
use crate::client::ServedModel;
use crate::dataset::load_split;
use crate::models::{Config, EvalResults, Result, RunArgs};
use crate::pipeline::{EvalSettings, Evaluator, RewardFunction};
use crate::policy::{PolicyGenerator, PolicyTrainer, TrainerConfig, TrainingRun};
use crate::query::DownstreamModel;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct Agent<D = ServedModel> {
    args: RunArgs,
    config: Config,
    log_dir: LogDir,
    checkpoint: Option<PathBuf>,
    downstream: D,
}

impl Agent<ServedModel> {
    /// Agent with the downstream model described by `config`.
    pub fn new(args: RunArgs, config: Config) -> Result<Self> {
        let downstream = ServedModel::downstream(&config, args.closed_source)?;
        Self::with_downstream(args, config, downstream)
    }
}

impl<D: DownstreamModel> Agent<D> {
    pub fn with_downstream(args: RunArgs, config: Config, downstream: D) -> Result<Self> {
        let log_path = args.log_path();
        let checkpoint = find_last_checkpoint(&log_path);
        match &checkpoint {
            Some(path) => info!(checkpoint = %path.display(), "Resuming from checkpoint"),
            None => info!(log_path = %log_path.display(), "No checkpoint found, starting fresh"),
        }

        let log_dir = LogDir::init(&log_path, &args, &config, checkpoint.is_some())?;

        Ok(Self {
            args,
            config,
            log_dir,
            checkpoint,
            downstream,
        })
    }

    /// Whether a checkpoint was found at construction.
    pub fn resume(&self) -> bool {
        self.checkpoint.is_some()
    }

    pub fn checkpoint(&self) -> Option<&Path> {
        self.checkpoint.as_deref()
    }

    pub fn log_path(&self) -> &Path {
        self.log_dir.path()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn downstream(&self) -> &D {
        &self.downstream
    }

    /// Reward function over this agent's downstream model.
    pub fn reward_fn(&self) -> RewardFunction<'_, D> {
        RewardFunction::new(&self.downstream, self.config.dataset.name.clone())
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig::from_config(&self.config, self.log_dir.path())
    }

    /// Train the policy on the training split, resuming if possible.
    pub async fn train<T: PolicyTrainer + ?Sized>(&self, trainer: &mut T) -> Result<()> {
        let dataset = &self.config.dataset;
        let train_dataset = load_split(dataset, dataset.train_split())?;
        let reward_fn = self.reward_fn();

        info!(
            model = %self.config.model.policy,
            samples = train_dataset.len(),
            resume = self.resume(),
            "Starting GRPO training"
        );

        trainer
            .train(TrainingRun {
                model: &self.config.model.policy,
                config: self.trainer_config(),
                train_dataset,
                reward_fn: &reward_fn,
                resume_from_checkpoint: self.checkpoint(),
            })
            .await
    }

    /// Evaluate `policy` on the evaluation split and persist the results.
    pub async fn eval<P: PolicyGenerator + ?Sized>(&self, policy: &P) -> Result<EvalResults> {
        let checkpoint = match &self.checkpoint {
            Some(path) => {
                info!(checkpoint = %path.display(), "Evaluating checkpoint");
                Some(path.display().to_string())
            }
            None => {
                warn!("No checkpoint found, evaluating the served policy as-is");
                None
            }
        };

        let dataset = &self.config.dataset;
        let records = load_split(dataset, dataset.eval_split())?;

        let settings = EvalSettings {
            dataset_name: dataset.name.clone(),
            entropy: self.args.entropy,
            mc_samples: self.config.eval.mc_samples,
            ece_bins: self.config.eval.ece_bins,
            show_progress: true,
        };
        let outcome = Evaluator::new(&self.downstream, policy, settings)
            .run(&records, checkpoint)
            .await?;

        self.log_dir.write_eval_samples(&outcome.samples)?;
        self.log_dir.write_eval_results(&outcome.results)?;
        Ok(outcome.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Completion, HintcalError, Message, RewardInput};
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    struct AlwaysFirst;

    #[async_trait]
    impl DownstreamModel for AlwaysFirst {
        async fn send(&self, _message: Message) -> Result<String> {
            Ok("Answer: 1\nConfidence: 0.8".into())
        }
    }

    struct Echo;

    #[async_trait]
    impl PolicyGenerator for Echo {
        async fn generate(&self, prompt: &[Message]) -> Result<String> {
            Ok(prompt[0].content.clone())
        }
    }

    const RECORDS: &str = concat!(
        r#"{"question": "q1", "options": ["a", "b"], "gt_answer": 1, "prompt": [{"role": "user", "content": "p1"}]}"#,
        "\n",
        r#"{"question": "q2", "options": ["a", "b"], "gt_answer": 2, "prompt": [{"role": "user", "content": "p2"}]}"#,
        "\n",
    );

    fn setup(temp_dir: &TempDir) -> (RunArgs, Config) {
        let data = temp_dir.path().join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("train.jsonl"), RECORDS).unwrap();
        fs::write(data.join("test.jsonl"), RECORDS).unwrap();

        let toml = format!(
            "[model]\npolicy = \"p\"\n[dataset]\nname = \"mmlu\"\npath = {:?}\n",
            data.to_string_lossy()
        );
        let args = RunArgs {
            log_folder: temp_dir.path().join("logs"),
            trial_name: "t1".into(),
            entropy: false,
            closed_source: false,
        };
        (args, Config::from_toml_str(&toml).unwrap())
    }

    #[test]
    fn test_fresh_run_has_no_checkpoint() {
        let temp_dir = TempDir::new().unwrap();
        let (args, config) = setup(&temp_dir);

        let agent = Agent::with_downstream(args, config, AlwaysFirst).unwrap();

        assert!(!agent.resume());
        assert!(agent.log_path().join("run_args.json").exists());
    }

    #[test]
    fn test_existing_checkpoint_is_resumed() {
        let temp_dir = TempDir::new().unwrap();
        let (args, config) = setup(&temp_dir);
        fs::create_dir_all(args.log_path().join("checkpoint-500")).unwrap();
        fs::create_dir_all(args.log_path().join("checkpoint-1500")).unwrap();

        let agent = Agent::with_downstream(args, config, AlwaysFirst).unwrap();

        assert!(agent.resume());
        assert!(agent.checkpoint().unwrap().ends_with("checkpoint-1500"));
    }

    #[tokio::test]
    async fn test_eval_writes_results() {
        let temp_dir = TempDir::new().unwrap();
        let (args, config) = setup(&temp_dir);
        let agent = Agent::with_downstream(args, config, AlwaysFirst).unwrap();

        let results = agent.eval(&Echo).await.unwrap();

        assert_eq!(results.calibrated_accuracy, 0.5);
        assert_eq!(results.checkpoint, None);
        let written: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(agent.log_path().join("eval_results.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(written["baseline_accuracy"], 0.5);
        assert!(written["checkpoint"].is_null());
        assert!(written["calibrated_entropy_mean"].is_null());

        let samples = fs::read_to_string(agent.log_path().join("eval_samples.jsonl")).unwrap();
        assert_eq!(samples.lines().count(), 2);
    }

    struct RecordingTrainer {
        rewards: Vec<f64>,
        resume_from: Option<PathBuf>,
        output_dir: PathBuf,
    }

    #[async_trait]
    impl PolicyTrainer for RecordingTrainer {
        async fn train(&mut self, run: TrainingRun<'_>) -> Result<()> {
            let batch = RewardInput::from_columns(
                run.train_dataset
                    .iter()
                    .map(|r| Completion::Text(format!("hint for {}", r.question)))
                    .collect(),
                Some(run.train_dataset.iter().map(|r| r.question.clone()).collect()),
                Some(run.train_dataset.iter().map(|r| r.gt_answer).collect()),
                Some(run.train_dataset.iter().map(|r| r.options.clone()).collect()),
            )?;
            self.rewards = run.reward_fn.rewards(&batch).await?;
            self.resume_from = run.resume_from_checkpoint.map(Path::to_path_buf);
            self.output_dir = run.config.output_dir;
            if run.model != "p" {
                return Err(HintcalError::Trainer("wrong model".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_train_hands_reward_fn_to_trainer() {
        let temp_dir = TempDir::new().unwrap();
        let (args, config) = setup(&temp_dir);
        fs::create_dir_all(args.log_path().join("checkpoint-250")).unwrap();
        let agent = Agent::with_downstream(args, config, AlwaysFirst).unwrap();

        let mut trainer = RecordingTrainer {
            rewards: Vec::new(),
            resume_from: None,
            output_dir: PathBuf::new(),
        };
        agent.train(&mut trainer).await.unwrap();

        assert_eq!(trainer.rewards.len(), 2);
        assert!((trainer.rewards[0] - 0.8f64.ln()).abs() < 1e-12);
        assert!((trainer.rewards[1] - 0.2f64.ln()).abs() < 1e-9);
        assert!(trainer.resume_from.unwrap().ends_with("checkpoint-250"));
        assert_eq!(trainer.output_dir, agent.log_path());
    }
}
