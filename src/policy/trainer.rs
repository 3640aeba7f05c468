//! The external GRPO trainer seam.
//!
//! The policy optimizer is not part of this crate. An implementation of
//! [`PolicyTrainer`] receives everything a GRPO run needs: the resolved
//! trainer settings, the training split, the reward function, and the
//! checkpoint to resume from.

use crate::models::{Config, QuestionRecord, Result};
use crate::pipeline::RewardFn;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// GRPO settings as handed to the trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Checkpoints are written here as `checkpoint-<step>`
    pub output_dir: PathBuf,
    pub logging_steps: u32,
    pub save_steps: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub use_vllm: bool,
    pub vllm_server_host: String,
    pub vllm_server_port: u16,
    pub learning_rate: f64,
    pub scale_rewards: bool,
    pub max_prompt_length: u32,
    pub max_completion_length: u32,
    pub num_generations: u32,
    pub save_total_limit: u32,
    pub max_grad_norm: f64,
    pub num_iterations: u32,
    pub per_device_train_batch_size: u32,
    pub beta: f64,
}

impl TrainerConfig {
    pub fn from_config(config: &Config, output_dir: &Path) -> Self {
        let train = &config.train;
        Self {
            output_dir: output_dir.to_path_buf(),
            logging_steps: train.logging_steps,
            save_steps: train.save_steps,
            temperature: train.gen_temperature,
            top_p: train.top_p,
            top_k: train.top_k,
            use_vllm: train.use_vllm,
            vllm_server_host: "localhost".to_string(),
            vllm_server_port: config.resources.action_port,
            learning_rate: train.learning_rate,
            scale_rewards: train.scale_rewards,
            max_prompt_length: train.max_prompt_length,
            max_completion_length: train.max_completion_length,
            num_generations: train.num_generations,
            save_total_limit: train.save_total_limit,
            max_grad_norm: train.max_grad_norm,
            num_iterations: train.num_iterations,
            per_device_train_batch_size: train.per_device_train_batch_size,
            beta: train.beta,
        }
    }
}

/// One training invocation.
pub struct TrainingRun<'a> {
    /// Policy model identifier
    pub model: &'a str,
    pub config: TrainerConfig,
    pub train_dataset: Vec<QuestionRecord>,
    pub reward_fn: &'a dyn RewardFn,
    pub resume_from_checkpoint: Option<&'a Path>,
}

/// A GRPO-style trainer driven by [`RewardFn`] rewards.
#[async_trait]
pub trait PolicyTrainer: Send {
    async fn train(&mut self, run: TrainingRun<'_>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trainer_config_follows_train_section() {
        let config = Config::from_toml_str(
            r#"
[model]
policy = "p"

[dataset]
name = "mmlu"
path = "d"

[train]
learning_rate = 5e-7
num_generations = 4
use_vllm = true

[resources]
action_port = 8100
"#,
        )
        .unwrap();

        let tc = TrainerConfig::from_config(&config, Path::new("logs/trial"));
        assert_eq!(tc.output_dir, PathBuf::from("logs/trial"));
        assert_eq!(tc.learning_rate, 5e-7);
        assert_eq!(tc.num_generations, 4);
        assert!(tc.use_vllm);
        assert_eq!(tc.vllm_server_port, 8100);
        assert_eq!(tc.save_total_limit, 3);
    }
}
