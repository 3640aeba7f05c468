//! Policy completion generation for evaluation.

use crate::client::{ChatClient, RetryPolicy, SamplingParams, ServedModel};
use crate::models::{Config, Message, Result};
use async_trait::async_trait;
use tracing::info;

/// Produces one sampled hint for a prompt.
#[async_trait]
pub trait PolicyGenerator: Send + Sync {
    async fn generate(&self, prompt: &[Message]) -> Result<String>;
}

#[async_trait]
impl PolicyGenerator for ServedModel {
    async fn generate(&self, prompt: &[Message]) -> Result<String> {
        self.complete(prompt.to_vec()).await
    }
}

impl ServedModel {
    /// Served policy described by `[policy]`, sampling with the trainer's
    /// generation settings.
    pub fn policy(config: &Config) -> Result<Self> {
        let endpoint = config.policy_endpoint();
        info!(base_url = %endpoint.base_url, "Configured policy endpoint");

        let client = ChatClient::new(
            "policy",
            &endpoint,
            config
                .policy
                .timeout_secs
                .unwrap_or(config.downstream.timeout_secs),
            RetryPolicy::from(&config.policy.retry),
        )?;
        let sampling = SamplingParams {
            temperature: config.train.gen_temperature,
            top_p: config.train.top_p,
            max_completion_tokens: config.train.max_completion_length,
        };
        Ok(Self::new(client, endpoint.model, sampling))
    }
}
