//! Reward function handed to the policy trainer.
//!
//! Pipeline flow per batch element:
//! completion → calibrated query → downstream reply → parse → log score
//!
//! Elements are processed one at a time in input order and rewards are
//! returned positionally; the trainer aligns them to its completions.

use crate::models::{Result, RewardInput};
use crate::query::{DownstreamModel, build_query};
use crate::scoring::{ParsedReply, parse_reply, score_reply};
use async_trait::async_trait;
use tracing::debug;

/// Maps a batch of completions to one reward each, in order.
#[async_trait]
pub trait RewardFn: Send + Sync {
    async fn rewards(&self, batch: &[RewardInput]) -> Result<Vec<f64>>;
}

/// Log-score reward computed through a downstream model.
pub struct RewardFunction<'a, D: ?Sized> {
    downstream: &'a D,
    dataset_name: String,
}

impl<'a, D: DownstreamModel + ?Sized> RewardFunction<'a, D> {
    pub fn new(downstream: &'a D, dataset_name: impl Into<String>) -> Self {
        Self {
            downstream,
            dataset_name: dataset_name.into(),
        }
    }

    /// Query the downstream model with `input`'s completion as the hint.
    pub async fn query(&self, input: &RewardInput) -> Result<ParsedReply> {
        let message = build_query(
            &self.dataset_name,
            &input.question,
            &input.options,
            Some(input.completion.hint_text()),
        );
        let reply = self.downstream.send(message).await?;
        Ok(parse_reply(&reply))
    }
}

#[async_trait]
impl<D: DownstreamModel + ?Sized> RewardFn for RewardFunction<'_, D> {
    async fn rewards(&self, batch: &[RewardInput]) -> Result<Vec<f64>> {
        let mut rewards = Vec::with_capacity(batch.len());

        for (i, input) in batch.iter().enumerate() {
            let parsed = self.query(input).await?;
            let reward = score_reply(&parsed, input.gt_answer);
            debug!(
                index = i,
                answer = parsed.answer.as_i64(),
                confidence = parsed.confidence,
                gt_answer = input.gt_answer,
                reward,
                "Scored completion"
            );
            rewards.push(reward);
        }

        Ok(rewards)
    }
}
