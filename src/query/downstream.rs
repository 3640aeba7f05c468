//! The downstream model seam.
//!
//! The reward function and the evaluation loop only need "send one user
//! turn, get the reply text". The production implementation is a
//! [`ServedModel`] built from the `[downstream]` config; tests substitute
//! scripted models.

use crate::client::{ChatClient, RetryPolicy, SamplingParams, ServedModel};
use crate::models::{Config, Message, Result};
use async_trait::async_trait;
use tracing::{debug, info};

/// A fixed model that answers downstream queries.
#[async_trait]
pub trait DownstreamModel: Send + Sync {
    /// One single-turn chat request; returns the first choice's text.
    async fn send(&self, message: Message) -> Result<String>;
}

#[async_trait]
impl DownstreamModel for ServedModel {
    async fn send(&self, message: Message) -> Result<String> {
        let reply = self.complete(vec![message]).await?;
        debug!(chars = reply.len(), "Downstream reply");
        Ok(reply)
    }
}

#[async_trait]
impl<T: DownstreamModel + ?Sized> DownstreamModel for std::sync::Arc<T> {
    async fn send(&self, message: Message) -> Result<String> {
        (**self).send(message).await
    }
}

impl ServedModel {
    /// Downstream model described by `config`.
    ///
    /// `closed_source` forces the provider path even when the config does
    /// not set `downstream.closed_source`.
    pub fn downstream(config: &Config, closed_source: bool) -> Result<Self> {
        let endpoint = config.downstream_endpoint(closed_source)?;
        info!(
            base_url = %endpoint.base_url,
            model = endpoint.model.as_deref().unwrap_or("<first listed>"),
            "Configured downstream model"
        );

        let client = ChatClient::new(
            "downstream",
            &endpoint,
            config.downstream.timeout_secs,
            RetryPolicy::from(&config.downstream.retry),
        )?;
        let sampling = SamplingParams {
            temperature: config.downstream.gen_temperature,
            top_p: config.downstream.top_p,
            max_completion_tokens: config.downstream.max_completion_tokens,
        };
        Ok(Self::new(client, endpoint.model, sampling))
    }
}
