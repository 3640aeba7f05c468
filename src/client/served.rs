//! A model behind an OpenAI-compatible endpoint, with fixed sampling.

use crate::client::{ChatClient, ChatCompletionRequest, SamplingParams};
use crate::models::{ApiError, HintcalError, Message, Result};
use tokio::sync::OnceCell;
use tracing::info;

/// One served model: endpoint, model name and sampling parameters.
///
/// When no model name is configured, the first model listed by the
/// endpoint is used. The lookup happens on first use and is cached.
#[derive(Debug)]
pub struct ServedModel {
    client: ChatClient,
    configured_model: Option<String>,
    resolved_model: OnceCell<String>,
    sampling: SamplingParams,
}

impl ServedModel {
    pub fn new(client: ChatClient, model: Option<String>, sampling: SamplingParams) -> Self {
        Self {
            client,
            configured_model: model,
            resolved_model: OnceCell::new(),
            sampling,
        }
    }

    pub fn sampling(&self) -> SamplingParams {
        self.sampling
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    /// Model name requests are sent to.
    pub async fn model_name(&self) -> Result<&str> {
        let name = self
            .resolved_model
            .get_or_try_init(|| async {
                if let Some(model) = &self.configured_model {
                    return Ok(model.clone());
                }

                let listed = self.client.list_models().await?;
                let first = listed.into_iter().next().ok_or_else(|| {
                    HintcalError::Api(ApiError::NoModelsAvailable(
                        self.client.base_url().to_string(),
                    ))
                })?;
                info!(endpoint = %self.client.name(), model = %first, "Using first served model");
                Ok::<_, HintcalError>(first)
            })
            .await?;
        Ok(name.as_str())
    }

    /// One single-sample chat completion over `messages`.
    pub async fn complete(&self, messages: Vec<Message>) -> Result<String> {
        let model = self.model_name().await?;
        let request = ChatCompletionRequest::new(model, messages, self.sampling);
        self.client.complete(&request).await
    }
}
