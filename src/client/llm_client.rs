//! Chat client for OpenAI-compatible endpoints.
//!
//! Covers hosted providers and self-hosted inference servers alike:
//! - `GET  {base_url}/models` to discover the served model
//! - `POST {base_url}/chat/completions` for a single-sample completion
//!
//! Every request goes through the endpoint's [`RetryPolicy`].

use crate::client::RetryPolicy;
use crate::models::{ApiError, HintcalError, Message, ResolvedEndpoint, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Fixed sampling parameters for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f64,
    pub top_p: f64,
    pub max_completion_tokens: u32,
}

/// Chat completion request payload.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub top_p: f64,
    pub max_completion_tokens: u32,
    pub n: u32,
}

impl ChatCompletionRequest {
    /// Single-sample request with the given sampling parameters.
    pub fn new(model: impl Into<String>, messages: Vec<Message>, sampling: SamplingParams) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            max_completion_tokens: sampling.max_completion_tokens,
            n: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// API error response (OpenAI-compatible).
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// HTTP client bound to one OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    /// Name of this endpoint (for logging)
    name: String,
    api_key: Option<String>,
    base_url: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ChatClient {
    /// Create a client for `endpoint`.
    pub fn new(
        name: impl Into<String>,
        endpoint: &ResolvedEndpoint,
        timeout_secs: u64,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(HintcalError::Network)?;

        Ok(Self {
            client,
            name: name.into(),
            api_key: endpoint.api_key.clone(),
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            timeout,
            retry,
        })
    }

    /// Get the endpoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        if let Some(ref api_key) = self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
                HintcalError::InvalidInput(format!(
                    "API key for '{}' is not a valid header value",
                    self.name
                ))
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn map_send_error(&self, e: reqwest::Error) -> HintcalError {
        if e.is_timeout() {
            HintcalError::Timeout(self.timeout)
        } else {
            HintcalError::Network(e)
        }
    }

    /// Turn a non-success response into the matching error.
    async fn error_for_status(&self, response: reqwest::Response, model: &str) -> HintcalError {
        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(1.0);
            return HintcalError::RateLimited { retry_after_secs };
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);

        let error = match status {
            401 => ApiError::AuthenticationFailed,
            404 => ApiError::ModelNotFound(model.to_string()),
            _ => ApiError::Status { status, message },
        };
        HintcalError::Api(error)
    }

    /// List the models served by this endpoint, in server order.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/models", self.base_url);

        self.retry
            .run("list_models", || async {
                let response = self
                    .client
                    .get(&url)
                    .headers(self.headers()?)
                    .send()
                    .await
                    .map_err(|e| self.map_send_error(e))?;

                if !response.status().is_success() {
                    return Err(self.error_for_status(response, "<list>").await);
                }

                let body: ModelList = response.json().await.map_err(|e| {
                    HintcalError::Api(ApiError::InvalidResponse(format!(
                        "model list from {}: {e}",
                        self.name
                    )))
                })?;
                Ok(body.data.into_iter().map(|m| m.id).collect())
            })
            .await
    }

    /// Send one chat request and return the first choice's text.
    ///
    /// A choice with no text content (e.g. a refusal) yields an empty string.
    pub async fn complete(&self, request: &ChatCompletionRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        self.retry
            .run("chat_completion", || async {
                let response = self
                    .client
                    .post(&url)
                    .headers(self.headers()?)
                    .json(request)
                    .send()
                    .await
                    .map_err(|e| self.map_send_error(e))?;

                if !response.status().is_success() {
                    return Err(self.error_for_status(response, &request.model).await);
                }

                let body: ChatCompletionResponse = response.json().await.map_err(|e| {
                    HintcalError::Api(ApiError::InvalidResponse(format!(
                        "chat completion from {}: {e}",
                        self.name
                    )))
                })?;

                let choice = body.choices.into_iter().next().ok_or_else(|| {
                    HintcalError::Api(ApiError::InvalidResponse(
                        "no choices in response".to_string(),
                    ))
                })?;

                let content = choice.message.content.unwrap_or_default();
                debug!(
                    endpoint = %self.name,
                    model = %request.model,
                    chars = content.len(),
                    "Chat completion received"
                );
                Ok(content)
            })
            .await
    }
}
