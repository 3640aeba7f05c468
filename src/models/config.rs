//! Configuration models for hintcal.
//!
//! Every tunable of a run lives here and is resolved from a TOML file.
//! Per-invocation switches (log location, entropy sampling) come from the
//! command line as [`RunArgs`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Top-level configuration for hintcal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Model identifiers
    pub model: ModelConfig,

    /// Downstream (answering) model endpoint and sampling
    #[serde(default)]
    pub downstream: DownstreamConfig,

    /// Served policy endpoint used during evaluation
    #[serde(default)]
    pub policy: PolicyEndpointConfig,

    /// Local server ports
    #[serde(default)]
    pub resources: ResourcesConfig,

    /// GRPO trainer settings
    #[serde(default)]
    pub train: TrainConfig,

    /// Dataset location and splits
    pub dataset: DatasetConfig,

    /// Evaluation settings
    #[serde(default)]
    pub eval: EvalConfig,

    /// API keys for closed-source downstream providers, keyed by provider
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

/// Model identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Policy model handed to the trainer (hub id or local path)
    pub policy: String,

    /// Downstream model name. When absent, the first model listed by the
    /// downstream endpoint is used.
    #[serde(default)]
    pub downstream: Option<String>,
}

/// Bounded retry settings for one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before the first retry; doubles per attempt
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Upper bound on any single wait
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_secs() -> u64 {
    60
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

/// Downstream model endpoint and fixed sampling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownstreamConfig {
    /// Base URL override. Defaults to the provider URL (closed-source) or
    /// `http://localhost:<downstream_port>/v1`.
    #[serde(default)]
    pub base_url: Option<String>,

    /// API key for a local/self-hosted endpoint (supports `${VAR}`)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key for a self-hosted endpoint
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Downstream is a closed-source provider model
    #[serde(default)]
    pub closed_source: bool,

    /// Sampling temperature
    #[serde(default = "default_downstream_temperature")]
    pub gen_temperature: f64,

    /// Nucleus sampling mass
    #[serde(default = "default_top_p")]
    pub top_p: f64,

    /// Completion token cap
    #[serde(default = "default_max_completion_tokens")]
    pub max_completion_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_downstream_temperature() -> f64 {
    0.7
}

fn default_top_p() -> f64 {
    1.0
}

fn default_max_completion_tokens() -> u32 {
    1024
}

fn default_timeout() -> u64 {
    180
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            api_key_env: None,
            closed_source: false,
            gen_temperature: default_downstream_temperature(),
            top_p: default_top_p(),
            max_completion_tokens: default_max_completion_tokens(),
            timeout_secs: default_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

/// Endpoint serving the (resumed) policy model for evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyEndpointConfig {
    /// Base URL override. Defaults to `http://localhost:<action_port>/v1`.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Served model name; first listed model when absent
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub retry: RetryConfig,
}

/// Local server ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesConfig {
    #[serde(default = "default_downstream_port")]
    pub downstream_port: u16,

    #[serde(default = "default_action_port")]
    pub action_port: u16,
}

fn default_downstream_port() -> u16 {
    8000
}

fn default_action_port() -> u16 {
    8001
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            downstream_port: default_downstream_port(),
            action_port: default_action_port(),
        }
    }
}

/// GRPO trainer settings, forwarded to the external trainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_logging_steps")]
    pub logging_steps: u32,
    #[serde(default = "default_save_steps")]
    pub save_steps: u32,
    #[serde(default = "default_policy_temperature")]
    pub gen_temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default)]
    pub use_vllm: bool,
    #[serde(default = "default_true")]
    pub scale_rewards: bool,
    #[serde(default = "default_max_prompt_length")]
    pub max_prompt_length: u32,
    #[serde(default = "default_max_completion_length")]
    pub max_completion_length: u32,
    #[serde(default = "default_num_generations")]
    pub num_generations: u32,
    #[serde(default = "default_max_grad_norm")]
    pub max_grad_norm: f64,
    #[serde(default = "default_num_iterations")]
    pub num_iterations: u32,
    #[serde(default = "default_batch_size")]
    pub per_device_train_batch_size: u32,
    #[serde(default = "default_beta")]
    pub beta: f64,
    /// Checkpoints kept on disk
    #[serde(default = "default_save_total_limit")]
    pub save_total_limit: u32,
}

fn default_learning_rate() -> f64 {
    1e-6
}
fn default_logging_steps() -> u32 {
    10
}
fn default_save_steps() -> u32 {
    250
}
fn default_policy_temperature() -> f64 {
    0.9
}
fn default_top_k() -> u32 {
    50
}
fn default_true() -> bool {
    true
}
fn default_max_prompt_length() -> u32 {
    512
}
fn default_max_completion_length() -> u32 {
    256
}
fn default_num_generations() -> u32 {
    8
}
fn default_max_grad_norm() -> f64 {
    1.0
}
fn default_num_iterations() -> u32 {
    1
}
fn default_batch_size() -> u32 {
    8
}
fn default_beta() -> f64 {
    0.04
}
fn default_save_total_limit() -> u32 {
    3
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            logging_steps: default_logging_steps(),
            save_steps: default_save_steps(),
            gen_temperature: default_policy_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            use_vllm: false,
            scale_rewards: true,
            max_prompt_length: default_max_prompt_length(),
            max_completion_length: default_max_completion_length(),
            num_generations: default_num_generations(),
            max_grad_norm: default_max_grad_norm(),
            num_iterations: default_num_iterations(),
            per_device_train_batch_size: default_batch_size(),
            beta: default_beta(),
            save_total_limit: default_save_total_limit(),
        }
    }
}

/// Dataset location and split names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Dataset name, selects the downstream prompt template
    pub name: String,

    /// Directory holding `<split>.jsonl` files
    pub path: PathBuf,

    /// Split names: training first, evaluation second
    #[serde(default = "default_split_names")]
    pub split_names: Vec<String>,
}

fn default_split_names() -> Vec<String> {
    vec!["train".to_string(), "test".to_string()]
}

impl DatasetConfig {
    /// Split used for training.
    pub fn train_split(&self) -> &str {
        &self.split_names[0]
    }

    /// Split used for evaluation.
    pub fn eval_split(&self) -> &str {
        &self.split_names[1]
    }
}

/// Evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Monte Carlo rounds per sample for entropy estimation
    #[serde(default = "default_mc_samples")]
    pub mc_samples: usize,

    /// Equal-width confidence bins for ECE
    #[serde(default = "default_ece_bins")]
    pub ece_bins: usize,
}

fn default_mc_samples() -> usize {
    40
}

fn default_ece_bins() -> usize {
    10
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            mc_samples: default_mc_samples(),
            ece_bins: default_ece_bins(),
        }
    }
}

/// Per-invocation run arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunArgs {
    /// Root folder for all trials
    pub log_folder: PathBuf,

    /// Trial name; the run's log path is `<log_folder>/<trial_name>`
    pub trial_name: String,

    /// Estimate answer-distribution entropy by Monte Carlo sampling
    #[serde(default)]
    pub entropy: bool,

    /// Force the closed-source downstream path regardless of config
    #[serde(default)]
    pub closed_source: bool,
}

impl RunArgs {
    /// Log directory for this trial.
    pub fn log_path(&self) -> PathBuf {
        self.log_folder.join(&self.trial_name)
    }
}

/// A fully resolved endpoint: where to send requests and with what key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Explicit model name; `None` means "first listed model"
    pub model: Option<String>,
}

/// Closed-source providers with an OpenAI-compatible chat endpoint.
///
/// Matched by model-name prefix.
const CLOSED_SOURCE_PROVIDERS: &[(&str, &str, &str)] = &[
    ("gpt-", "openai", "https://api.openai.com/v1"),
    ("o1", "openai", "https://api.openai.com/v1"),
    ("o3", "openai", "https://api.openai.com/v1"),
    ("o4", "openai", "https://api.openai.com/v1"),
    ("claude-", "anthropic", "https://api.anthropic.com/v1"),
    (
        "gemini-",
        "google",
        "https://generativelanguage.googleapis.com/v1beta/openai",
    ),
    ("deepseek-", "deepseek", "https://api.deepseek.com/v1"),
];

/// Look up the provider and base URL for a closed-source model name.
pub fn closed_source_provider(model: &str) -> Option<(&'static str, &'static str)> {
    CLOSED_SOURCE_PROVIDERS
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))
        .map(|(_, provider, url)| (*provider, *url))
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_owned(),
                source,
            },
            other => other,
        })
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.dataset.split_names.len() < 2 {
            return invalid(format!(
                "dataset.split_names needs a training and an evaluation split, got {:?}",
                self.dataset.split_names
            ));
        }
        for (name, top_p) in [
            ("downstream.top_p", self.downstream.top_p),
            ("train.top_p", self.train.top_p),
        ] {
            if top_p.is_nan() || top_p <= 0.0 || top_p > 1.0 {
                return invalid(format!("{name} must be in (0, 1], got {top_p}"));
            }
        }
        for (name, temperature) in [
            ("downstream.gen_temperature", self.downstream.gen_temperature),
            ("train.gen_temperature", self.train.gen_temperature),
        ] {
            if temperature.is_nan() || temperature < 0.0 {
                return invalid(format!("{name} must be >= 0, got {temperature}"));
            }
        }
        if self.eval.mc_samples == 0 {
            return invalid("eval.mc_samples must be at least 1".to_string());
        }
        if self.eval.ece_bins == 0 {
            return invalid("eval.ece_bins must be at least 1".to_string());
        }
        Ok(())
    }

    /// Resolve the downstream endpoint.
    ///
    /// Closed-source models go to their provider with a provider key; anything
    /// else is a local server with the placeholder key `EMPTY`.
    pub fn downstream_endpoint(&self, closed_source: bool) -> Result<ResolvedEndpoint, ConfigError> {
        if closed_source || self.downstream.closed_source {
            let model = self
                .model
                .downstream
                .clone()
                .ok_or(ConfigError::MissingDownstreamModel)?;
            let (provider, provider_url) = closed_source_provider(&model)
                .ok_or_else(|| ConfigError::UnsupportedModel(model.clone()))?;
            let api_key = self.resolve_provider_key(provider)?;

            return Ok(ResolvedEndpoint {
                base_url: self
                    .downstream
                    .base_url
                    .clone()
                    .unwrap_or_else(|| provider_url.to_string()),
                api_key: Some(api_key),
                model: Some(model),
            });
        }

        let api_key = match (&self.downstream.api_key, &self.downstream.api_key_env) {
            (Some(key), _) => expand_env_vars(key),
            (None, Some(env_var)) => {
                std::env::var(env_var).map_err(|_| ConfigError::MissingApiKey {
                    endpoint: "downstream".to_string(),
                    env_var: env_var.clone(),
                })?
            }
            (None, None) => "EMPTY".to_string(),
        };

        Ok(ResolvedEndpoint {
            base_url: self.downstream.base_url.clone().unwrap_or_else(|| {
                format!("http://localhost:{}/v1", self.resources.downstream_port)
            }),
            api_key: Some(api_key),
            model: self.model.downstream.clone(),
        })
    }

    /// Resolve the served-policy endpoint used during evaluation.
    pub fn policy_endpoint(&self) -> ResolvedEndpoint {
        ResolvedEndpoint {
            base_url: self
                .policy
                .base_url
                .clone()
                .unwrap_or_else(|| format!("http://localhost:{}/v1", self.resources.action_port)),
            api_key: Some(
                self.policy
                    .api_key
                    .as_deref()
                    .map(expand_env_vars)
                    .unwrap_or_else(|| "EMPTY".to_string()),
            ),
            model: self.policy.model.clone(),
        }
    }

    /// Copy with every API key replaced, for writing to disk.
    pub fn redacted(&self) -> Self {
        const REDACTED: &str = "<redacted>";
        let mut config = self.clone();
        for key in config.api_keys.values_mut() {
            *key = REDACTED.to_string();
        }
        for key in [&mut config.downstream.api_key, &mut config.policy.api_key] {
            if key.is_some() {
                *key = Some(REDACTED.to_string());
            }
        }
        config
    }

    /// Provider key from `[api_keys]`, falling back to `<PROVIDER>_API_KEY`.
    fn resolve_provider_key(&self, provider: &str) -> Result<String, ConfigError> {
        if let Some(key) = self.api_keys.get(provider) {
            return Ok(expand_env_vars(key));
        }

        let env_var = format!("{}_API_KEY", provider.to_uppercase());
        std::env::var(&env_var).map_err(|_| ConfigError::MissingApiKey {
            endpoint: provider.to_string(),
            env_var,
        })
    }
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("static pattern is valid"))
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();

    for cap in env_var_pattern().captures_iter(s) {
        if let Ok(value) = std::env::var(&cap[1]) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(
        "Missing API key for endpoint '{endpoint}': set {env_var} env var or add it to the config"
    )]
    MissingApiKey { endpoint: String, env_var: String },

    #[error("Closed-source downstream requires model.downstream to be set")]
    MissingDownstreamModel,

    #[error("Unsupported closed-source downstream model: '{0}'")]
    UnsupportedModel(String),
}
