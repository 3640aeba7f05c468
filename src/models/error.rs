//! Error types for hintcal.
//!
//! Taxonomy:
//! - Expected failures: bad config, bad input records, missing sample fields
//! - Infrastructure failures: network, timeout, endpoint errors
//! - Invariant violations: internal bugs
//!
//! A downstream reply that cannot be parsed is not an error; it is a
//! scored outcome (see `scoring::parser`).

use thiserror::Error;

/// Top-level error type for hintcal.
#[derive(Debug, Error)]
pub enum HintcalError {
    // ═══════════════════════════════════════════════════════════════════
    // Expected failures
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing required sample field: {0}")]
    MissingField(&'static str),

    #[error("Parse error: {0}")]
    ParseError(String),

    // ═══════════════════════════════════════════════════════════════════
    // Infrastructure failures
    // ═══════════════════════════════════════════════════════════════════

    #[error("Endpoint error: {0}")]
    Api(#[from] ApiError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Trainer failed: {0}")]
    Trainer(String),

    // ═══════════════════════════════════════════════════════════════════
    // Invariant violations
    // ═══════════════════════════════════════════════════════════════════

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors reported by an OpenAI-compatible endpoint.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("No models served at {0}")]
    NoModelsAvailable(String),

    #[error("API error (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl HintcalError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited { .. } | Self::Network(_) => true,
            Self::Api(ApiError::Status { status, .. }) => *status >= 500,
            _ => false,
        }
    }

    /// Get retry delay hint in seconds, if applicable.
    pub fn retry_after(&self) -> Option<f64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Result type alias for hintcal.
pub type Result<T> = std::result::Result<T, HintcalError>;
