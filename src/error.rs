// src/error.rs
//! Error taxonomy shared by the clustering, impact and query stages.

use thiserror::Error;

/// Failure reported by an embedding or NER provider.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// Provider is down or unreachable. Systemic; callers own retries.
    #[error("provider `{provider}` unavailable: {message}")]
    Unavailable { provider: String, message: String },

    #[error("provider `{provider}` timed out after {after_ms}ms")]
    Timeout { provider: String, after_ms: u64 },

    /// Provider refused this particular input (empty or unsupported text).
    #[error("provider `{provider}` rejected input: {reason}")]
    Rejected { provider: String, reason: String },
}

impl ProviderError {
    /// True when the failure is tied to the input rather than the provider.
    pub fn is_input_rejection(&self) -> bool {
        matches!(self, ProviderError::Rejected { .. })
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Rule tables or tuning are missing or malformed. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A single article or query was malformed.
    #[error("invalid input `{item}`: {reason}")]
    InvalidInput { item: String, reason: String },
}

impl CoreError {
    pub fn config(msg: impl Into<String>) -> Self {
        CoreError::Configuration(msg.into())
    }

    pub fn invalid(item: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidInput {
            item: item.into(),
            reason: reason.into(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
