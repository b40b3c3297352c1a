//! Error types for language-model calls.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AiError {
    /// No API key configured.
    #[error("no API key configured (set OPENAI_API_KEY)")]
    MissingApiKey,

    /// Transport failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Service answered with a non-success status.
    #[error("language-model service returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Service answered without any content.
    #[error("language-model reply was empty")]
    EmptyResponse,

    /// Reply text did not contain the expected JSON shape.
    #[error("malformed language-model reply: {0}")]
    MalformedResponse(String),
}

impl AiError {
    /// Whether another attempt could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::MissingApiKey => false,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Network(_) | Self::EmptyResponse | Self::MalformedResponse(_) => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, AiError>;
