//! Language-model assisted column matching.
//!
//! [`AiMatcher`] batches unresolved columns into one request per sheet,
//! validates every proposal against the target schema and degrades to
//! unresolved columns when the service keeps failing.

mod client;
mod config;
mod error;
mod matcher;
pub mod prompt;
pub mod response;

pub use client::{CompletionRequest, LanguageModel, OpenAiClient};
pub use config::{API_KEY_ENV, AiConfig, BASE_URL_ENV, MODEL_ENV, RetryPolicy};
pub use error::{AiError, Result};
pub use matcher::{AiMatcher, AiResolution, ExhaustedRetries};
pub use prompt::KnownHeaders;
pub use response::{AiProposal, extract_first_json};
