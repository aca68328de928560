//! Clients for the cloud services the platform depends on.
//!
//! Each service sits behind a trait so the API and worker can be driven by
//! fakes in tests. The Azure implementations answer
//! [`ClientError::NotConfigured`] when their endpoint or key is missing.

use std::time::Duration;

use reqwest::Client;
use thiserror::Error;

pub mod form_recognizer;
pub mod openai;
pub mod prompts;
pub mod text_analytics;

pub use form_recognizer::{AnalysisModel, AnalyzeResult, AzureFormRecognizer, DocumentAnalyzer};
pub use openai::{AzureOpenAi, ChatCompletion, ChatMessage};
pub use text_analytics::{AzureTextAnalytics, SentimentResult, SentimentScores, TextAnalytics};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("rate limited by upstream service")]
    RateLimited { retry_after: Option<u64> },

    #[error("operation did not finish after {attempts} polls")]
    Timeout { attempts: u32 },

    #[error("upstream returned an unusable response: {0}")]
    InvalidResponse(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

pub(crate) fn http_client(timeout: Duration) -> ClientResult<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

pub(crate) fn retry_after_header(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Strips ```json ... ``` or ``` ... ``` fences that chat models like to add.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
