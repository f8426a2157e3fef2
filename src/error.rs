//! Crate-wide error type.
//!
//! Every fallible operation in the pipeline returns [`Result`]. Callers that
//! need to decide whether a failure is worth another attempt (the summary
//! retry loop, the proxy transport) use [`NewsfeedError::is_retryable`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NewsfeedError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid regex in `{field}` for site {site}: {message}")]
    InvalidPattern {
        site: String,
        field: &'static str,
        message: String,
    },

    #[error("Unknown pipeline step `{step}` for site {site}")]
    UnknownStep { site: String, step: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid date `{0}` (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("Missing API key: set {0}")]
    MissingApiKey(&'static str),

    #[error("Generative backend error: {0}")]
    Backend(String),

    #[error("Malformed summary: {0}")]
    MalformedSummary(String),

    #[error("No articles to summarize")]
    EmptyBatch,
}

impl NewsfeedError {
    /// Whether another attempt at the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            NewsfeedError::Http(e) => !e.is_builder(),
            NewsfeedError::Status { status, .. } => *status == 429 || *status >= 500,
            NewsfeedError::Backend(_)
            | NewsfeedError::MalformedSummary(_)
            | NewsfeedError::Serialization(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, NewsfeedError>;
