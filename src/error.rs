//! Error types for llmconf.

use std::fmt;

use derive_builder::UninitializedFieldError;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving configurations, driving the fallback
/// protocol, or talking to a cache backend.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No environment variable or file yielded a config list.
    #[error("no config list found for source `{source_name}`")]
    ConfigNotFound {
        /// The source string passed to the resolver.
        source_name: String,
    },

    /// A config list was found but could not be turned into endpoint configs.
    #[error("malformed config list{}: {reason}", index_suffix(.index))]
    ConfigMalformed {
        /// Index of the offending record, `None` for document-level faults.
        index: Option<usize>,
        /// Human readable description of the fault.
        reason: String,
    },

    /// Every endpoint in the list failed with a retryable error.
    #[error("all {} endpoints failed{}", .causes.len(), causes_suffix(.causes))]
    AllEndpointsExhausted {
        /// Per-endpoint failures, in attempt order.
        causes: Vec<EndpointFailure>,
    },

    /// An endpoint failed with an error that must not be retried elsewhere.
    #[error("endpoint failed: {0}")]
    EndpointFailed(EndpointFailure),

    /// The cache backend could not serve the request.
    #[error("cache backend error: {0}")]
    CacheBackend(String),

    /// A stored cache entry could not be decoded or belongs to another key.
    #[error("corrupted cache entry {key}: {reason}")]
    CacheCorrupted {
        /// Key that was requested.
        key: String,
        /// What was wrong with the stored entry.
        reason: String,
    },

    /// Invalid builder or settings value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request to a remote cache failed.
    #[cfg(feature = "remote")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A `.env` file could not be read.
    #[error("dotenv error: {0}")]
    Dotenv(#[from] dotenv::Error),
}

impl Error {
    pub(crate) fn malformed(index: Option<usize>, reason: impl Into<String>) -> Self {
        Error::ConfigMalformed {
            index,
            reason: reason.into(),
        }
    }
}

impl From<UninitializedFieldError> for Error {
    fn from(err: UninitializedFieldError) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}

/// Classification of a single failed endpoint attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The endpoint throttled the request.
    RateLimit,
    /// The attempt did not complete in time.
    Timeout,
    /// Connection reset, DNS failure and the like.
    Network,
    /// The endpoint reported itself overloaded or down.
    ServiceUnavailable,
    /// Credentials were rejected.
    Authentication,
    /// The request itself is invalid for this endpoint.
    InvalidRequest,
    /// The response was blocked by a content filter.
    ContentFilter,
    /// Anything else.
    Other,
}

impl FailureKind {
    /// Whether the fallback protocol may move on to the next endpoint.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::RateLimit
                | FailureKind::Timeout
                | FailureKind::Network
                | FailureKind::ServiceUnavailable
        )
    }

    /// Short label used in logs and error messages.
    pub const fn as_str(&self) -> &'static str {
        match self {
            FailureKind::RateLimit => "rate limit",
            FailureKind::Timeout => "timeout",
            FailureKind::Network => "network",
            FailureKind::ServiceUnavailable => "service unavailable",
            FailureKind::Authentication => "authentication",
            FailureKind::InvalidRequest => "invalid request",
            FailureKind::ContentFilter => "content filter",
            FailureKind::Other => "other",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed attempt against one endpoint config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointFailure {
    /// Position of the config in the fallback list.
    pub index: usize,
    /// Model identifier of the config.
    pub model: String,
    /// Failure classification.
    pub kind: FailureKind,
    /// Message reported by the invoker.
    pub message: String,
}

impl fmt::Display for EndpointFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}: {}",
            self.index, self.model, self.kind, self.message
        )
    }
}

fn index_suffix(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" (record {i})"),
        None => String::new(),
    }
}

fn causes_suffix(causes: &[EndpointFailure]) -> String {
    causes.iter().map(|c| format!("; {c}")).collect()
}
