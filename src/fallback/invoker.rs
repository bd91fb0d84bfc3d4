//! The seam between the fallback protocol and the inference transport.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::types::EndpointConfig;
use crate::error::FailureKind;

/// Why one attempt against one endpoint failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct AttemptError {
    pub kind: FailureKind,
    pub message: String,
}

impl AttemptError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimit, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Network, message)
    }

    /// Classify an HTTP status returned by an endpoint.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            429 => FailureKind::RateLimit,
            408 | 504 => FailureKind::Timeout,
            500 | 502 | 503 => FailureKind::ServiceUnavailable,
            401 | 403 => FailureKind::Authentication,
            400 | 404 | 413 | 422 => FailureKind::InvalidRequest,
            _ => FailureKind::Other,
        };
        Self::new(kind, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Sends one request to one endpoint.
///
/// Implemented by the caller on top of whatever client talks to the model.
/// The fallback protocol calls it once per endpoint, in list order, and never
/// concurrently for the same request.
#[async_trait]
pub trait EndpointInvoker: Send + Sync {
    async fn invoke(
        &self,
        config: &EndpointConfig,
        request: &Value,
    ) -> std::result::Result<Value, AttemptError>;
}
