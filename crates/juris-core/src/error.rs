//! Caller-facing error type for the answer pipeline.

use std::fmt;
use std::time::Duration;

use juris_llm::LlmError;
use juris_memory::VectorStoreError;

/// Failure classes surfaced to callers of [`crate::session::LegalAssistant::ask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryErrorKind {
    /// Caller error: empty question, malformed session id, `k == 0`.
    InvalidInput,
    /// Network failure, 5xx, timeout or empty upstream response.
    ServiceUnavailable,
    RateLimited,
    /// Unknown namespace, wrong embedding dimension, missing embedding model,
    /// rejected credentials or an unknown model name.
    Misconfigured,
    /// The generative service refused to answer this query.
    ContentFiltered,
    Cancelled,
}

impl QueryErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::ServiceUnavailable => "service_unavailable",
            Self::RateLimited => "rate_limited",
            Self::Misconfigured => "misconfigured",
            Self::ContentFiltered => "content_filtered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
    /// Upstream hint for how long to wait before retrying.
    pub retry_after: Option<Duration>,
}

impl QueryError {
    #[must_use]
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::InvalidInput, message)
    }

    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::ServiceUnavailable, message)
    }

    #[must_use]
    pub fn misconfigured(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Misconfigured, message)
    }

    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(QueryErrorKind::Cancelled, "query cancelled by caller")
    }
}

impl From<LlmError> for QueryError {
    fn from(err: LlmError) -> Self {
        let kind = match &err {
            LlmError::RateLimited { .. } => QueryErrorKind::RateLimited,
            LlmError::ContentFiltered { .. } => QueryErrorKind::ContentFiltered,
            LlmError::InvalidRequest { .. } => QueryErrorKind::InvalidInput,
            LlmError::Unauthorized { .. }
            | LlmError::ModelNotFound { .. }
            | LlmError::EmbedUnsupported { .. } => QueryErrorKind::Misconfigured,
            LlmError::Other(_) => QueryErrorKind::ServiceUnavailable,
            e if e.is_transient() => QueryErrorKind::ServiceUnavailable,
            // Non-transient transport failures (bad URL, TLS setup) are configuration faults.
            _ => QueryErrorKind::Misconfigured,
        };
        Self::new(kind, err.to_string()).with_retry_after(err.retry_after())
    }
}

impl From<VectorStoreError> for QueryError {
    fn from(err: VectorStoreError) -> Self {
        match err {
            VectorStoreError::CollectionNotFound(ref namespace) => Self::misconfigured(format!(
                "namespace {namespace:?} does not exist in the vector store; check vector_store.namespace"
            )),
            other => Self::unavailable(other.to_string()),
        }
    }
}
