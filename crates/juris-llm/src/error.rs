use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    /// `retry_after` carries the server's `Retry-After` hint when one was sent.
    #[error("rate limited by {provider}")]
    RateLimited {
        provider: &'static str,
        retry_after: Option<Duration>,
    },

    #[error("{provider} unavailable: {detail}")]
    Unavailable {
        provider: &'static str,
        detail: String,
    },

    #[error("request rejected by {provider}: {detail}")]
    InvalidRequest {
        provider: &'static str,
        detail: String,
    },

    #[error("{provider} refused the credentials: {detail}")]
    Unauthorized {
        provider: &'static str,
        detail: String,
    },

    #[error("{provider} does not serve the requested model: {detail}")]
    ModelNotFound {
        provider: &'static str,
        detail: String,
    },

    #[error("response blocked by {provider} content filter")]
    ContentFiltered { provider: &'static str },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("embedding not supported by {provider}")]
    EmbedUnsupported { provider: &'static str },

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Whether the failure is expected to clear on its own (network, 5xx, 429).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            Self::Json(_)
            | Self::RateLimited { .. }
            | Self::Unavailable { .. }
            | Self::EmptyResponse { .. } => true,
            Self::InvalidRequest { .. }
            | Self::Unauthorized { .. }
            | Self::ModelNotFound { .. }
            | Self::ContentFiltered { .. }
            | Self::EmbedUnsupported { .. }
            | Self::Other(_) => false,
        }
    }

    /// Server-requested wait before the next attempt, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_unavailable_are_transient() {
        assert!(
            LlmError::RateLimited {
                provider: "openai",
                retry_after: None
            }
            .is_transient()
        );
        assert!(
            LlmError::Unavailable {
                provider: "openai",
                detail: "502".into()
            }
            .is_transient()
        );
        assert!(LlmError::EmptyResponse { provider: "groq" }.is_transient());
    }

    #[test]
    fn content_filter_and_rejections_are_fatal() {
        assert!(!LlmError::ContentFiltered { provider: "openai" }.is_transient());
        assert!(
            !LlmError::InvalidRequest {
                provider: "openai",
                detail: "bad input".into()
            }
            .is_transient()
        );
        assert!(
            !LlmError::Unauthorized {
                provider: "groq",
                detail: "status 401 Unauthorized".into()
            }
            .is_transient()
        );
        assert!(
            !LlmError::ModelNotFound {
                provider: "openai",
                detail: "status 404 Not Found".into()
            }
            .is_transient()
        );
        assert!(!LlmError::EmbedUnsupported { provider: "groq" }.is_transient());
    }

    #[test]
    fn retry_after_only_on_rate_limit() {
        let hinted = LlmError::RateLimited {
            provider: "groq",
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(hinted.retry_after(), Some(Duration::from_secs(2)));
        assert_eq!(LlmError::EmptyResponse { provider: "groq" }.retry_after(), None);
    }

    #[test]
    fn display_names_provider() {
        let err = LlmError::ContentFiltered { provider: "groq" };
        assert_eq!(err.to_string(), "response blocked by groq content filter");
    }
}
