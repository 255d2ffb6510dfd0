//! Test-only mock provider with scripted failures and call accounting.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message};

/// A failure the mock should raise on its next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    RateLimited,
    /// Rate limited with a `Retry-After` hint in seconds.
    RateLimitedFor(u64),
    Unavailable,
    InvalidRequest,
    Unauthorized,
    ContentFiltered,
}

impl MockFailure {
    fn into_error(self) -> LlmError {
        match self {
            Self::RateLimited => LlmError::RateLimited {
                provider: "mock",
                retry_after: None,
            },
            Self::RateLimitedFor(secs) => LlmError::RateLimited {
                provider: "mock",
                retry_after: Some(Duration::from_secs(secs)),
            },
            Self::Unavailable => LlmError::Unavailable {
                provider: "mock",
                detail: "scripted outage".into(),
            },
            Self::InvalidRequest => LlmError::InvalidRequest {
                provider: "mock",
                detail: "scripted rejection".into(),
            },
            Self::Unauthorized => LlmError::Unauthorized {
                provider: "mock",
                detail: "scripted bad key".into(),
            },
            Self::ContentFiltered => LlmError::ContentFiltered { provider: "mock" },
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    chat_failures: Arc<Mutex<VecDeque<MockFailure>>>,
    embed_failures: Arc<Mutex<VecDeque<MockFailure>>>,
    chat_calls: Arc<AtomicUsize>,
    embed_calls: Arc<AtomicUsize>,
    captured: Arc<Mutex<Vec<Vec<Message>>>>,
    embedded: Arc<Mutex<Vec<String>>>,
    pub default_response: String,
    pub embedding: Vec<f32>,
    pub supports_embeddings: bool,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            chat_failures: Arc::new(Mutex::new(VecDeque::new())),
            embed_failures: Arc::new(Mutex::new(VecDeque::new())),
            chat_calls: Arc::new(AtomicUsize::new(0)),
            embed_calls: Arc::new(AtomicUsize::new(0)),
            captured: Arc::new(Mutex::new(Vec::new())),
            embedded: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            embedding: vec![0.0; 8],
            supports_embeddings: true,
            delay_ms: 0,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Queue failures returned by the next `chat` calls, in order.
    #[must_use]
    pub fn with_chat_failures(self, failures: impl IntoIterator<Item = MockFailure>) -> Self {
        self.chat_failures.lock().unwrap().extend(failures);
        self
    }

    /// Queue failures returned by the next `embed` calls, in order.
    #[must_use]
    pub fn with_embed_failures(self, failures: impl IntoIterator<Item = MockFailure>) -> Self {
        self.embed_failures.lock().unwrap().extend(failures);
        self
    }

    #[must_use]
    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Message lists passed to `chat`, oldest call first.
    #[must_use]
    pub fn captured(&self) -> Vec<Vec<Message>> {
        self.captured.lock().unwrap().clone()
    }

    /// Texts passed to `embed`, oldest call first.
    #[must_use]
    pub fn embedded(&self) -> Vec<String> {
        self.embedded.lock().unwrap().clone()
    }
}

impl LlmProvider for MockProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.captured.lock().unwrap().push(messages.to_vec());
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        let failure = self.chat_failures.lock().unwrap().pop_front();
        if let Some(failure) = failure {
            return Err(failure.into_error());
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        self.embedded.lock().unwrap().push(text.to_owned());
        if !self.supports_embeddings {
            return Err(LlmError::EmbedUnsupported { provider: "mock" });
        }
        let failure = self.embed_failures.lock().unwrap().pop_front();
        if let Some(failure) = failure {
            return Err(failure.into_error());
        }
        Ok(self.embedding.clone())
    }

    fn supports_embeddings(&self) -> bool {
        self.supports_embeddings
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
