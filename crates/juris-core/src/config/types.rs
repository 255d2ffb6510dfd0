use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

/// Model backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    OpenAi,
    Groq,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::Groq => "groq",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generative model used by the answer synthesizer.
#[derive(Debug, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: ProviderKind,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

fn default_llm_provider() -> ProviderKind {
    ProviderKind::Groq
}

fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1".into()
}

fn default_llm_model() -> String {
    "deepseek-r1-distill-llama-70b".into()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.3
}

fn default_top_p() -> f32 {
    0.9
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
        }
    }
}

/// Embedding model used for query vectors. Must match the model the corpus was indexed with.
#[derive(Debug, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: ProviderKind,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Expected vector length; `None` accepts whatever the model returns.
    #[serde(default)]
    pub dimension: Option<usize>,
}

fn default_embedding_provider() -> ProviderKind {
    ProviderKind::OpenAi
}

fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
            dimension: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    Qdrant,
    Memory,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VectorStoreConfig {
    #[serde(default = "default_vector_backend")]
    pub backend: VectorBackend,
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_vector_backend() -> VectorBackend {
    VectorBackend::Qdrant
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

fn default_namespace() -> String {
    "legal-sections".into()
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_vector_backend(),
            url: default_qdrant_url(),
            namespace: default_namespace(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Hits scoring below this are dropped. `None` trusts the store's own floor.
    #[serde(default)]
    pub score_threshold: Option<f32>,
    /// Earlier questions prepended to the search text so follow-ups such as
    /// "what about the time limit?" retrieve the sections under discussion.
    #[serde(default = "default_retrieval_history_turns")]
    pub history_turns: usize,
}

fn default_top_k() -> usize {
    5
}

fn default_retrieval_history_turns() -> usize {
    1
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            score_threshold: None,
            history_turns: default_retrieval_history_turns(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ContextConfig {
    /// Maximum characters of statute text admitted into one prompt.
    #[serde(default = "default_budget_chars")]
    pub budget_chars: usize,
}

fn default_budget_chars() -> usize {
    12_000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            budget_chars: default_budget_chars(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ConversationConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Prior turns folded into each prompt.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    /// Live sessions kept at once; the least recently used idle one is dropped beyond this.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Sessions untouched for this long are dropped.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
}

fn default_capacity() -> usize {
    20
}

fn default_history_turns() -> usize {
    6
}

fn default_max_sessions() -> usize {
    1_000
}

fn default_idle_timeout() -> u64 {
    3_600
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            history_turns: default_history_turns(),
            max_sessions: default_max_sessions(),
            idle_timeout_seconds: default_idle_timeout(),
        }
    }
}

impl ConversationConfig {
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            ..RetryPolicy::default()
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_embedding_timeout")]
    pub embedding_seconds: u64,
    #[serde(default = "default_search_timeout")]
    pub search_seconds: u64,
    #[serde(default = "default_llm_timeout")]
    pub llm_seconds: u64,
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_search_timeout() -> u64 {
    30
}

fn default_llm_timeout() -> u64 {
    60
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            embedding_seconds: default_embedding_timeout(),
            search_seconds: default_search_timeout(),
            llm_seconds: default_llm_timeout(),
        }
    }
}

/// API keys, populated from the environment only and never serialized.
#[derive(Default)]
pub struct ResolvedSecrets {
    pub openai_api_key: Option<String>,
    pub groq_api_key: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("groq_api_key", &self.groq_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ResolvedSecrets {
    #[must_use]
    pub fn key_for(&self, provider: ProviderKind) -> Option<&str> {
        match provider {
            ProviderKind::OpenAi => self.openai_api_key.as_deref(),
            ProviderKind::Groq => self.groq_api_key.as_deref(),
            ProviderKind::Ollama => None,
        }
    }
}
