use std::str::FromStr;

use super::{Config, ProviderKind, VectorBackend};

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("ignoring invalid {key} value: {raw}");
            None
        }
    }
}

fn parse_provider(key: &str) -> Option<ProviderKind> {
    let raw = std::env::var(key).ok()?;
    if let Ok(kind) = serde_json::from_value(serde_json::Value::String(raw.to_lowercase())) {
        Some(kind)
    } else {
        tracing::warn!("ignoring invalid {key} value: {raw}");
        None
    }
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_models();
        self.apply_env_overrides_pipeline();
    }

    fn apply_env_overrides_models(&mut self) {
        if let Some(kind) = parse_provider("JURIS_LLM_PROVIDER") {
            self.llm.provider = kind;
        }
        if let Ok(v) = std::env::var("JURIS_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("JURIS_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(n) = parse_env::<u32>("JURIS_LLM_MAX_TOKENS") {
            self.llm.max_tokens = n;
        }
        if let Some(t) = parse_env::<f32>("JURIS_LLM_TEMPERATURE") {
            self.llm.temperature = t;
        }
        if let Some(p) = parse_env::<f32>("JURIS_LLM_TOP_P") {
            self.llm.top_p = p;
        }
        if let Some(kind) = parse_provider("JURIS_EMBEDDING_PROVIDER") {
            self.embedding.provider = kind;
        }
        if let Ok(v) = std::env::var("JURIS_EMBEDDING_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Ok(v) = std::env::var("JURIS_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(d) = parse_env::<usize>("JURIS_EMBEDDING_DIMENSION") {
            self.embedding.dimension = Some(d);
        }
    }

    fn apply_env_overrides_pipeline(&mut self) {
        if let Ok(v) = std::env::var("JURIS_VECTOR_BACKEND") {
            match v.to_lowercase().as_str() {
                "qdrant" => self.vector_store.backend = VectorBackend::Qdrant,
                "memory" => self.vector_store.backend = VectorBackend::Memory,
                _ => tracing::warn!("ignoring invalid JURIS_VECTOR_BACKEND value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("JURIS_QDRANT_URL") {
            self.vector_store.url = v;
        }
        if let Ok(v) = std::env::var("JURIS_NAMESPACE") {
            self.vector_store.namespace = v;
        }
        if let Some(k) = parse_env::<usize>("JURIS_RETRIEVAL_TOP_K") {
            self.retrieval.top_k = k;
        }
        if let Some(t) = parse_env::<f32>("JURIS_RETRIEVAL_SCORE_THRESHOLD") {
            self.retrieval.score_threshold = Some(t);
        }
        if let Some(h) = parse_env::<usize>("JURIS_RETRIEVAL_HISTORY_TURNS") {
            self.retrieval.history_turns = h;
        }
        if let Some(b) = parse_env::<usize>("JURIS_CONTEXT_BUDGET_CHARS") {
            self.context.budget_chars = b;
        }
        if let Some(c) = parse_env::<usize>("JURIS_CONVERSATION_CAPACITY") {
            self.conversation.capacity = c;
        }
        if let Some(h) = parse_env::<usize>("JURIS_CONVERSATION_HISTORY_TURNS") {
            self.conversation.history_turns = h;
        }
        if let Some(n) = parse_env::<usize>("JURIS_MAX_SESSIONS") {
            self.conversation.max_sessions = n;
        }
        if let Some(s) = parse_env::<u64>("JURIS_SESSION_IDLE_TIMEOUT") {
            self.conversation.idle_timeout_seconds = s;
        }
        if let Some(n) = parse_env::<u32>("JURIS_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = n;
        }
        if let Some(s) = parse_env::<u64>("JURIS_TIMEOUT_EMBEDDING") {
            self.timeouts.embedding_seconds = s;
        }
        if let Some(s) = parse_env::<u64>("JURIS_TIMEOUT_SEARCH") {
            self.timeouts.search_seconds = s;
        }
        if let Some(s) = parse_env::<u64>("JURIS_TIMEOUT_LLM") {
            self.timeouts.llm_seconds = s;
        }
    }
}
