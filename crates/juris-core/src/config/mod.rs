mod env;
mod types;


pub use types::*;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist. API keys are read
    /// from the environment only.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.resolve_secrets();
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending key.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be at least 1");
        }
        if self.context.budget_chars == 0 {
            bail!("context.budget_chars must be greater than zero");
        }
        if self.conversation.capacity == 0 {
            bail!("conversation.capacity must be at least 1");
        }
        if self.conversation.history_turns == 0 {
            bail!("conversation.history_turns must be at least 1");
        }
        if self.conversation.max_sessions == 0 {
            bail!("conversation.max_sessions must be at least 1");
        }
        if self.conversation.idle_timeout_seconds == 0 {
            bail!("conversation.idle_timeout_seconds must be greater than zero");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            bail!(
                "retry.base_delay_ms ({}) must not exceed retry.max_delay_ms ({})",
                self.retry.base_delay_ms,
                self.retry.max_delay_ms
            );
        }
        for (key, seconds) in [
            ("timeouts.embedding_seconds", self.timeouts.embedding_seconds),
            ("timeouts.search_seconds", self.timeouts.search_seconds),
            ("timeouts.llm_seconds", self.timeouts.llm_seconds),
        ] {
            if seconds == 0 {
                bail!("{key} must be greater than zero");
            }
        }
        if self.vector_store.namespace.trim().is_empty() {
            bail!("vector_store.namespace must not be empty");
        }
        if self.embedding.dimension == Some(0) {
            bail!("embedding.dimension must be greater than zero when set");
        }
        if let Some(threshold) = self.retrieval.score_threshold
            && !threshold.is_finite()
        {
            bail!("retrieval.score_threshold must be a finite number");
        }
        Ok(())
    }

    fn resolve_secrets(&mut self) {
        self.secrets.openai_api_key = std::env::var("JURIS_OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        self.secrets.groq_api_key = std::env::var("JURIS_GROQ_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
    }
}

impl TimeoutConfig {
    #[must_use]
    pub fn embedding(&self) -> Duration {
        Duration::from_secs(self.embedding_seconds)
    }

    #[must_use]
    pub fn search(&self) -> Duration {
        Duration::from_secs(self.search_seconds)
    }

    #[must_use]
    pub fn llm(&self) -> Duration {
        Duration::from_secs(self.llm_seconds)
    }
}
