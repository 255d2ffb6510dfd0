#[cfg(feature = "mock")]
use crate::mock::MockProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;

use crate::provider::{LlmProvider, Message};

/// Generates a match over all `AnyProvider` variants, binding the inner provider
/// and evaluating the given closure for each arm.
macro_rules! delegate_provider {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyProvider::OpenAi($p) => $expr,
            AnyProvider::Ollama($p) => $expr,
            #[cfg(feature = "mock")]
            AnyProvider::Mock($p) => $expr,
        }
    };
}

#[derive(Debug, Clone)]
pub enum AnyProvider {
    OpenAi(OpenAiProvider),
    Ollama(OllamaProvider),
    #[cfg(feature = "mock")]
    Mock(MockProvider),
}

impl LlmProvider for AnyProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, crate::LlmError> {
        delegate_provider!(self, |p| p.chat(messages).await)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, crate::LlmError> {
        delegate_provider!(self, |p| p.embed(text).await)
    }

    fn supports_embeddings(&self) -> bool {
        delegate_provider!(self, |p| p.supports_embeddings())
    }

    fn name(&self) -> &'static str {
        delegate_provider!(self, |p| p.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_openai_name_delegates() {
        let p = AnyProvider::OpenAi(
            OpenAiProvider::new(
                "k".into(),
                "https://api.groq.com/openai/v1".into(),
                "llama-3.3-70b-versatile".into(),
                None,
            )
            .with_label("groq"),
        );
        assert_eq!(p.name(), "groq");
        assert!(!p.supports_embeddings());
    }

    #[test]
    fn any_ollama_supports_embeddings() {
        let p = AnyProvider::Ollama(OllamaProvider::new(
            "http://localhost:11434",
            "llama3".into(),
            "nomic-embed-text".into(),
        ));
        assert_eq!(p.name(), "ollama");
        assert!(p.supports_embeddings());
    }

    #[tokio::test]
    async fn any_openai_embed_unsupported_error() {
        let p = AnyProvider::OpenAi(OpenAiProvider::new(
            "k".into(),
            "http://127.0.0.1:1".into(),
            "m".into(),
            None,
        ));
        let err = p.embed("q").await.unwrap_err();
        assert!(matches!(err, crate::LlmError::EmbedUnsupported { .. }));
    }

    #[test]
    fn any_provider_debug_variants() {
        let p = AnyProvider::Ollama(OllamaProvider::new(
            "http://localhost:11434",
            "m".into(),
            "e".into(),
        ));
        assert!(format!("{p:?}").contains("Ollama"));
    }
}
