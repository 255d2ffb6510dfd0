//! Question text to query vector, with a dimension check against the indexed corpus.

use juris_llm::LlmProvider;

use crate::error::QueryError;

/// Turns question text into a query vector through an embedding-capable provider.
pub struct Embedder<P> {
    provider: P,
    dimension: Option<usize>,
}

impl<P: LlmProvider> Embedder<P> {
    /// `dimension`, when set, is the vector length the indexed corpus was built with.
    #[must_use]
    pub fn new(provider: P, dimension: Option<usize>) -> Self {
        Self {
            provider,
            dimension,
        }
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// # Errors
    ///
    /// `InvalidInput` for blank text, `Misconfigured` when the provider cannot
    /// embed or returns a vector of the wrong length, and the mapped provider
    /// error otherwise.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, QueryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(QueryError::invalid_input("cannot embed empty text"));
        }
        if !self.provider.supports_embeddings() {
            return Err(QueryError::misconfigured(format!(
                "provider {} does not support embeddings",
                self.provider.name()
            )));
        }

        let vector = self.provider.embed(text).await?;
        match self.dimension {
            Some(expected) if vector.len() != expected => Err(QueryError::misconfigured(format!(
                "embedding has {} dimensions, expected {expected}; check embedding.model and embedding.dimension",
                vector.len()
            ))),
            _ if vector.is_empty() => Err(QueryError::unavailable(format!(
                "provider {} returned an empty embedding",
                self.provider.name()
            ))),
            _ => Ok(vector),
        }
    }
}

#[cfg(test)]
mod tests {
    use juris_llm::mock::{MockFailure, MockProvider};

    use super::*;
    use crate::error::QueryErrorKind;

    #[tokio::test]
    async fn blank_text_is_invalid_input_without_a_call() {
        let embedder = Embedder::new(MockProvider::default(), None);
        let err = embedder.embed("  \n\t").await.unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::InvalidInput);
        assert_eq!(embedder.provider().embed_calls(), 0);
    }

    #[tokio::test]
    async fn returns_provider_vector() {
        let embedder = Embedder::new(
            MockProvider::default().with_embedding(vec![0.1, 0.2, 0.3]),
            Some(3),
        );
        let v = embedder.embed("premarital agreement").await.unwrap();
        assert_eq!(v, vec![0.1, 0.2, 0.3]);
        assert_eq!(embedder.provider().embed_calls(), 1);
    }

    #[tokio::test]
    async fn wrong_dimension_is_misconfigured() {
        let embedder = Embedder::new(MockProvider::default().with_embedding(vec![0.0; 4]), Some(768));
        let err = embedder.embed("alimony").await.unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::Misconfigured);
        assert!(err.message.contains("768"));
    }

    #[tokio::test]
    async fn provider_without_embeddings_is_misconfigured() {
        let mut provider = MockProvider::default();
        provider.supports_embeddings = false;
        let err = Embedder::new(provider, None).embed("custody").await.unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::Misconfigured);
    }

    #[tokio::test]
    async fn rate_limit_maps_through() {
        let embedder = Embedder::new(
            MockProvider::default().with_embed_failures(vec![MockFailure::RateLimited]),
            None,
        );
        let err = embedder.embed("custody").await.unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::RateLimited);
    }
}
