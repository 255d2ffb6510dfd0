//! Nearest-passage lookup against a namespaced vector store.

use std::cmp::Ordering;
use std::sync::Arc;

use juris_memory::{SearchQuery, VectorStore};

use crate::error::QueryError;
use crate::passage::Passage;

/// Ranked passage search over one corpus namespace.
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    /// Minimum score to accept. `None` passes through whatever the store returns.
    score_threshold: Option<f32>,
}

impl Retriever {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, score_threshold: Option<f32>) -> Self {
        Self {
            store,
            score_threshold,
        }
    }

    /// Top `k` passages for `query_vector`, best first; equal scores order by `section_id`.
    ///
    /// An empty result is a normal outcome.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when `k == 0`, `Misconfigured` when `namespace` does not
    /// exist, `ServiceUnavailable` for store failures.
    pub async fn retrieve(
        &self,
        query_vector: &[f32],
        k: usize,
        namespace: &str,
    ) -> Result<Vec<Passage>, QueryError> {
        if k == 0 {
            return Err(QueryError::invalid_input("k must be at least 1"));
        }
        if !self.store.collection_exists(namespace).await? {
            return Err(juris_memory::VectorStoreError::CollectionNotFound(namespace.to_owned()).into());
        }

        let query = SearchQuery::new(query_vector.to_vec(), k as u64)
            .with_score_threshold(self.score_threshold);
        let hits = self.store.search(namespace, query).await?;
        let fetched = hits.len();

        let mut passages: Vec<Passage> = hits
            .into_iter()
            .filter_map(Passage::from_scored_point)
            .filter(|p| self.score_threshold.is_none_or(|floor| p.score >= floor))
            .collect();
        sort_passages(&mut passages);
        passages.truncate(k);

        tracing::debug!(namespace, fetched, kept = passages.len(), "retrieved passages");
        Ok(passages)
    }
}

/// Descending score, then ascending `section_id`.
pub(crate) fn sort_passages(passages: &mut [Passage]) {
    passages.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.section_id.cmp(&b.section_id))
    });
}
