use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::vector_store::{
    BoxFuture, ScoredVectorPoint, SearchQuery, VectorPoint, VectorStore, VectorStoreError,
};

type Namespace = HashMap<String, VectorPoint>;

/// Brute-force cosine store for tests and offline runs.
#[derive(Default)]
pub struct InMemoryVectorStore {
    namespaces: RwLock<HashMap<String, Namespace>>,
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let namespaces = self
            .namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("InMemoryVectorStore")
            .field("namespaces", &namespaces)
            .finish()
    }
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `namespace` if missing.
    pub fn create_namespace(&self, namespace: &str) {
        self.namespaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(namespace.to_owned())
            .or_default();
    }

    /// Insert or replace points by id.
    ///
    /// # Errors
    ///
    /// Returns [`VectorStoreError::CollectionNotFound`] if `namespace` was never created.
    pub fn insert(
        &self,
        namespace: &str,
        points: impl IntoIterator<Item = VectorPoint>,
    ) -> Result<(), VectorStoreError> {
        let mut namespaces = self
            .namespaces
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let ns = namespaces
            .get_mut(namespace)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(namespace.to_owned()))?;
        for point in points {
            ns.insert(point.id.clone(), point);
        }
        Ok(())
    }

    #[must_use]
    pub fn point_count(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .map_or(0, HashMap::len)
    }

    fn rank(&self, namespace: &str, query: &SearchQuery) -> Result<Vec<ScoredVectorPoint>, VectorStoreError> {
        let namespaces = self
            .namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let ns = namespaces
            .get(namespace)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(namespace.to_owned()))?;

        let mut hits: Vec<ScoredVectorPoint> = ns
            .values()
            .map(|p| ScoredVectorPoint {
                id: p.id.clone(),
                score: cosine_similarity(&query.vector, &p.vector),
                payload: p.payload.clone(),
            })
            .filter(|hit| query.score_threshold.is_none_or(|floor| hit.score >= floor))
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(usize::try_from(query.limit).unwrap_or(usize::MAX));
        Ok(hits)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

impl VectorStore for InMemoryVectorStore {
    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let exists = self
            .namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(collection);
        Box::pin(async move { Ok(exists) })
    }

    fn search(
        &self,
        collection: &str,
        query: SearchQuery,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let result = self.rank(collection, &query);
        Box::pin(async move { result })
    }
}
