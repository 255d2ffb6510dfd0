use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("vector store unreachable: {0}")]
    Connection(String),
    #[error("namespace {0} not found")]
    CollectionNotFound(String),
    #[error("search failed: {0}")]
    Search(String),
}

/// A stored passage vector. Only the in-memory store accepts writes.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, serde_json::Value>,
}

/// Nearest-neighbour request against one namespace.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub vector: Vec<f32>,
    pub limit: u64,
    /// Hits scoring below this are not returned.
    pub score_threshold: Option<f32>,
}

impl SearchQuery {
    #[must_use]
    pub fn new(vector: Vec<f32>, limit: u64) -> Self {
        Self {
            vector,
            limit,
            score_threshold: None,
        }
    }

    #[must_use]
    pub fn with_score_threshold(mut self, threshold: Option<f32>) -> Self {
        self.score_threshold = threshold;
        self
    }
}

/// One hit: point id, similarity (higher is closer) and scalar payload fields.
#[derive(Debug, Clone)]
pub struct ScoredVectorPoint {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, serde_json::Value>,
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Read side of a ranked-search service. A collection is one corpus namespace.
pub trait VectorStore: Send + Sync {
    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>>;

    /// Best matches first, at most `query.limit` of them.
    fn search(
        &self,
        collection: &str,
        query: SearchQuery,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>>;
}
