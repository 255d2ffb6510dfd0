//! Qdrant-backed statute search.

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{ScoredPoint, SearchPointsBuilder, value::Kind};

use crate::vector_store::{
    BoxFuture, ScoredVectorPoint, SearchQuery, VectorStore, VectorStoreError,
};

type QdrantResult<T> = Result<T, Box<qdrant_client::QdrantError>>;

/// Read-only handle on a Qdrant deployment holding the indexed statutes.
#[derive(Clone)]
pub struct QdrantOps {
    client: Qdrant,
}

impl std::fmt::Debug for QdrantOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantOps").finish_non_exhaustive()
    }
}

impl QdrantOps {
    /// Connect to the gRPC endpoint at `url`. No request is made until the first call.
    ///
    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be built from `url`.
    pub fn new(url: &str) -> QdrantResult<Self> {
        let client = Qdrant::from_url(url).build().map_err(Box::new)?;
        Ok(Self { client })
    }

    async fn search_points(
        &self,
        collection: &str,
        query: SearchQuery,
    ) -> QdrantResult<Vec<ScoredPoint>> {
        let mut builder =
            SearchPointsBuilder::new(collection, query.vector, query.limit).with_payload(true);
        if let Some(threshold) = query.score_threshold {
            builder = builder.score_threshold(threshold);
        }
        let response = self.client.search_points(builder).await.map_err(Box::new)?;
        Ok(response.result)
    }
}

impl VectorStore for QdrantOps {
    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.client
                .collection_exists(&collection)
                .await
                .map_err(|e| VectorStoreError::Connection(e.to_string()))
        })
    }

    fn search(
        &self,
        collection: &str,
        query: SearchQuery,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let points = self
                .search_points(&collection, query)
                .await
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            tracing::debug!(collection, hits = points.len(), "qdrant search");
            Ok(points.into_iter().map(into_scored).collect())
        })
    }
}

/// Keep scalar payload fields; nested lists and structs are not used by passages.
fn into_scored(point: ScoredPoint) -> ScoredVectorPoint {
    let payload: HashMap<String, serde_json::Value> = point
        .payload
        .into_iter()
        .filter_map(|(key, value)| {
            let json = match value.kind? {
                Kind::StringValue(s) => serde_json::Value::String(s),
                Kind::IntegerValue(i) => serde_json::Value::from(i),
                Kind::DoubleValue(d) => serde_json::Number::from_f64(d).map(serde_json::Value::Number)?,
                Kind::BoolValue(b) => serde_json::Value::Bool(b),
                _ => return None,
            };
            Some((key, json))
        })
        .collect();

    let id = match point.id.and_then(|pid| pid.point_id_options) {
        Some(PointIdOptions::Uuid(u)) => u,
        Some(PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    };

    ScoredVectorPoint {
        id,
        score: point.score,
        payload,
    }
}
