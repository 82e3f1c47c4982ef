// Qdrant-backed history index

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    Value, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};

use crate::history::{rank_references, HistoryIndex, HistoryRecord, VectorStoreError};
use crate::result::{AnalysisResult, HistoryReference};

pub const DEFAULT_COLLECTION: &str = "error_history";

pub struct QdrantHistoryIndex {
    client: Qdrant,
    collection: String,
}

impl QdrantHistoryIndex {
    /// Connect and make sure the collection exists
    pub async fn connect(url: &str, collection: impl Into<String>, dimensions: u64) -> Result<Self, VectorStoreError> {
        let collection = collection.into();
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;

        let exists = client
            .collection_exists(&collection)
            .await
            .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;
        if !exists {
            client
                .create_collection(
                    CreateCollectionBuilder::new(&collection)
                        .vectors_config(VectorParamsBuilder::new(dimensions, Distance::Cosine)),
                )
                .await
                .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;
            tracing::info!(collection = %collection, dimensions, "Created history collection");
        }

        Ok(Self { client, collection })
    }
}

fn get_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    payload.get(key).and_then(|v| v.as_str().map(|s| s.to_string()))
}

fn to_reference(payload: &HashMap<String, Value>, similarity: f32) -> Option<HistoryReference> {
    let result: AnalysisResult = serde_json::from_str(&get_string(payload, "result")?).ok()?;
    let created_at = get_string(payload, "created_at")
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))?;

    Some(HistoryReference {
        fingerprint: errlens_core::Fingerprint::new(get_string(payload, "fingerprint")?),
        similarity,
        error_message: result.error_message,
        explanation: result.explanation,
        severity: result.severity,
        created_at,
    })
}

#[async_trait]
impl HistoryIndex for QdrantHistoryIndex {
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<HistoryReference>, VectorStoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        // over-fetch so superseded records don't crowd out distinct fingerprints
        let search = SearchPointsBuilder::new(&self.collection, embedding.to_vec(), (k * 4) as u64)
            .with_payload(true);
        let response = self
            .client
            .search_points(search)
            .await
            .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;

        let candidates = response
            .result
            .iter()
            .filter_map(|point| to_reference(&point.payload, point.score))
            .collect();
        Ok(rank_references(candidates, k))
    }

    async fn write(&self, record: HistoryRecord) -> Result<(), VectorStoreError> {
        let mut payload = Payload::new();
        payload.insert("fingerprint", record.fingerprint.as_str().to_string());
        payload.insert("severity", record.result.severity.as_str().to_string());
        payload.insert("created_at", record.created_at.to_rfc3339());
        payload.insert("result", serde_json::to_string(&record.result)?);

        let point = PointStruct::new(uuid::Uuid::new_v4().to_string(), record.embedding, payload);

        // wait for the write to be applied so the next query sees it
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    fn backend(&self) -> &str {
        "qdrant"
    }
}
