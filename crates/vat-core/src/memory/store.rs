//! ============================================================================
//! Memory Store - Vector database boundary
//! ============================================================================
//! `VectorStore` is the seam between the orchestrator and the engine.
//! `QdrantStore` talks to a remote Qdrant server; the local file-backed
//! engine lives in `local_store`.
//! ============================================================================

use async_trait::async_trait;
use qdrant_client::qdrant::{
    vector_output::Vector, CreateCollectionBuilder, Distance, PointStruct, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder, VectorsOutput,
};
use qdrant_client::{Payload, Qdrant};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::types::{MemoryEntry, MemoryError, MemoryRecord, Metric, Result, ScoredEntry, ScrolledPoint};

/// Collection lifecycle, point upsert, similarity search, bounded scroll
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if absent. Idempotent.
    async fn ensure_collection(&self, name: &str, dim: usize, metric: Metric) -> Result<()>;

    /// Write points; each point write is atomic
    async fn upsert(&self, name: &str, points: Vec<MemoryRecord>) -> Result<()>;

    /// Best match first, by cosine similarity
    async fn search(&self, name: &str, query: Vec<f32>, limit: u64) -> Result<Vec<ScoredEntry>>;

    /// Up to `limit` points in no particular order. Not a recency window.
    async fn scroll(&self, name: &str, limit: u32, with_vectors: bool)
        -> Result<Vec<ScrolledPoint>>;

    /// Number of stored points
    async fn count(&self, name: &str) -> Result<u64>;

    /// Human description of the engine, for logs and stats
    fn describe(&self) -> String;
}

/// Memory store backed by a Qdrant server
pub struct QdrantStore {
    client: Qdrant,
    url: String,
}

impl QdrantStore {
    /// Create a new store client. Does not touch the server yet.
    pub fn connect(url: &str) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| MemoryError::Store(format!("Failed to create Qdrant client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, name: &str, dim: usize, metric: Metric) -> Result<()> {
        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to check collection existence: {}", e)))?;

        if exists {
            debug!("Collection {} already exists", name);
            return Ok(());
        }

        info!("Creating collection: {}", name);
        let distance = match metric {
            Metric::Cosine => Distance::Cosine,
        };
        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dim as u64, distance)),
            )
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to create collection: {}", e)))?;

        info!("Collection {} created successfully", name);
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<MemoryRecord>) -> Result<()> {
        let points = points
            .into_iter()
            .map(|record| {
                let payload = entry_to_payload(&record.entry)?;
                Ok(PointStruct::new(record.id, record.vector, payload))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(name, points).wait(true))
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to upsert points: {}", e)))?;
        Ok(())
    }

    async fn search(&self, name: &str, query: Vec<f32>, limit: u64) -> Result<Vec<ScoredEntry>> {
        #[allow(deprecated)]
        let response = self
            .client
            .search_points(SearchPointsBuilder::new(name, query, limit).with_payload(true))
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to search memories: {}", e)))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| {
                let entry = payload_to_entry(point.payload)?;
                Some(ScoredEntry {
                    entry,
                    score: point.score,
                })
            })
            .collect())
    }

    async fn scroll(
        &self,
        name: &str,
        limit: u32,
        with_vectors: bool,
    ) -> Result<Vec<ScrolledPoint>> {
        let response = self
            .client
            .scroll(
                ScrollPointsBuilder::new(name)
                    .limit(limit)
                    .with_payload(true)
                    .with_vectors(with_vectors),
            )
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to scroll memories: {}", e)))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| {
                let vector = dense_vector(point.vectors);
                let entry = payload_to_entry(point.payload)?;
                Some(ScrolledPoint { vector, entry })
            })
            .collect())
    }

    async fn count(&self, name: &str) -> Result<u64> {
        let info = self
            .client
            .collection_info(name)
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to get collection info: {}", e)))?;

        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0))
    }

    fn describe(&self) -> String {
        format!("qdrant at {}", self.url)
    }
}

/// The default dense vector of a point, if it has one
fn dense_vector(vectors: Option<VectorsOutput>) -> Option<Vec<f32>> {
    match vectors?.get_vector()? {
        Vector::Dense(dense) => Some(dense.data),
        _ => None,
    }
}

fn entry_to_payload(entry: &MemoryEntry) -> Result<Payload> {
    let json = serde_json::to_value(entry)
        .map_err(|e| MemoryError::Store(format!("Failed to serialize payload: {}", e)))?;
    Payload::try_from(json)
        .map_err(|e| MemoryError::Store(format!("Failed to build payload: {}", e)))
}

/// Points without a readable payload are skipped with a warning
fn payload_to_entry(payload: HashMap<String, Value>) -> Option<MemoryEntry> {
    let json = serde_json::Value::Object(
        payload
            .into_iter()
            .map(|(key, value)| (key, serde_json::Value::from(value)))
            .collect(),
    );
    match serde_json::from_value(json) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!("Skipping point with unreadable payload: {}", e);
            None
        }
    }
}
