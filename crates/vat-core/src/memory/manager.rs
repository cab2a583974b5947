//! ============================================================================
//! Memory Manager - Orchestrates memory storage and retrieval
//! ============================================================================
//! Context object constructed once and shared by reference. The embedding
//! client and vector store are built lazily behind a single-flight barrier,
//! together with the collection itself.
//!
//! record:   split -> (embed -> id -> upsert) per chunk, all concurrently
//! retrieve: embed query -> search -> entries, best first
//! recent:   bounded scroll -> newest first within that sample
//! ============================================================================

use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::chunker::ChunkSplitter;
use super::embeddings::{Embedder, GeminiEmbedder};
use super::ids::IdGenerator;
use super::local_store::LocalStore;
use super::store::{QdrantStore, VectorStore};
use crate::config::MemoryConfig;
use crate::types::{
    EmbeddingIntent, MemoryEntry, MemoryError, MemoryRecord, Metric, RecordOutcome, Result,
    StoreStats, COLLECTION_NAME, EMBEDDING_DIM,
};
use crate::visualize::{VisualizationPipeline, VisualizationReport};

pub const RECORD_STATUS: &str = "Memory recorded successfully!";
pub const DEFAULT_TOP_K: u64 = 5;
pub const DEFAULT_RECENT_LIMIT: u32 = 10;

/// Shared handles, built once
#[derive(Clone)]
pub(crate) struct Backends {
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
}

enum BackendSource {
    FromConfig,
    Provided(Backends),
}

/// Await `fut`, failing with `MemoryError::Timeout` after `after`
pub(crate) async fn with_deadline<T>(
    operation: &'static str,
    after: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| MemoryError::Timeout { operation, after })?
}

/// Memory manager combining store and embeddings
pub struct MemoryManager {
    config: MemoryConfig,
    splitter: ChunkSplitter,
    ids: IdGenerator,
    source: BackendSource,
    backends: OnceCell<Backends>,
}

impl MemoryManager {
    /// Create a manager that builds its embedder and store from `config`
    /// on first use
    pub fn new(config: MemoryConfig) -> Result<Self> {
        Self::build(config, BackendSource::FromConfig)
    }

    /// Create a manager over caller-provided boundaries. The collection is
    /// still ensured lazily on first use.
    pub fn with_backends(
        config: MemoryConfig,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        Self::build(
            config,
            BackendSource::Provided(Backends { embedder, store }),
        )
    }

    fn build(config: MemoryConfig, source: BackendSource) -> Result<Self> {
        config.validate()?;
        let splitter = ChunkSplitter::new(config.chunk_size, config.chunk_overlap)?;
        Ok(Self {
            config,
            splitter,
            ids: IdGenerator::new(),
            source,
            backends: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// One-time initialization. Concurrent first callers wait on the same
    /// attempt; a failed attempt is not cached.
    pub(crate) async fn backends(&self) -> Result<&Backends> {
        self.backends
            .get_or_try_init(|| async {
                info!("Starting memory initialization");
                let backends = match &self.source {
                    BackendSource::Provided(backends) => backends.clone(),
                    BackendSource::FromConfig => self.connect()?,
                };

                with_deadline(
                    "ensure collection",
                    self.config.store_timeout,
                    backends
                        .store
                        .ensure_collection(COLLECTION_NAME, EMBEDDING_DIM, Metric::Cosine),
                )
                .await?;

                info!(
                    "Memory initialization completed ({})",
                    backends.store.describe()
                );
                Ok::<_, MemoryError>(backends)
            })
            .await
            .inspect_err(|e| error!("Error initializing memory: {}", e))
    }

    fn connect(&self) -> Result<Backends> {
        let store: Arc<dyn VectorStore> = match &self.config.qdrant_url {
            Some(url) => Arc::new(QdrantStore::connect(url)?),
            None => Arc::new(LocalStore::open(&self.config.store_path)?),
        };
        let embedder: Arc<dyn Embedder> = Arc::new(GeminiEmbedder::from_config(&self.config));
        Ok(Backends { embedder, store })
    }

    /// Split, embed and store `content`. All chunks run concurrently; the
    /// first failure fails the call. Chunks stored before that failure stay
    /// stored.
    pub async fn record(
        &self,
        content: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Result<RecordOutcome> {
        self.record_inner(content, metadata.unwrap_or_default())
            .await
            .inspect_err(|e| error!("Error recording memory: {}", e))
    }

    async fn record_inner(
        &self,
        content: &str,
        metadata: Map<String, Value>,
    ) -> Result<RecordOutcome> {
        let backends = self.backends().await?;
        let chunks = self.splitter.split(content);
        let ids = self.ids.batch(chunks.len());
        debug!("Recording {} chunks", chunks.len());

        let mut tasks = JoinSet::new();
        for (index, (chunk, id)) in chunks.into_iter().zip(ids.iter().copied()).enumerate() {
            let backends = backends.clone();
            let metadata = metadata.clone();
            let embed_timeout = self.config.embed_timeout;
            let store_timeout = self.config.store_timeout;

            tasks.spawn(async move {
                let stored = async {
                    let vector = with_deadline(
                        "embedding",
                        embed_timeout,
                        backends.embedder.embed(&chunk, EmbeddingIntent::Document),
                    )
                    .await?;

                    let record = MemoryRecord {
                        id,
                        vector,
                        entry: MemoryEntry::now(chunk, metadata),
                    };
                    with_deadline(
                        "upsert",
                        store_timeout,
                        backends.store.upsert(COLLECTION_NAME, vec![record]),
                    )
                    .await
                }
                .await;

                match &stored {
                    Ok(()) => debug!("Stored chunk {} as point {}", index, id),
                    Err(e) => error!("Error processing chunk {}: {}", index, e),
                }
                stored
            });
        }

        // Dropping the set on early return aborts the chunks still running
        while let Some(joined) = tasks.join_next().await {
            joined.map_err(|e| MemoryError::Worker(format!("chunk task failed: {}", e)))??;
        }

        info!("Recorded memory in {} chunks", ids.len());
        Ok(RecordOutcome {
            status: RECORD_STATUS.to_string(),
            ids,
        })
    }

    /// Entries most similar to `query`, best first, at most `top_k`
    pub async fn retrieve(&self, query: &str, top_k: u64) -> Result<Vec<MemoryEntry>> {
        self.retrieve_inner(query, top_k)
            .await
            .inspect_err(|e| error!("Error retrieving memory: {}", e))
    }

    async fn retrieve_inner(&self, query: &str, top_k: u64) -> Result<Vec<MemoryEntry>> {
        let backends = self.backends().await?;
        debug!("Retrieving top {} for query", top_k);

        let query_vector = with_deadline(
            "embedding",
            self.config.embed_timeout,
            backends.embedder.embed(query, EmbeddingIntent::Query),
        )
        .await?;

        let hits = with_deadline(
            "search",
            self.config.store_timeout,
            backends.store.search(COLLECTION_NAME, query_vector, top_k),
        )
        .await?;

        Ok(hits.into_iter().map(|hit| hit.entry).collect())
    }

    /// Newest entries within a bounded, unordered sample of `limit` points.
    /// This is recency within the sample, not across the whole collection.
    pub async fn recent(&self, limit: u32) -> Result<Vec<MemoryEntry>> {
        self.recent_inner(limit)
            .await
            .inspect_err(|e| error!("Error getting recent memories: {}", e))
    }

    async fn recent_inner(&self, limit: u32) -> Result<Vec<MemoryEntry>> {
        let backends = self.backends().await?;

        let sample = with_deadline(
            "scroll",
            self.config.store_timeout,
            backends.store.scroll(COLLECTION_NAME, limit, false),
        )
        .await?;

        let mut entries: Vec<MemoryEntry> = sample.into_iter().map(|p| p.entry).collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit as usize);
        Ok(entries)
    }

    /// Render the stored embedding space to an interactive document
    pub async fn visualize(&self) -> Result<VisualizationReport> {
        let result = async {
            let backends = self.backends().await?;
            VisualizationPipeline::new(&self.config)
                .run(backends.store.as_ref())
                .await
        }
        .await;
        result.inspect_err(|e| error!("Error visualizing memories: {}", e))
    }

    /// Point count and engine description
    pub async fn stats(&self) -> Result<StoreStats> {
        let backends = self.backends().await?;
        let points_count = with_deadline(
            "count",
            self.config.store_timeout,
            backends.store.count(COLLECTION_NAME),
        )
        .await?;

        Ok(StoreStats {
            collection: COLLECTION_NAME.to_string(),
            points_count,
            store: backends.store.describe(),
        })
    }
}
