//! ============================================================================
//! LocalStore - Embedded file-backed vector store (redb)
//! ============================================================================
//! Default engine when no Qdrant server is configured.
//! Path: <store_path>/vectors.redb
//! One table per collection keyed by point id; values are JSON documents
//! holding the vector and payload. Search is exact cosine over every point.
//! All database work runs on the blocking pool.
//! ============================================================================

use async_trait::async_trait;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition, TableError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::store::VectorStore;
use crate::types::{
    MemoryEntry, MemoryError, MemoryRecord, Metric, Result, ScoredEntry, ScrolledPoint,
};

const DB_FILE: &str = "vectors.redb";

// Collection name -> CollectionMeta (JSON)
const COLLECTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("__collections");

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionMeta {
    dim: usize,
    metric: Metric,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredPoint {
    vector: Vec<f32>,
    entry: MemoryEntry,
}

fn points_table(name: &str) -> TableDefinition<'_, u64, &'static [u8]> {
    TableDefinition::new(name)
}

fn store_err(context: &str, e: impl std::fmt::Display) -> MemoryError {
    MemoryError::Store(format!("{}: {}", context, e))
}

/// Embedded vector store
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl LocalStore {
    /// Open (or create) the database under `root`
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let path = root.join(DB_FILE);

        info!("Opening vector database at: {}", path.display());

        let db = Database::create(&path)
            .map_err(|e| store_err("Failed to open database", e))?;

        let write_txn = db
            .begin_write()
            .map_err(|e| store_err("Failed to begin write", e))?;
        {
            let _ = write_txn
                .open_table(COLLECTIONS)
                .map_err(|e| store_err("Failed to create collections table", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| store_err("Failed to commit init", e))?;

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the database on the blocking pool
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| MemoryError::Worker(format!("store task panicked: {}", e)))?
    }
}

fn collection_meta(db: &Database, name: &str) -> Result<Option<CollectionMeta>> {
    let read_txn = db.begin_read().map_err(|e| store_err("Failed to begin read", e))?;
    let table = read_txn
        .open_table(COLLECTIONS)
        .map_err(|e| store_err("Failed to open collections table", e))?;

    match table
        .get(name)
        .map_err(|e| store_err("Failed to read collection", e))?
    {
        Some(value) => {
            let meta = serde_json::from_slice(value.value()).map_err(|e| {
                MemoryError::Store(format!("Corrupt collection metadata: {}", e))
            })?;
            Ok(Some(meta))
        }
        None => Ok(None),
    }
}

fn require_collection(db: &Database, name: &str) -> Result<CollectionMeta> {
    collection_meta(db, name)?
        .ok_or_else(|| MemoryError::Store(format!("Collection not found: {}", name)))
}

/// Every point of a collection, in key order
fn read_points(db: &Database, name: &str, limit: Option<usize>) -> Result<Vec<StoredPoint>> {
    require_collection(db, name)?;

    let read_txn = db.begin_read().map_err(|e| store_err("Failed to begin read", e))?;
    let table = match read_txn.open_table(points_table(name)) {
        Ok(table) => table,
        Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
        Err(e) => return Err(store_err("Failed to open points table", e)),
    };

    let mut points = Vec::new();
    let iter = table
        .iter()
        .map_err(|e| store_err("Failed to iterate points", e))?;
    for entry in iter {
        if limit.is_some_and(|l| points.len() >= l) {
            break;
        }
        let (_key, value) = entry.map_err(|e| store_err("Failed to read point", e))?;
        let point: StoredPoint = serde_json::from_slice(value.value())
            .map_err(|e| MemoryError::Store(format!("Failed to deserialize point: {}", e)))?;
        points.push(point);
    }
    Ok(points)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for LocalStore {
    async fn ensure_collection(&self, name: &str, dim: usize, metric: Metric) -> Result<()> {
        let name = name.to_string();
        self.blocking(move |db| {
            if let Some(meta) = collection_meta(db, &name)? {
                if meta.dim != dim || meta.metric != metric {
                    return Err(MemoryError::Store(format!(
                        "Collection {} exists with dim {} / {:?}, wanted {} / {:?}",
                        name, meta.dim, meta.metric, dim, metric
                    )));
                }
                debug!("Collection {} already exists", name);
                return Ok(());
            }

            info!("Creating collection: {}", name);
            let meta = serde_json::to_vec(&CollectionMeta { dim, metric })
                .map_err(|e| MemoryError::Store(format!("Failed to encode metadata: {}", e)))?;

            let write_txn = db
                .begin_write()
                .map_err(|e| store_err("Failed to begin write", e))?;
            {
                let mut collections = write_txn
                    .open_table(COLLECTIONS)
                    .map_err(|e| store_err("Failed to open collections table", e))?;
                collections
                    .insert(name.as_str(), meta.as_slice())
                    .map_err(|e| store_err("Failed to insert collection", e))?;
                let _ = write_txn
                    .open_table(points_table(&name))
                    .map_err(|e| store_err("Failed to create points table", e))?;
            }
            write_txn
                .commit()
                .map_err(|e| store_err("Failed to commit", e))?;
            Ok(())
        })
        .await
    }

    async fn upsert(&self, name: &str, points: Vec<MemoryRecord>) -> Result<()> {
        let name = name.to_string();
        self.blocking(move |db| {
            let meta = require_collection(db, &name)?;

            let mut encoded = Vec::with_capacity(points.len());
            for record in points {
                if record.vector.len() != meta.dim {
                    return Err(MemoryError::Store(format!(
                        "Vector for point {} has {} dimensions, collection expects {}",
                        record.id,
                        record.vector.len(),
                        meta.dim
                    )));
                }
                let value = serde_json::to_vec(&StoredPoint {
                    vector: record.vector,
                    entry: record.entry,
                })
                .map_err(|e| MemoryError::Store(format!("Failed to serialize point: {}", e)))?;
                encoded.push((record.id, value));
            }

            let write_txn = db
                .begin_write()
                .map_err(|e| store_err("Failed to begin write", e))?;
            {
                let mut table = write_txn
                    .open_table(points_table(&name))
                    .map_err(|e| store_err("Failed to open points table", e))?;
                for (id, value) in &encoded {
                    table
                        .insert(*id, value.as_slice())
                        .map_err(|e| store_err("Failed to insert point", e))?;
                }
            }
            write_txn
                .commit()
                .map_err(|e| store_err("Failed to commit", e))?;

            debug!("Upserted {} points into {}", encoded.len(), name);
            Ok(())
        })
        .await
    }

    async fn search(&self, name: &str, query: Vec<f32>, limit: u64) -> Result<Vec<ScoredEntry>> {
        let name = name.to_string();
        self.blocking(move |db| {
            let mut hits: Vec<ScoredEntry> = read_points(db, &name, None)?
                .into_iter()
                .map(|point| ScoredEntry {
                    score: cosine_similarity(&query, &point.vector),
                    entry: point.entry,
                })
                .collect();
            hits.sort_by(|a, b| b.score.total_cmp(&a.score));
            hits.truncate(limit as usize);
            Ok(hits)
        })
        .await
    }

    async fn scroll(
        &self,
        name: &str,
        limit: u32,
        with_vectors: bool,
    ) -> Result<Vec<ScrolledPoint>> {
        let name = name.to_string();
        self.blocking(move |db| {
            Ok(read_points(db, &name, Some(limit as usize))?
                .into_iter()
                .map(|point| ScrolledPoint {
                    vector: with_vectors.then_some(point.vector),
                    entry: point.entry,
                })
                .collect())
        })
        .await
    }

    async fn count(&self, name: &str) -> Result<u64> {
        let name = name.to_string();
        self.blocking(move |db| {
            require_collection(db, &name)?;
            let read_txn = db
                .begin_read()
                .map_err(|e| store_err("Failed to begin read", e))?;
            match read_txn.open_table(points_table(&name)) {
                Ok(table) => table
                    .len()
                    .map_err(|e| store_err("Failed to count points", e)),
                Err(TableError::TableDoesNotExist(_)) => Ok(0),
                Err(e) => Err(store_err("Failed to open points table", e)),
            }
        })
        .await
    }

    fn describe(&self) -> String {
        format!("local store at {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIM: usize = 3;

    fn record(id: u64, vector: [f32; DIM], content: &str) -> MemoryRecord {
        MemoryRecord {
            id,
            vector: vector.to_vec(),
            entry: MemoryEntry::now(content.to_string(), Default::default()),
        }
    }

    async fn open_with_collection(dir: &Path) -> LocalStore {
        let store = LocalStore::open(dir).unwrap();
        store.ensure_collection("c", DIM, Metric::Cosine).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_ensure_collection_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_with_collection(tmp.path()).await;
        store.ensure_collection("c", DIM, Metric::Cosine).await.unwrap();
        assert_eq!(store.count("c").await.unwrap(), 0);

        let err = store.ensure_collection("c", 4, Metric::Cosine).await.unwrap_err();
        assert!(matches!(err, MemoryError::Store(_)));
    }

    #[tokio::test]
    async fn test_search_ranks_by_cosine() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_with_collection(tmp.path()).await;
        store
            .upsert(
                "c",
                vec![
                    record(1, [1.0, 0.0, 0.0], "east"),
                    record(2, [0.0, 1.0, 0.0], "north"),
                    record(3, [0.7, 0.7, 0.0], "north-east"),
                ],
            )
            .await
            .unwrap();

        let hits = store.search("c", vec![1.0, 0.1, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entry.content, "east");
        assert_eq!(hits[1].entry.content, "north-east");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_scroll_respects_limit_and_vectors_flag() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_with_collection(tmp.path()).await;
        let points = (1..=5).map(|i| record(i, [i as f32, 1.0, 0.0], "p")).collect();
        store.upsert("c", points).await.unwrap();

        let sample = store.scroll("c", 3, false).await.unwrap();
        assert_eq!(sample.len(), 3);
        assert!(sample.iter().all(|p| p.vector.is_none()));

        let with_vectors = store.scroll("c", 10, true).await.unwrap();
        assert_eq!(with_vectors.len(), 5);
        assert!(with_vectors.iter().all(|p| p.vector.as_ref().map(Vec::len) == Some(DIM)));
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimension() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_with_collection(tmp.path()).await;
        let bad = MemoryRecord {
            id: 9,
            vector: vec![1.0; DIM + 1],
            entry: MemoryEntry::now("bad".into(), Default::default()),
        };
        assert!(store.upsert("c", vec![bad]).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_collection_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalStore::open(tmp.path()).unwrap();
        assert!(store.scroll("nope", 10, false).await.is_err());
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let store = open_with_collection(tmp.path()).await;
            store
                .upsert("c", vec![record(7, [0.0, 0.0, 1.0], "kept")])
                .await
                .unwrap();
        }
        let store = LocalStore::open(tmp.path()).unwrap();
        assert_eq!(store.count("c").await.unwrap(), 1);
        assert_eq!(store.path(), tmp.path().join(DB_FILE));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
