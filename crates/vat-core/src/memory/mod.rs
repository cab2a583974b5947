//! ============================================================================
//! Memory Module - Personal long-term memory store
//! ============================================================================
//! Chunks free-form text, embeds each chunk and stores it as a point in a
//! single cosine collection. Retrieval embeds the query and searches.
//!
//! ## Architecture
//! ```text
//! Content -> ChunkSplitter -> [chunk..] -> Embedder -> VectorStore
//!                                                          |
//! Query   -> Embedder -> search -------------------------->+-> MemoryEntry
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use vat_core::{MemoryConfig, MemoryManager};
//!
//! let manager = MemoryManager::new(MemoryConfig::from_env()?)?;
//! manager.record("Met Ana at the climbing gym", None).await?;
//! let hits = manager.retrieve("who did I meet climbing", 5).await?;
//! ```
//! ============================================================================

mod chunker;
mod embeddings;
mod ids;
mod local_store;
mod manager;
mod store;

pub use chunker::ChunkSplitter;
pub use embeddings::{Embedder, GeminiEmbedder};
pub use ids::IdGenerator;
pub use local_store::LocalStore;
pub use manager::{MemoryManager, DEFAULT_RECENT_LIMIT, DEFAULT_TOP_K, RECORD_STATUS};
pub use store::{QdrantStore, VectorStore};

pub(crate) use manager::with_deadline;
