//! ============================================================================
//! VAT-CORE: Personal long-term memory
//! ============================================================================
//! This crate handles all backend logic for the memory store:
//! - Overlapping text chunking and Gemini embeddings
//! - Vector storage in an embedded redb file or a Qdrant server
//! - Similarity retrieval and recency listing
//! - t-SNE / UMAP projection rendered to a self-contained HTML document
//! ============================================================================

pub mod config;
pub mod logging;
pub mod memory;
pub mod paths;
pub mod tools;
pub mod types;
pub mod visualize;

// Re-export main types for convenience
pub use config::MemoryConfig;
pub use memory::{Embedder, LocalStore, MemoryManager, VectorStore};
pub use types::*;
pub use visualize::{ReducerKind, VisualizationReport};
