//! ============================================================================
//! Memory Configuration
//! ============================================================================
//! Built once from the process environment (after loading `.env`).
//! GOOGLE_API_KEY is required; everything else has a default.
//! ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use crate::paths;
use crate::types::{MemoryError, Result};

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "gemini-embedding-exp-03-07";

/// Default embedding API root
pub const DEFAULT_EMBEDDING_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for the memory store
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Credential for the embedding service
    pub api_key: String,
    /// Per-user application directory
    pub app_dir: PathBuf,
    /// Root of the local file-backed vector database
    pub store_path: PathBuf,
    /// Remote Qdrant server; when unset the local engine is used
    pub qdrant_url: Option<String>,
    pub embedding_model: String,
    pub embedding_base_url: String,
    /// Deadline for a single embedding call
    pub embed_timeout: Duration,
    /// Deadline for a single store call
    pub store_timeout: Duration,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl MemoryConfig {
    /// Build a config with defaults for everything but the credential
    pub fn new(api_key: impl Into<String>, app_dir: PathBuf) -> Self {
        Self {
            api_key: api_key.into(),
            store_path: app_dir.join("memory_db"),
            app_dir,
            qdrant_url: None,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_base_url: DEFAULT_EMBEDDING_BASE_URL.to_string(),
            embed_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            store_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }

    /// Load from process environment. Reads `.env` first if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GOOGLE_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                MemoryError::Configuration(
                    "GOOGLE_API_KEY environment variable is not set".to_string(),
                )
            })?;

        let app_dir = paths::resolve_app_dir(lookup("VAT_HOME").as_deref())?;
        let mut config = Self::new(api_key, app_dir);

        if let Some(path) = lookup("VAT_STORE_PATH") {
            config.store_path = PathBuf::from(path);
        }
        config.qdrant_url = lookup("QDRANT_URL").filter(|u| !u.trim().is_empty());
        if let Some(model) = lookup("VAT_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Some(url) = lookup("VAT_EMBEDDING_BASE_URL") {
            config.embedding_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "VAT_EMBED_TIMEOUT_SECS")? {
            config.embed_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "VAT_STORE_TIMEOUT_SECS")? {
            config.store_timeout = Duration::from_secs(secs);
        }
        if let Some(size) = parse_var::<usize>(&lookup, "VAT_CHUNK_SIZE")? {
            config.chunk_size = size;
        }
        if let Some(overlap) = parse_var::<usize>(&lookup, "VAT_CHUNK_OVERLAP")? {
            config.chunk_overlap = overlap;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings no operation could run with
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(MemoryError::Configuration("API key is empty".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(MemoryError::Configuration(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(MemoryError::Configuration(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.embed_timeout.is_zero() || self.store_timeout.is_zero() {
            return Err(MemoryError::Configuration(
                "timeouts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            MemoryError::Configuration(format!("{} has an invalid value: '{}'", key, raw))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_missing_key_is_fatal() {
        let err = MemoryConfig::from_lookup(lookup_from(&[("VAT_HOME", "/tmp/v")])).unwrap_err();
        assert!(matches!(err, MemoryError::Configuration(_)));
    }

    #[test]
    fn test_defaults() {
        let config = MemoryConfig::from_lookup(lookup_from(&[
            ("GOOGLE_API_KEY", "k"),
            ("VAT_HOME", "/tmp/v"),
        ]))
        .unwrap();

        assert_eq!(config.app_dir, PathBuf::from("/tmp/v"));
        assert_eq!(config.store_path, PathBuf::from("/tmp/v/memory_db"));
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.embedding_model, DEFAULT_EMBEDDING_MODEL);
        assert!(config.qdrant_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = MemoryConfig::from_lookup(lookup_from(&[
            ("GOOGLE_API_KEY", "k"),
            ("VAT_HOME", "/tmp/v"),
            ("VAT_STORE_PATH", "/data/vectors"),
            ("QDRANT_URL", "http://localhost:6334"),
            ("VAT_EMBED_TIMEOUT_SECS", "5"),
            ("VAT_CHUNK_SIZE", "200"),
            ("VAT_CHUNK_OVERLAP", "20"),
        ]))
        .unwrap();

        assert_eq!(config.store_path, PathBuf::from("/data/vectors"));
        assert_eq!(config.qdrant_url.as_deref(), Some("http://localhost:6334"));
        assert_eq!(config.embed_timeout, Duration::from_secs(5));
        assert_eq!(config.chunk_size, 200);
        assert_eq!(config.chunk_overlap, 20);
    }

    #[test]
    fn test_bad_numbers_rejected() {
        let err = MemoryConfig::from_lookup(lookup_from(&[
            ("GOOGLE_API_KEY", "k"),
            ("VAT_HOME", "/tmp/v"),
            ("VAT_CHUNK_SIZE", "lots"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("VAT_CHUNK_SIZE"));

        let err = MemoryConfig::from_lookup(lookup_from(&[
            ("GOOGLE_API_KEY", "k"),
            ("VAT_HOME", "/tmp/v"),
            ("VAT_CHUNK_SIZE", "50"),
            ("VAT_CHUNK_OVERLAP", "50"),
        ]))
        .unwrap_err();
        assert!(matches!(err, MemoryError::Configuration(_)));
    }
}
