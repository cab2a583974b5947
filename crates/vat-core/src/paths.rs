//! ============================================================================
//! Application Paths - Per-user directory and identifier
//! ============================================================================
//! Default root: ~/.brain_in_a_vat (override via VAT_HOME env var)
//! Holds the local vector database, the append-only log, rendered
//! visualizations and the per-user identifier file.
//! ============================================================================

use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{MemoryError, Result};

const APP_DIR_NAME: &str = ".brain_in_a_vat";
const USER_UUID_FILE: &str = "user_uuid.txt";
const LOG_FILE: &str = "log.txt";

/// Resolve the application directory without creating it.
/// An explicit override wins over `~/.brain_in_a_vat`.
pub fn resolve_app_dir(override_dir: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().ok_or_else(|| {
        MemoryError::Configuration("Cannot determine home directory".to_string())
    })?;
    Ok(home.join(APP_DIR_NAME))
}

/// Create the application directory if needed
pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Path of the append-only log inside `app_dir`
pub fn log_path(app_dir: &Path) -> PathBuf {
    app_dir.join(LOG_FILE)
}

/// Stable random identifier for this installation's user.
/// Created on first use and read back afterwards.
pub fn user_uuid(app_dir: &Path) -> Result<String> {
    let path = app_dir.join(USER_UUID_FILE);
    if path.exists() {
        let existing = std::fs::read_to_string(&path)?;
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            debug!("Using user id from {}", path.display());
            return Ok(trimmed.to_string());
        }
    }

    ensure_dir(app_dir)?;
    let user_id = Uuid::new_v4().to_string();
    std::fs::write(&path, &user_id)?;
    info!("Created user id at {}", path.display());
    Ok(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        let dir = resolve_app_dir(Some("/tmp/vat-test")).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/vat-test"));
    }

    #[test]
    fn test_user_uuid_is_stable() {
        let tmp = tempfile::tempdir().unwrap();
        let first = user_uuid(tmp.path()).unwrap();
        let second = user_uuid(tmp.path()).unwrap();
        assert_eq!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
    }

    #[test]
    fn test_user_uuid_creates_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        let id = user_uuid(&nested).unwrap();
        assert_eq!(std::fs::read_to_string(nested.join(USER_UUID_FILE)).unwrap(), id);
    }
}
