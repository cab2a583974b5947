//! ============================================================================
//! Logging - Process-wide tracing subscriber
//! ============================================================================
//! Events go to stderr and are appended to <app_dir>/log.txt.
//! Filter comes from RUST_LOG, defaulting to info for this workspace.
//! ============================================================================

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::paths;
use crate::types::Result;

/// Install the global subscriber. Safe to call more than once; later calls
/// leave the first subscriber in place.
pub fn init(app_dir: &Path) -> Result<()> {
    paths::ensure_dir(app_dir)?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths::log_path(app_dir))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vat_core=info,vat=info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(log_file)),
        )
        .try_init();

    Ok(())
}
