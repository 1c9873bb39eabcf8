//! Per-run temporary work directories.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{IoContext, Result};

/// Create a fresh, uniquely named work directory under `parent_dir`.
///
/// The directory is not removed automatically; the owner decides whether to
/// purge or keep it.
pub fn create_run_dir(parent_dir: &Path, prefix: &str) -> Result<PathBuf> {
    fs::create_dir_all(parent_dir).with_path("Failed to create temp root", parent_dir)?;
    let dir = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(parent_dir)
        .with_path("Failed to create temporary directory", parent_dir)?;
    Ok(dir.keep())
}

/// Remove a work directory, logging instead of failing.
pub fn cleanup_work_dir(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path) {
        if path.exists() {
            warn!(path = %path.display(), error = %e, "failed to remove temporary directory");
        }
    }
}
