//! Asset provider: account picture, password hash blob and the packer template.
//!
//! Assets are plain files under a configured root directory.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{IoContext, ReplicaError, Result};

pub const ACCOUNT_IMAGE: &str = "vagrant.jpg";
pub const PASSWORD_SHADOW: &str = "usr-password-shadow";
pub const PACKER_DIR: &str = "packer";
pub const PACKER_TEMPLATE: &str = "template.json";

#[derive(Debug, Clone)]
pub struct Assets {
    root: PathBuf,
}

impl Assets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Read a file asset.
    pub fn bytes(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path(name);
        if !path.is_file() {
            return Err(ReplicaError::not_found(format!("asset '{}'", name), path));
        }
        fs::read(&path).with_path("Failed to read asset", &path)
    }

    /// Copy the asset directory `name` into `target`, creating it.
    ///
    /// Existing files in `target` are overwritten. Returns `target`.
    pub fn extract_dir(&self, name: &str, target: &Path) -> Result<PathBuf> {
        let source = self.path(name);
        if !source.is_dir() {
            return Err(ReplicaError::not_found(format!("asset directory '{}'", name), source));
        }
        fs::create_dir_all(target).with_path("Failed to create directory", target)?;

        for entry in WalkDir::new(&source).min_depth(1) {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| source.clone());
                ReplicaError::io("Failed to walk asset directory", path, e.into())
            })?;
            let Ok(relative) = entry.path().strip_prefix(&source) else {
                continue;
            };
            let dest = target.join(relative);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&dest).with_path("Failed to create directory", &dest)?;
            } else {
                fs::copy(entry.path(), &dest).with_path("Failed to copy asset", &dest)?;
            }
        }
        Ok(target.to_path_buf())
    }
}
