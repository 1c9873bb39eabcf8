//! Product version detection from a mounted system volume.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ReplicaError, Result};

/// Location of the version metadata, relative to the volume root.
pub const SYSTEM_VERSION_PLIST: &str = "System/Library/CoreServices/SystemVersion.plist";

/// Product version and build of a system image.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OsVersionInfo {
    #[serde(rename = "ProductVersion")]
    pub version: String,
    #[serde(rename = "ProductBuildVersion")]
    pub build: String,
}

impl OsVersionInfo {
    /// `OSX_InstallESD_<version>_<build>.dmg`
    pub fn output_file_name(&self) -> String {
        format!("OSX_InstallESD_{}_{}.dmg", self.version, self.build)
    }

    /// Deterministic output image path under `out_dir`.
    pub fn output_path(&self, out_dir: &Path) -> PathBuf {
        out_dir.join(self.output_file_name())
    }
}

/// Read version/build from the volume mounted at `volume_root`.
pub fn probe(volume_root: &Path) -> Result<OsVersionInfo> {
    let path = volume_root.join(SYSTEM_VERSION_PLIST);
    if !path.is_file() {
        return Err(ReplicaError::Probe {
            path,
            reason: "file does not exist".to_string(),
        });
    }

    let info: OsVersionInfo = plist::from_file(&path).map_err(|e| ReplicaError::Probe {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    if info.version.trim().is_empty() || info.build.trim().is_empty() {
        return Err(ReplicaError::Probe {
            path,
            reason: "empty ProductVersion or ProductBuildVersion".to_string(),
        });
    }
    Ok(info)
}
