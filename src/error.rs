//! Error taxonomy for the image pipeline and the VM glue around it.
//!
//! Every fatal variant names the step that failed. Detach failures are not
//! represented here: they are logged by [`crate::mount::MountHandle::release`]
//! and never escalated.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, ReplicaError>;

#[derive(Debug, Error)]
pub enum ReplicaError {
    /// An expected input path does not exist.
    #[error("{what} not found at {}", .path.display())]
    NotFound { what: String, path: PathBuf },

    /// A disk image could not be attached at the requested mount point.
    #[error("failed to mount {} at {}: {reason}", .source_image.display(), .mount_point.display())]
    Mount {
        source_image: PathBuf,
        mount_point: PathBuf,
        reason: String,
    },

    /// The volume's version metadata was absent or malformed.
    #[error("failed to read version info from {}: {reason}", .path.display())]
    Probe { path: PathBuf, reason: String },

    /// A template has no text to render.
    #[error("template '{id}' is not available")]
    Template { id: String },

    /// One of the package build tools exited unsuccessfully.
    #[error("package build failed: '{tool}' exited with status {status}{}", detail_suffix(.detail))]
    PackageBuild {
        tool: String,
        status: i32,
        detail: String,
    },

    /// Assembling the package payload failed before any build tool ran.
    #[error("package build failed at step '{step}': {detail}")]
    PackagePayload { step: String, detail: String },

    /// A base-system patch step failed.
    #[error("base system patch failed at step '{step}': {detail}")]
    Patch { step: String, detail: String },

    /// An external tool outside the image pipeline failed.
    #[error("{step}: '{tool}' exited with status {status}{}", detail_suffix(.detail))]
    Tool {
        step: String,
        tool: String,
        status: i32,
        detail: String,
    },

    /// The user declined to overwrite an existing output image.
    #[error("output image already exists at {} and overwrite was declined", .path.display())]
    OverwriteDeclined { path: PathBuf },

    /// Filesystem operation failed.
    #[error("{context} ({}): {source}", .path.display())]
    Io {
        context: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Invalid configuration value.
    #[error("invalid configuration for {key}: {reason}")]
    Config { key: String, reason: String },
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(":\n{}", detail)
    }
}

impl ReplicaError {
    pub fn not_found(what: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::NotFound {
            what: what.into(),
            path: path.into(),
        }
    }

    pub fn patch(step: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Patch {
            step: step.into(),
            detail: detail.into(),
        }
    }

    pub fn io(context: impl Into<String>, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            path: path.into(),
            source,
        }
    }
}

/// Attach path context to raw `io::Result`s.
pub trait IoContext<T> {
    fn with_path(self, context: &str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn with_path(self, context: &str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| ReplicaError::io(context, path, e))
    }
}
