//! Scoped disk image mounts.
//!
//! [`acquire`] attaches a container with `hdiutil attach`; [`MountHandle::release`]
//! detaches it on a best-effort basis. Handles live on a [`MountStack`] owned by
//! the pipeline run, which releases them in reverse acquisition order.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{ReplicaError, Result};
use crate::process::{Cmd, ToolRunner};

/// How a container is attached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountOptions {
    /// Copy-on-write overlay file. Implies a writable mount; must not exist yet.
    pub shadow: Option<PathBuf>,
    pub read_only: bool,
    /// Honour on-disk ownership (`-owners on`).
    pub owners_on: bool,
}

impl MountOptions {
    pub fn read_only() -> Self {
        Self {
            shadow: None,
            read_only: true,
            owners_on: true,
        }
    }

    pub fn read_write() -> Self {
        Self {
            shadow: None,
            read_only: false,
            owners_on: true,
        }
    }

    pub fn with_shadow(shadow: impl Into<PathBuf>) -> Self {
        Self {
            shadow: Some(shadow.into()),
            read_only: false,
            owners_on: true,
        }
    }
}

/// One attached disk image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountHandle {
    source_image: PathBuf,
    mount_point: PathBuf,
    effective_mount_point: PathBuf,
    shadow: Option<PathBuf>,
    mounted: bool,
    /// A forced detach was attempted and did not succeed.
    release_failed: bool,
}

impl MountHandle {
    pub fn source_image(&self) -> &Path {
        &self.source_image
    }

    /// The mount point that was asked for.
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Where the volume's content is reachable right now.
    ///
    /// Equal to [`mount_point`](Self::mount_point) until [`relocate`](Self::relocate)
    /// records that an operation re-mounted the volume elsewhere.
    pub fn effective_mount_point(&self) -> &Path {
        &self.effective_mount_point
    }

    pub fn shadow(&self) -> Option<&Path> {
        self.shadow.as_deref()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// The volume may still be attached even though the handle was released.
    pub fn release_failed(&self) -> bool {
        self.release_failed
    }

    /// Record that the volume is now reachable at `path`.
    pub fn relocate(&mut self, path: impl Into<PathBuf>) {
        self.effective_mount_point = path.into();
    }

    /// Detach the volume, failing on a non-zero exit.
    ///
    /// Used where a clean detach is part of the work (before converting the
    /// container). On failure the handle stays mounted so a later
    /// [`release`](Self::release) still gets a forced attempt.
    pub fn detach(&mut self, runner: &dyn ToolRunner) -> Result<()> {
        if !self.mounted {
            return Ok(());
        }
        let cmd = Cmd::new("hdiutil")
            .arg("detach")
            .arg_path(&self.effective_mount_point);
        let out = runner.run_tool(&cmd)?;
        if !out.success() {
            return Err(ReplicaError::Mount {
                source_image: self.source_image.clone(),
                mount_point: self.effective_mount_point.clone(),
                reason: format!("hdiutil detach exited with status {}", out.status),
            });
        }
        self.mounted = false;
        Ok(())
    }

    /// Best-effort forced detach. Idempotent; failures are logged, never returned.
    pub fn release(&mut self, runner: &dyn ToolRunner) {
        if !self.mounted {
            return;
        }
        self.mounted = false;

        let target = self.effective_mount_point.clone();
        let cmd = Cmd::new("hdiutil")
            .args(["detach", "-quiet", "-force"])
            .arg_path(&target);
        match runner.run_tool(&cmd) {
            Ok(out) if out.success() => info!(mount = %target.display(), "detached"),
            Ok(out) => {
                self.release_failed = true;
                warn!(
                    mount = %target.display(),
                    status = out.status,
                    "failed to detach mount, it may need manual cleanup"
                );
            }
            Err(e) => {
                self.release_failed = true;
                warn!(
                    mount = %target.display(),
                    error = %e,
                    "failed to detach mount, it may need manual cleanup"
                );
            }
        }
    }
}

/// Attach `source_image` at `mount_point`.
///
/// Creates the mount point if needed. A pre-existing shadow file means a stale
/// artifact from an earlier run and is refused.
pub fn acquire(
    runner: &dyn ToolRunner,
    source_image: &Path,
    mount_point: &Path,
    options: &MountOptions,
) -> Result<MountHandle> {
    let mount_err = |reason: String| ReplicaError::Mount {
        source_image: source_image.to_path_buf(),
        mount_point: mount_point.to_path_buf(),
        reason,
    };

    fs::create_dir_all(mount_point)
        .map_err(|e| mount_err(format!("cannot create mount point: {}", e)))?;

    let mut cmd = Cmd::new("hdiutil")
        .arg("attach")
        .arg_path(source_image)
        .arg("-mountpoint")
        .arg_path(mount_point);

    if let Some(shadow) = &options.shadow {
        if shadow.exists() {
            return Err(mount_err(format!(
                "shadow file already exists at {}",
                shadow.display()
            )));
        }
        cmd = cmd.arg("-shadow").arg_path(shadow);
    } else if options.read_only {
        cmd = cmd.arg("-readonly");
    }

    cmd = cmd.arg("-nobrowse");
    if options.owners_on {
        cmd = cmd.args(["-owners", "on"]);
    }

    let out = runner.run_tool(&cmd).map_err(|e| mount_err(e.to_string()))?;
    if !out.success() {
        return Err(mount_err(format!("hdiutil attach exited with status {}", out.status)));
    }

    Ok(MountHandle {
        source_image: source_image.to_path_buf(),
        mount_point: mount_point.to_path_buf(),
        effective_mount_point: mount_point.to_path_buf(),
        shadow: options.shadow.clone(),
        mounted: true,
        release_failed: false,
    })
}

/// Index of a handle on a [`MountStack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountId(usize);

/// Mounts owned by one pipeline run, released last-in first-out.
///
/// Released handles stay on the stack so their release target never changes
/// and a second release is a no-op.
#[derive(Debug, Default)]
pub struct MountStack {
    handles: Vec<MountHandle>,
}

impl MountStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a mount and register it before returning.
    pub fn acquire(
        &mut self,
        runner: &dyn ToolRunner,
        source_image: &Path,
        mount_point: &Path,
        options: &MountOptions,
    ) -> Result<MountId> {
        let handle = acquire(runner, source_image, mount_point, options)?;
        Ok(self.push(handle))
    }

    pub fn push(&mut self, handle: MountHandle) -> MountId {
        self.handles.push(handle);
        MountId(self.handles.len() - 1)
    }

    pub fn get(&self, id: MountId) -> &MountHandle {
        &self.handles[id.0]
    }

    pub fn get_mut(&mut self, id: MountId) -> &mut MountHandle {
        &mut self.handles[id.0]
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Number of handles still attached.
    pub fn mounted_count(&self) -> usize {
        self.handles.iter().filter(|h| h.is_mounted()).count()
    }

    /// Whether any release on this stack left a volume possibly attached.
    pub fn any_release_failed(&self) -> bool {
        self.handles.iter().any(MountHandle::release_failed)
    }

    /// Release one handle now.
    pub fn release(&mut self, id: MountId, runner: &dyn ToolRunner) {
        self.handles[id.0].release(runner);
    }

    /// Release every handle acquired at or after `mark`, newest first.
    pub fn unwind_to(&mut self, mark: usize, runner: &dyn ToolRunner) {
        for handle in self.handles.iter_mut().skip(mark).rev() {
            handle.release(runner);
        }
    }

    /// Release every handle, newest first.
    pub fn unwind(&mut self, runner: &dyn ToolRunner) {
        self.unwind_to(0, runner);
    }
}
