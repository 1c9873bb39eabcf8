//! Base system patching.
//!
//! Builds the unattended-install image: a blank read-write container receives a
//! block restore of the rescue system, the install image's packages, the
//! firstboot package and the automation manifests, and is then converted into a
//! compressed read-only image.
//!
//! `asr restore` re-mounts the restored volume at its default location instead
//! of the mount point we attached it at. The patcher looks for the volume at the
//! configured default first, falls back to the requested mount point, and
//! records the result on the mount handle. Every later path is derived from
//! that effective mount point. A volume already sitting at the default
//! location would be indistinguishable from ours, so the restore refuses to
//! start while one is there.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::common::{copy_into_dir, remove_path, write_file_mode, write_file_with_dirs};
use crate::error::{ReplicaError, Result};
use crate::mount::{MountId, MountOptions, MountStack};
use crate::process::{Cmd, ToolRunner};
use crate::template::{self, TemplateId, Templates};

/// Installer packages directory, relative to a system volume root.
pub const PACKAGES_DIR: &str = "System/Installation/Packages";
/// Startup hook run by the rescue environment, relative to the volume root.
pub const STARTUP_HOOK: &str = "private/etc/rc.cdrom.local";

/// Paths one patch run works with.
#[derive(Debug, Clone)]
pub struct PatchJob {
    /// Root of the mounted install image.
    pub install_mount: PathBuf,
    /// Rescue system image inside the install image.
    pub rescue_image: PathBuf,
    /// Firstboot package to inject.
    pub package: PathBuf,
    /// Scratch read-write container to create.
    pub rw_image: PathBuf,
    /// Where to attach the scratch container.
    pub rw_mount_point: PathBuf,
    /// Final compressed image. Must not exist.
    pub output: PathBuf,
}

pub struct BaseSystemPatcher<'a> {
    runner: &'a dyn ToolRunner,
    templates: &'a Templates,
    image_size: &'a str,
    rescue_volume: &'a Path,
}

impl<'a> BaseSystemPatcher<'a> {
    /// `rescue_volume` is where a block restore is expected to re-mount its target.
    pub fn new(
        runner: &'a dyn ToolRunner,
        templates: &'a Templates,
        image_size: &'a str,
        rescue_volume: &'a Path,
    ) -> Self {
        Self {
            runner,
            templates,
            image_size,
            rescue_volume,
        }
    }

    /// Run the whole patch sequence.
    ///
    /// Mounts are registered on `mounts`. On failure every mount this call
    /// acquired is released before the error is returned; mounts that were
    /// already on the stack are left alone.
    pub fn patch(&self, mounts: &mut MountStack, job: &PatchJob) -> Result<()> {
        if job.output.exists() {
            return Err(ReplicaError::patch(
                "check output",
                format!("{} already exists", job.output.display()),
            ));
        }

        let mark = mounts.len();
        let result = self.run_steps(mounts, job);
        if result.is_err() {
            mounts.unwind_to(mark, self.runner);
        }
        result
    }

    fn run_steps(&self, mounts: &mut MountStack, job: &PatchJob) -> Result<()> {
        println!();
        println!(" => Creating empty read-write DMG at {}..", job.rw_image.display());
        self.create_blank_image(&job.rw_image)?;

        let rw = step(
            "attach",
            mounts.acquire(
                self.runner,
                &job.rw_image,
                &job.rw_mount_point,
                &MountOptions::read_write(),
            ),
        )?;

        println!();
        println!(" => Restoring the base system onto the read-write DMG..");
        let volume = self.restore(mounts, rw, job)?;

        println!();
        println!(" => Moving 'Packages' from the install image into the base system..");
        let packages = self.merge_packages(&job.install_mount, &volume)?;

        println!();
        println!(" => Copying in the original base system image and chunklist..");
        self.copy_rescue_image(&job.rescue_image, &volume)?;

        println!();
        println!(" => Adding automated components..");
        let package_name = job
            .package
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ReplicaError::patch("inject automation", "firstboot package has no file name"))?;
        self.inject_automation(&volume, &packages, &package_name)?;

        step("copy firstboot package", copy_into_dir(&job.package, &packages))?;

        println!();
        println!(" => Unmounting the base system..");
        step("detach", mounts.get_mut(rw).detach(self.runner))?;

        println!();
        println!(" => Converting image to its final form..");
        self.tool(
            "convert",
            Cmd::new("hdiutil")
                .args(["convert", "-format", "UDZO", "-o"])
                .arg_path(&job.output)
                .arg_path(&job.rw_image),
        )?;

        info!(output = %job.output.display(), "base system patched");
        Ok(())
    }

    fn create_blank_image(&self, rw_image: &Path) -> Result<()> {
        if rw_image.exists() {
            return Err(ReplicaError::patch(
                "create",
                format!("scratch image {} already exists", rw_image.display()),
            ));
        }
        self.tool(
            "create",
            Cmd::new("hdiutil")
                .arg("create")
                .arg("-o")
                .arg_path(rw_image)
                .args(["-size", self.image_size, "-layout", "SPUD", "-fs", "HFS+J"]),
        )
    }

    /// Block-restore the rescue image and return the volume's effective root.
    fn restore(&self, mounts: &mut MountStack, rw: MountId, job: &PatchJob) -> Result<PathBuf> {
        let requested = mounts.get(rw).mount_point().to_path_buf();
        if self.rescue_volume != requested && self.rescue_volume.exists() {
            return Err(ReplicaError::patch(
                "restore",
                format!(
                    "a volume is already present at {}, eject it and retry",
                    self.rescue_volume.display()
                ),
            ));
        }
        self.tool(
            "restore",
            Cmd::new("asr")
                .arg("restore")
                .arg("--source")
                .arg_path(&job.rescue_image)
                .arg("--target")
                .arg_path(&requested)
                .args(["--noprompt", "--noverify", "--erase"]),
        )?;

        let volume = locate_restored_volume(self.rescue_volume, &requested)?;
        mounts.get_mut(rw).relocate(&volume);
        info!(requested = %requested.display(), effective = %volume.display(), "restored volume located");

        // The requested mount point is left behind as an empty directory.
        if volume != requested {
            if let Err(e) = fs::remove_dir(&requested) {
                warn!(path = %requested.display(), error = %e, "could not remove stale mount point");
            }
        }
        Ok(volume)
    }

    /// Replace the volume's packages directory with the install image's own.
    fn merge_packages(&self, install_mount: &Path, volume: &Path) -> Result<PathBuf> {
        let packages = volume.join(PACKAGES_DIR);
        if fs::symlink_metadata(&packages).is_ok() {
            step("merge packages", remove_path(&packages))?;
        }

        let source = install_mount.join("Packages");
        if !source.is_dir() {
            return Err(ReplicaError::patch(
                "merge packages",
                format!("{} does not exist", source.display()),
            ));
        }

        let installation_dir = packages
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| volume.to_path_buf());
        self.tool(
            "merge packages",
            Cmd::new("sudo")
                .args(["mv", "-v"])
                .arg_path(&source)
                .arg(format!("{}/", installation_dir.display())),
        )?;

        if !packages.is_dir() {
            return Err(ReplicaError::patch(
                "merge packages",
                format!("{} missing after move", packages.display()),
            ));
        }
        Ok(packages)
    }

    /// The target verifies the rescue environment against these two files.
    fn copy_rescue_image(&self, rescue_image: &Path, volume: &Path) -> Result<()> {
        let chunklist = rescue_image.with_extension("chunklist");
        for file in [rescue_image, chunklist.as_path()] {
            if !file.is_file() {
                return Err(ReplicaError::patch(
                    "copy rescue image",
                    format!("{} does not exist", file.display()),
                ));
            }
            step("copy rescue image", copy_into_dir(file, volume))?;
        }
        Ok(())
    }

    fn inject_automation(&self, volume: &Path, packages: &Path, package_name: &str) -> Result<()> {
        let params = template::installer_params(package_name);

        let hook = step(
            "inject automation",
            self.templates.render(TemplateId::CdromLocal, &params),
        )?;
        step(
            "inject automation",
            write_file_mode(volume.join(STARTUP_HOOK), hook, 0o755),
        )?;

        let install_config = step(
            "inject automation",
            self.templates.render(TemplateId::InstallConfig, &params),
        )?;
        step(
            "inject automation",
            write_file_with_dirs(packages.join("Extras/minstallconfig.xml"), install_config),
        )?;

        let collection = step(
            "inject automation",
            self.templates.render(TemplateId::PackageCollection, &params),
        )?;
        step(
            "inject automation",
            write_file_with_dirs(packages.join("OSInstall.collection"), collection),
        )?;
        Ok(())
    }

    fn tool(&self, step_name: &str, cmd: Cmd) -> Result<()> {
        let out = step(step_name, self.runner.run_tool(&cmd))?;
        if !out.success() {
            let mut detail = format!("'{}' exited with status {}", cmd.program(), out.status);
            if !out.stderr_trimmed().is_empty() {
                detail.push_str(": ");
                detail.push_str(out.stderr_trimmed());
            }
            return Err(ReplicaError::patch(step_name, detail));
        }
        Ok(())
    }
}

/// Find where a block restore left the target volume.
///
/// Prefers the platform's default re-mount location, falling back to the
/// mount point that was originally requested.
pub fn locate_restored_volume(default: &Path, requested: &Path) -> Result<PathBuf> {
    for candidate in [default, requested] {
        if candidate.join("System/Installation").is_dir() {
            return Ok(candidate.to_path_buf());
        }
    }
    Err(ReplicaError::patch(
        "restore",
        format!(
            "restored volume found at neither {} nor {}",
            default.display(),
            requested.display()
        ),
    ))
}

/// Re-label any non-patch error with the step it happened in.
fn step<T>(name: &str, result: Result<T>) -> Result<T> {
    result.map_err(|e| match e {
        ReplicaError::Patch { .. } => e,
        other => ReplicaError::patch(name, other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_locate_prefers_default_volume() {
        let tmp = TempDir::new().unwrap();
        let default = tmp.path().join("Volumes/OS X Base System");
        let requested = tmp.path().join("mnt/rw");
        fs::create_dir_all(default.join("System/Installation")).unwrap();
        fs::create_dir_all(requested.join("System/Installation")).unwrap();
        assert_eq!(locate_restored_volume(&default, &requested).unwrap(), default);
    }

    #[test]
    fn test_locate_falls_back_to_requested() {
        let tmp = TempDir::new().unwrap();
        let default = tmp.path().join("Volumes/OS X Base System");
        let requested = tmp.path().join("mnt/rw");
        fs::create_dir_all(requested.join("System/Installation")).unwrap();
        assert_eq!(locate_restored_volume(&default, &requested).unwrap(), requested);
    }

    #[test]
    fn test_locate_fails_when_volume_missing() {
        let tmp = TempDir::new().unwrap();
        let err = locate_restored_volume(&tmp.path().join("a"), &tmp.path().join("b")).unwrap_err();
        assert!(matches!(err, ReplicaError::Patch { ref step, .. } if step == "restore"));
    }

    #[test]
    fn test_step_relabels_other_errors() {
        let err = step::<()>("convert", Err(ReplicaError::not_found("x", "/x"))).unwrap_err();
        match err {
            ReplicaError::Patch { step, detail } => {
                assert_eq!(step, "convert");
                assert!(detail.contains("/x"));
            }
            other => panic!("unexpected: {other}"),
        }
    }
}
