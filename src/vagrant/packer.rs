//! Box build with packer.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::assets::{Assets, PACKER_DIR, PACKER_TEMPLATE};
use crate::config::Config;
use crate::error::{IoContext, ReplicaError, Result};
use crate::process::{Cmd, ToolRunner};

/// Packer builder that produces the box.
pub const PACKER_BUILDER: &str = "virtualbox-iso";

/// A box file ready to be registered with vagrant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VagrantBoxArtifact {
    pub path: PathBuf,
}

/// Build a box from the unattended-install image at `install_dmg`.
///
/// The packer template directory is extracted into `<out>/packer` and packer
/// runs from there. The box is expected at [`Config::box_path`] afterwards.
pub fn build_box(
    config: &Config,
    runner: &dyn ToolRunner,
    assets: &Assets,
    install_dmg: &Path,
) -> Result<VagrantBoxArtifact> {
    if !install_dmg.is_file() {
        return Err(ReplicaError::not_found("auto-installer DMG", install_dmg));
    }
    let install_dmg = install_dmg
        .canonicalize()
        .with_path("Failed to resolve DMG path", install_dmg)?;

    let work_dir = config.out_dir.join(PACKER_DIR);
    assets.extract_dir(PACKER_DIR, &work_dir)?;
    info!(work_dir = %work_dir.display(), "packer template extracted");

    Cmd::new("packer")
        .args(["build", "--only", PACKER_BUILDER])
        .arg("--var")
        .arg(format!("iso_url={}", install_dmg.display()))
        .args(["--var", "autologin=true"])
        .arg(format!("./{}", PACKER_TEMPLATE))
        .dir(&work_dir)
        .run_checked(runner, "packer build")?;

    let path = config.box_path();
    if !path.is_file() {
        return Err(ReplicaError::not_found("vagrant box", path));
    }
    Ok(VagrantBoxArtifact { path })
}
