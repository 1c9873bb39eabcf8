//! Vagrant command - boots and snapshots a VM from the box.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::disk;
use crate::process::ToolRunner;
use crate::template::Templates;
use crate::vagrant::{Provisioner, SyncSpec, VmInstance};

/// Options of `replica vagrant`.
#[derive(Debug, Clone)]
pub struct VagrantOptions {
    /// Box to register. Defaults to the box `replica box` produces.
    pub box_path: Option<PathBuf>,
    pub skip_box_reg: bool,
    pub sync_dir: Option<PathBuf>,
    pub sync_target: PathBuf,
}

/// Execute `replica vagrant <DEST_DIR> [BOX]`.
pub fn cmd_vagrant(
    config: &Config,
    runner: &dyn ToolRunner,
    dest: &Path,
    options: &VagrantOptions,
) -> Result<VmInstance> {
    let box_path = if options.skip_box_reg {
        None
    } else {
        let path = options.box_path.clone().unwrap_or_else(|| config.box_path());
        if !path.is_file() {
            bail!(
                "Vagrant box not found at {}. Build one with 'replica box', or pass --skip-box-reg if it is already registered.",
                path.display()
            );
        }
        Some(path)
    };

    let sync = options.sync_dir.as_ref().map(|host_dir| SyncSpec {
        host_dir: host_dir.clone(),
        guest_dir: options.sync_target.clone(),
    });

    let templates = match &config.templates_dir {
        Some(dir) => Templates::with_overrides(dir)?,
        None => Templates::builtin(),
    };

    disk::print_free_disk_space(dest.parent().unwrap_or(dest));
    let vm = Provisioner::new(config, runner, &templates)
        .provision(dest, box_path.as_deref(), sync.as_ref())
        .with_context(|| format!("Failed to provision vagrant VM at {}", dest.display()))?;
    disk::print_free_disk_space(dest);

    println!();
    println!(" => vagrant VM '{}' ready at {} [OK]", vm.box_name, vm.directory_path.display());
    Ok(vm)
}
