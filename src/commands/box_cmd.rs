//! Box command - builds a vagrant box from an auto-install DMG.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::assets::Assets;
use crate::config::Config;
use crate::disk;
use crate::process::ToolRunner;
use crate::timing::Timer;
use crate::vagrant;

/// Execute `replica box <INSTALL_DMG>`.
pub fn cmd_box(config: &Config, runner: &dyn ToolRunner, install_dmg: &Path) -> Result<PathBuf> {
    println!();
    println!(" => Creating vagrant box, using auto-installer DMG: {}", install_dmg.display());
    disk::print_free_disk_space(&config.out_dir);

    let timer = Timer::start("box");
    let artifact = vagrant::build_box(config, runner, &Assets::new(&config.assets_dir), install_dmg)
        .context("Failed to create vagrant box")?;
    timer.finish();

    disk::print_free_disk_space(&config.out_dir);
    println!(" => vagrant box ready! You can find it at: {}", artifact.path.display());
    Ok(artifact.path)
}
