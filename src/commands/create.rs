//! Create command - installer app to vagrant box in one go.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::process::ToolRunner;

use super::{cmd_box, cmd_dmg};

/// Execute `replica create <INSTALLER_APP>`: `dmg`, then `box`.
pub fn cmd_create(
    config: &Config,
    runner: &dyn ToolRunner,
    installer_app: &Path,
    assume_yes: bool,
) -> Result<PathBuf> {
    let dmg = cmd_dmg(config, runner, installer_app, assume_yes)?;
    cmd_box(config, runner, &dmg)
}
