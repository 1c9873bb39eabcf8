//! DMG command - builds the unattended-install image.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::Config;
use crate::disk;
use crate::pipeline::{DmgPipeline, FixedAnswer, OverwritePrompt, StdinPrompt};
use crate::process::ToolRunner;
use crate::timing::Timer;

/// Execute `replica dmg <INSTALLER_APP>`.
///
/// With `assume_yes` an existing output image is replaced without asking.
pub fn cmd_dmg(
    config: &Config,
    runner: &dyn ToolRunner,
    installer_app: &Path,
    assume_yes: bool,
) -> Result<PathBuf> {
    println!("=== Building auto-install DMG ===");
    println!("Installer: {}", installer_app.display());
    disk::print_free_disk_space(&config.out_dir);

    let yes = FixedAnswer(true);
    let prompt: &dyn OverwritePrompt = if assume_yes { &yes } else { &StdinPrompt };

    let timer = Timer::start("dmg");
    let output = DmgPipeline::new(config, runner, prompt)?
        .run(installer_app)
        .with_context(|| format!("Failed to create install DMG from {}", installer_app.display()))?;
    timer.finish();

    disk::print_free_disk_space(&config.out_dir);
    println!();
    println!("Done. Built image is located at {}.", output.display());
    match disk::sha256_file(&output) {
        Ok(sum) => println!("SHA-256: {}", sum),
        Err(e) => warn!(error = %e, "could not checksum output image"),
    }
    println!();

    Ok(output)
}
