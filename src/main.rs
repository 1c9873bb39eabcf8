//! Replica - macOS installer app to unattended-install DMG, vagrant box and VM.
//!
//! - `dmg` patches the installer's rescue system into a self-installing image
//! - `box` feeds that image to packer
//! - `vagrant` boots a VM from the box and snapshots it

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use replica::commands;
use replica::commands::vagrant::VagrantOptions;
use replica::config::Config;
use replica::process::SystemRunner;

#[derive(Parser)]
#[command(name = "replica")]
#[command(about = "Build a macOS vagrant VM from an \"Install OS X\" app")]
#[command(
    after_help = "QUICK START:\n  replica preflight                Check tools and assets\n  replica create <INSTALLER_APP>   Build the DMG and the box\n  replica vagrant <DIR>            Boot a VM from the box"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a vagrant box from an "Install OS X" app (dmg, then box)
    Create {
        /// Path of the installer app
        installer_app: PathBuf,
        /// Overwrite an existing DMG without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Create an unattended-install DMG from an "Install OS X" app
    Dmg {
        /// Path of the installer app
        installer_app: PathBuf,
        /// Overwrite an existing DMG without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Create a vagrant box, using an auto-installer DMG
    Box {
        /// Path of the DMG built by `replica dmg`
        install_dmg: PathBuf,
    },

    /// Create a vagrant VM, using the vagrant box
    Vagrant {
        /// Directory the VM lives in
        dest: PathBuf,
        /// Box to register (default: the box `replica box` builds)
        box_path: Option<PathBuf>,
        /// Skip the box registration (only if the box is already registered!)
        #[arg(long)]
        skip_box_reg: bool,
        /// Host directory to sync into the VM after boot
        #[arg(long)]
        sync_dir: Option<PathBuf>,
        /// Where the synced directory lands in the VM
        #[arg(long, default_value = "/Applications/Xcode.app")]
        sync_target: PathBuf,
    },

    /// Print host tool versions
    Sysinfo,

    /// Print version
    Version {
        /// Include target arch and os
        #[arg(long)]
        full: bool,
    },

    /// Run preflight checks (verify tools and assets before a build)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Show the resolved configuration
    ShowConfig,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    dotenvy::dotenv().ok();
    init_tracing();

    if let Commands::Version { full } = cli.command {
        commands::cmd_version(full);
        return Ok(());
    }

    let base_dir = std::env::current_dir()?;
    let config = Config::load(&base_dir)?;
    let runner = SystemRunner;

    match cli.command {
        Commands::Create { installer_app, yes } => {
            commands::cmd_create(&config, &runner, &installer_app, yes)?;
        }

        Commands::Dmg { installer_app, yes } => {
            commands::cmd_dmg(&config, &runner, &installer_app, yes)?;
        }

        Commands::Box { install_dmg } => {
            commands::cmd_box(&config, &runner, &install_dmg)?;
        }

        Commands::Vagrant {
            dest,
            box_path,
            skip_box_reg,
            sync_dir,
            sync_target,
        } => {
            let options = VagrantOptions {
                box_path,
                skip_box_reg,
                sync_dir,
                sync_target,
            };
            commands::cmd_vagrant(&config, &runner, &dest, &options)?;
        }

        Commands::Sysinfo => {
            commands::cmd_sysinfo(&runner, &base_dir)?;
        }

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&config, strict)?;
        }

        Commands::ShowConfig => {
            commands::cmd_show_config(&config)?;
        }

        Commands::Version { .. } => {}
    }

    Ok(())
}
