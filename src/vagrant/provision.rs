//! VM provisioning with vagrant.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::common::write_file_with_dirs;
use crate::config::Config;
use crate::error::{IoContext, ReplicaError, Result};
use crate::process::{Cmd, ToolRunner};
use crate::template::{TemplateId, TemplateParams, Templates};

/// Host directory to copy into the guest after boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSpec {
    pub host_dir: PathBuf,
    pub guest_dir: PathBuf,
}

/// A booted, snapshotted VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmInstance {
    pub directory_path: PathBuf,
    pub box_name: String,
    pub snapshot_id: String,
}

pub struct Provisioner<'a> {
    config: &'a Config,
    runner: &'a dyn ToolRunner,
    templates: &'a Templates,
}

impl<'a> Provisioner<'a> {
    pub fn new(config: &'a Config, runner: &'a dyn ToolRunner, templates: &'a Templates) -> Self {
        Self {
            config,
            runner,
            templates,
        }
    }

    /// Bring up a VM in `dest`.
    ///
    /// With `box_path` set the box is registered first (overwriting any box of
    /// the same name); `None` assumes it is already registered. The first
    /// failing tool aborts the rest of the sequence.
    pub fn provision(
        &self,
        dest: &Path,
        box_path: Option<&Path>,
        sync: Option<&SyncSpec>,
    ) -> Result<VmInstance> {
        fs::create_dir_all(dest).with_path("Failed to create VM directory", dest)?;

        match box_path {
            Some(path) => self.register_box(path)?,
            None => println!(" => Skipping the registration of the vagrant box"),
        }

        println!();
        println!(" => Creating and booting vagrant VM at {}..", dest.display());
        self.create_vm(dest)?;

        println!();
        println!(" => Creating an initial snapshot..");
        self.vagrant(dest, &["snapshot", "save", self.config.snapshot_id.as_str()], "snapshot")?;
        println!(" NOTE: you can restore this saved snapshot state of the virtual machine with:");
        println!(" $ vagrant snapshot restore {}", self.config.snapshot_id);

        if let Some(sync) = sync {
            println!();
            println!(" => Syncing {} into the VM..", sync.host_dir.display());
            self.upload_dir(dest, sync)?;
        }

        Ok(VmInstance {
            directory_path: dest.to_path_buf(),
            box_name: self.config.box_name.clone(),
            snapshot_id: self.config.snapshot_id.clone(),
        })
    }

    fn register_box(&self, box_path: &Path) -> Result<()> {
        if !box_path.is_file() {
            return Err(ReplicaError::not_found("vagrant box", box_path));
        }
        println!();
        println!(" => Registering the vagrant box: {}", box_path.display());
        Cmd::new("vagrant")
            .args(["box", "add", "--force", "--name", self.config.box_name.as_str()])
            .arg_path(box_path)
            .run_checked(self.runner, "register box")?;
        info!(box_name = %self.config.box_name, "box registered");
        Ok(())
    }

    fn create_vm(&self, dest: &Path) -> Result<()> {
        let vagrantfile = dest.join("Vagrantfile");

        // `vagrant destroy` refuses to run without a Vagrantfile.
        if vagrantfile.exists() {
            self.vagrant(dest, &["destroy", "-f"], "destroy")?;
        }

        let definition = self.templates.render(
            TemplateId::Vagrantfile,
            &TemplateParams::new().set("BoxName", &self.config.box_name),
        )?;
        write_file_with_dirs(&vagrantfile, definition)?;

        self.vagrant(dest, &["up"], "boot")
    }

    fn upload_dir(&self, dest: &Path, sync: &SyncSpec) -> Result<()> {
        if !sync.host_dir.is_dir() {
            return Err(ReplicaError::not_found("sync directory", &sync.host_dir));
        }

        let ssh_config = Cmd::new("vagrant")
            .arg("ssh-config")
            .dir(dest)
            .captured()
            .run_checked(self.runner, "ssh-config")?;

        let scratch = tempfile::Builder::new()
            .prefix("replica-vagrant-ssh")
            .tempdir()
            .with_path("Failed to create ssh config directory", std::env::temp_dir())?;
        let config_file = scratch.path().join("vagrant.ssh.config");
        write_file_with_dirs(&config_file, ssh_config.stdout_trimmed())?;

        Cmd::new("rsync")
            .arg("-avhP")
            .arg("-e")
            .arg(format!("ssh -F {}", config_file.display()))
            .arg(dir_contents(&sync.host_dir))
            .arg(format!("default:{}", dir_contents(&sync.guest_dir)))
            .dir(dest)
            .run_checked(self.runner, "sync")?;
        Ok(())
    }

    fn vagrant(&self, dest: &Path, args: &[&str], step: &str) -> Result<()> {
        Cmd::new("vagrant")
            .args(args)
            .dir(dest)
            .run_checked(self.runner, step)?;
        Ok(())
    }
}

/// `dir` with exactly one trailing slash, so rsync copies its contents.
fn dir_contents(dir: &Path) -> String {
    let text = dir.to_string_lossy();
    let trimmed = text.trim_end_matches('/');
    format!("{}/", trimmed)
}
