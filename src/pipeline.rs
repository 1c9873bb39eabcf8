//! Installer bundle to unattended-install DMG, end to end.
//!
//! One [`PipelineRun`] owns the per-run temp directory and every mount the run
//! acquires. Whatever happens, the mounts are released in reverse order before
//! [`DmgPipeline::run`] returns. The temp directory is purged on success and
//! kept on failure so the partial state can be inspected.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::assets::Assets;
use crate::common::{cleanup_work_dir, create_run_dir};
use crate::config::Config;
use crate::error::{IoContext, ReplicaError, Result};
use crate::firstboot::{AccountDescriptor, FirstbootPackageBuilder};
use crate::mount::{MountOptions, MountStack};
use crate::patcher::{BaseSystemPatcher, PatchJob};
use crate::probe::{self, OsVersionInfo};
use crate::process::ToolRunner;
use crate::template::Templates;
use crate::timing::Timer;

/// Install image inside the vendor installer app.
pub const INSTALL_IMAGE_PATH: &str = "Contents/SharedSupport/InstallESD.dmg";
/// Rescue system image inside the mounted install image.
pub const RESCUE_IMAGE_NAME: &str = "BaseSystem.dmg";
/// Prefix of per-run temp directories.
pub const RUN_DIR_PREFIX: &str = "replica-";

/// Asks whether an existing output image may be replaced.
pub trait OverwritePrompt {
    fn confirm_overwrite(&self, path: &Path) -> Result<bool>;
}

/// Interactive yes/no on stdin, defaulting to yes.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

impl OverwritePrompt for StdinPrompt {
    fn confirm_overwrite(&self, path: &Path) -> Result<bool> {
        print!(
            "A DMG already exists at the path ({}), do you want to overwrite it? [Y/n] ",
            path.display()
        );
        io::stdout().flush().with_path("Failed to write prompt", path)?;

        read_overwrite_answer(io::stdin().lock()).with_path("Failed to read answer", path)
    }
}

/// Read one answer line from `reader`.
///
/// An empty line takes the default (yes). End of input is not an answer and
/// declines, so a closed or redirected stdin never replaces an image.
pub fn read_overwrite_answer(mut reader: impl BufRead) -> io::Result<bool> {
    let mut answer = String::new();
    if reader.read_line(&mut answer)? == 0 {
        warn!("no answer on stdin, keeping the existing image");
        return Ok(false);
    }
    Ok(parse_yes_no(&answer, true))
}

/// Fixed answer, for non-interactive use.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl OverwritePrompt for FixedAnswer {
    fn confirm_overwrite(&self, _path: &Path) -> Result<bool> {
        Ok(self.0)
    }
}

fn parse_yes_no(answer: &str, default: bool) -> bool {
    match answer.trim().to_ascii_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    }
}

/// Path of the install image inside `bundle`, if present.
pub fn locate_install_image(bundle: &Path) -> Result<PathBuf> {
    let path = bundle.join(INSTALL_IMAGE_PATH);
    if !path.is_file() {
        return Err(ReplicaError::not_found("install image", path));
    }
    Ok(path)
}

/// Mutable state of one pipeline invocation.
#[derive(Debug)]
pub struct PipelineRun {
    pub temp_dir: PathBuf,
    pub mounts: MountStack,
    pub built_package: Option<PathBuf>,
    pub output_image: Option<PathBuf>,
    pub finished_successfully: bool,
}

impl PipelineRun {
    /// Create a fresh run with its own temp directory under `tmp_root`.
    pub fn create(tmp_root: &Path) -> Result<Self> {
        let temp_dir = create_run_dir(tmp_root, RUN_DIR_PREFIX)?;
        info!(temp_dir = %temp_dir.display(), "created run directory");
        Ok(Self {
            temp_dir,
            mounts: MountStack::new(),
            built_package: None,
            output_image: None,
            finished_successfully: false,
        })
    }

    pub fn mount_point(&self, name: &str) -> PathBuf {
        self.temp_dir.join("mnt").join(name)
    }

    /// Release all mounts, then purge or keep the temp directory.
    ///
    /// A volume that failed to detach may still be mounted below the temp
    /// directory, so the directory is kept whenever a release failed.
    pub fn finish(&mut self, runner: &dyn ToolRunner, result: Result<PathBuf>) -> Result<PathBuf> {
        self.mounts.unwind(runner);

        match result {
            Ok(output) => {
                self.finished_successfully = true;
                self.purge_temp_dir();
                Ok(output)
            }
            // Nothing was produced, so there is nothing to inspect
            Err(e @ ReplicaError::OverwriteDeclined { .. }) => {
                self.purge_temp_dir();
                Err(e)
            }
            Err(e) => {
                warn!(temp_dir = %self.temp_dir.display(), "run failed, keeping temporary files");
                self.print_cleanup_hint();
                Err(e)
            }
        }
    }

    fn purge_temp_dir(&self) {
        if self.mounts.any_release_failed() {
            warn!(
                temp_dir = %self.temp_dir.display(),
                "a volume could not be detached, keeping temporary files"
            );
            self.print_cleanup_hint();
            return;
        }
        cleanup_work_dir(&self.temp_dir);
    }

    fn print_cleanup_hint(&self) {
        println!();
        println!("If you want to clean up the temporary files created by replica,");
        println!(" just delete the directory: {}", self.temp_dir.display());
    }
}

pub struct DmgPipeline<'a> {
    config: &'a Config,
    runner: &'a dyn ToolRunner,
    prompt: &'a dyn OverwritePrompt,
    templates: Templates,
    assets: Assets,
}

impl<'a> DmgPipeline<'a> {
    pub fn new(
        config: &'a Config,
        runner: &'a dyn ToolRunner,
        prompt: &'a dyn OverwritePrompt,
    ) -> Result<Self> {
        let templates = match &config.templates_dir {
            Some(dir) => Templates::with_overrides(dir)?,
            None => Templates::builtin(),
        };
        Ok(Self {
            config,
            runner,
            prompt,
            templates,
            assets: Assets::new(&config.assets_dir),
        })
    }

    /// Build the unattended-install image from `installer_bundle`.
    ///
    /// Returns the path of the final image.
    pub fn run(&self, installer_bundle: &Path) -> Result<PathBuf> {
        let install_image = locate_install_image(installer_bundle)?;

        let out_dir = &self.config.out_dir;
        fs::create_dir_all(out_dir).with_path("Failed to create output directory", out_dir)?;

        let mut run = PipelineRun::create(&self.config.tmp_root)?;
        let result = self.run_stages(&mut run, &install_image);
        run.finish(self.runner, result)
    }

    fn run_stages(&self, run: &mut PipelineRun, install_image: &Path) -> Result<PathBuf> {
        println!();
        println!(" => Attaching input installer image with shadow file..");
        let esd = run.mounts.acquire(
            self.runner,
            install_image,
            &run.mount_point("esd"),
            &MountOptions::with_shadow(run.temp_dir.join("esd-shadow")),
        )?;
        let install_root = run.mounts.get(esd).effective_mount_point().to_path_buf();

        println!();
        println!(" => Mounting the base system..");
        let rescue_image = install_root.join(RESCUE_IMAGE_NAME);
        if !rescue_image.is_file() {
            return Err(ReplicaError::not_found("rescue image", rescue_image));
        }
        let version = self.probe_rescue_image(run, &rescue_image)?;
        println!(
            "OS X version detected: {}, build {}",
            version.version, version.build
        );

        let output = version.output_path(&self.config.out_dir);
        info!(output = %output.display(), "output image path");
        self.resolve_existing_output(&output)?;

        println!();
        println!(" => Making firstboot installer pkg..");
        let timer = Timer::start("firstboot package");
        let account = AccountDescriptor::from_assets(self.config.account.clone(), &self.assets)?;
        let package = FirstbootPackageBuilder::new(self.runner, &self.templates, &self.config.package)
            .build(&account, &self.config.policy, &run.temp_dir.join("pkginst"))?;
        timer.finish();
        run.built_package = Some(package.clone());

        let job = PatchJob {
            install_mount: install_root,
            rescue_image,
            package,
            rw_image: run.temp_dir.join("osx-basesystem-rw.dmg"),
            rw_mount_point: run.mount_point("dmg-basesystem-rw"),
            output: output.clone(),
        };
        let timer = Timer::start("base system patch");
        BaseSystemPatcher::new(
            self.runner,
            &self.templates,
            &self.config.image_size,
            &self.config.rescue_volume,
        )
        .patch(&mut run.mounts, &job)?;
        timer.finish();
        run.output_image = Some(output.clone());

        run.mounts.release(esd, self.runner);
        Ok(output)
    }

    /// Mount the rescue image just long enough to read its version.
    fn probe_rescue_image(&self, run: &mut PipelineRun, rescue_image: &Path) -> Result<OsVersionInfo> {
        let base = run.mounts.acquire(
            self.runner,
            rescue_image,
            &run.mount_point("basesystem"),
            &MountOptions::read_only(),
        )?;
        let version = probe::probe(run.mounts.get(base).effective_mount_point());
        run.mounts.release(base, self.runner);
        version
    }

    fn resolve_existing_output(&self, output: &Path) -> Result<()> {
        if !output.exists() {
            return Ok(());
        }
        if !self.prompt.confirm_overwrite(output)? {
            return Err(ReplicaError::OverwriteDeclined {
                path: output.to_path_buf(),
            });
        }
        fs::remove_file(output).with_path("Failed to delete existing DMG", output)
    }
}
