//! Firstboot installer package.
//!
//! Assembles a payload root holding the automation account record and its
//! password hash, plus a post-install script, then runs `pkgbuild` and
//! `productbuild` to produce a distributable package.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::assets::{Assets, ACCOUNT_IMAGE, PASSWORD_SHADOW};
use crate::common::{write_file_mode, write_file_with_dirs};
use crate::config::{AccountIdentity, PackageIdentity, PostinstallPolicy};
use crate::error::{IoContext, ReplicaError, Result};
use crate::process::{Cmd, ToolRunner, SIGNALLED};
use crate::template::{self, TemplateId, Templates};

/// Account records, relative to the payload root.
pub const USERS_DIR: &str = "private/var/db/dslocal/nodes/Default/users";
/// Password hashes, relative to the payload root.
pub const SHADOW_HASH_DIR: &str = "private/var/db/shadow/hash";

/// Everything needed to materialise the automation account.
#[derive(Debug, Clone)]
pub struct AccountDescriptor {
    pub identity: AccountIdentity,
    /// Account picture, embedded as base64 in the record.
    pub image_bytes: Vec<u8>,
    /// Pre-computed password hash blob, written verbatim.
    pub password_hash: Vec<u8>,
}

impl AccountDescriptor {
    /// Pull the picture and hash blob from the asset provider.
    pub fn from_assets(identity: AccountIdentity, assets: &Assets) -> Result<Self> {
        Ok(Self {
            identity,
            image_bytes: assets.bytes(ACCOUNT_IMAGE)?,
            password_hash: assets.bytes(PASSWORD_SHADOW)?,
        })
    }
}

/// Layout of a package build under its work directory.
#[derive(Debug, Clone)]
pub struct PackageLayout {
    pub pkg_root: PathBuf,
    pub scripts_dir: PathBuf,
    pub component_pkg: PathBuf,
    pub product_pkg: PathBuf,
}

impl PackageLayout {
    pub fn new(work_dir: &Path, package: &PackageIdentity) -> Self {
        Self {
            pkg_root: work_dir.join("pkgroot"),
            scripts_dir: work_dir.join("tmp/Scripts"),
            component_pkg: work_dir.join("config-component.pkg"),
            product_pkg: work_dir.join(&package.file_name),
        }
    }

    pub fn account_record(&self, account: &AccountIdentity) -> PathBuf {
        self.pkg_root
            .join(USERS_DIR)
            .join(format!("{}.plist", account.username))
    }

    pub fn password_hash(&self, account: &AccountIdentity) -> PathBuf {
        self.pkg_root.join(SHADOW_HASH_DIR).join(&account.generated_uid)
    }

    pub fn postinstall_script(&self) -> PathBuf {
        self.scripts_dir.join("postinstall")
    }
}

pub struct FirstbootPackageBuilder<'a> {
    runner: &'a dyn ToolRunner,
    templates: &'a Templates,
    package: &'a PackageIdentity,
}

impl<'a> FirstbootPackageBuilder<'a> {
    pub fn new(
        runner: &'a dyn ToolRunner,
        templates: &'a Templates,
        package: &'a PackageIdentity,
    ) -> Self {
        Self {
            runner,
            templates,
            package,
        }
    }

    /// Build the package under `work_dir` and return the distributable's path.
    ///
    /// Intermediate files are left in `work_dir` for the caller to clean up.
    pub fn build(
        &self,
        account: &AccountDescriptor,
        policy: &PostinstallPolicy,
        work_dir: &Path,
    ) -> Result<PathBuf> {
        let layout = PackageLayout::new(work_dir, self.package);
        let identity = &account.identity;

        for dir in [USERS_DIR, SHADOW_HASH_DIR] {
            let path = layout.pkg_root.join(dir);
            payload_step(
                "payload layout",
                fs::create_dir_all(&path).with_path("Failed to create package directory", &path),
            )?;
        }

        let image_base64 = template::encode_wrapped(&account.image_bytes);
        let record = payload_step(
            "account record",
            self.templates.render(
                TemplateId::UserPlist,
                &template::user_plist_params(identity, &image_base64),
            ),
        )?;
        payload_step(
            "account record",
            write_file_with_dirs(layout.account_record(identity), record),
        )?;
        info!(account = %identity.username, "account record written");

        payload_step(
            "password hash",
            write_file_with_dirs(layout.password_hash(identity), &account.password_hash),
        )?;

        let script = payload_step(
            "postinstall script",
            self.templates.render(
                TemplateId::Postinstall,
                &template::postinstall_params(identity, policy),
            ),
        )?;
        payload_step(
            "postinstall script",
            write_file_mode(layout.postinstall_script(), script, 0o755),
        )?;
        info!("post-install script written");

        println!(" ==> Building component package..");
        self.run_package_tool(
            Cmd::new("pkgbuild")
                .arg("--quiet")
                .arg("--root")
                .arg_path(&layout.pkg_root)
                .arg("--scripts")
                .arg_path(&layout.scripts_dir)
                .arg("--identifier")
                .arg(&self.package.identifier)
                .arg("--version")
                .arg(&self.package.version)
                .arg_path(&layout.component_pkg),
        )?;

        println!(" ==> Wrapping it into a product package..");
        self.run_package_tool(
            Cmd::new("productbuild")
                .arg("--package")
                .arg_path(&layout.component_pkg)
                .arg_path(&layout.product_pkg),
        )?;

        Ok(layout.product_pkg)
    }

    fn run_package_tool(&self, cmd: Cmd) -> Result<()> {
        let out = self.runner.run_tool(&cmd).map_err(|e| ReplicaError::PackageBuild {
            tool: cmd.program().to_string(),
            status: SIGNALLED,
            detail: e.to_string(),
        })?;
        if !out.success() {
            return Err(ReplicaError::PackageBuild {
                tool: cmd.program().to_string(),
                status: out.status,
                detail: out.stderr_trimmed().to_string(),
            });
        }
        Ok(())
    }
}

/// Tag a payload failure with the step it happened in.
fn payload_step<T>(name: &str, result: Result<T>) -> Result<T> {
    result.map_err(|e| ReplicaError::PackagePayload {
        step: name.to_string(),
        detail: e.to_string(),
    })
}
