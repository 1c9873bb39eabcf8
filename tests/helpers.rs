//! Shared test utilities for replica tests.
//!
//! `FakeRunner` stands in for hdiutil, asr, pkgbuild and friends. It records
//! every invocation and performs just enough of each tool's side effects for
//! the pipeline to make progress.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use replica::config::Config;
use replica::error::Result;
use replica::pipeline::{INSTALL_IMAGE_PATH, RUN_DIR_PREFIX};
use replica::process::{Cmd, ToolOutput, ToolRunner};
use tempfile::TempDir;

pub const TEST_VERSION: &str = "10.11";
pub const TEST_BUILD: &str = "15A284";
pub const ACCOUNT_IMAGE_BYTES: &[u8] = b"\xff\xd8\xff\xe0 not really a jpeg";
pub const PASSWORD_HASH_BYTES: &[u8] = b"SALTED-SHA512-PBKDF2 fake hash";

/// Test environment: config, assets and an installer app under one temp dir.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub base_dir: PathBuf,
    pub config: Config,
    /// Where the fake restore re-mounts the rescue volume
    pub rescue_volume: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_vars(&[])
    }

    /// Like `new`, with extra `REPLICA_*` variables.
    pub fn with_vars(extra: &[(&str, &str)]) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base_dir = temp_dir.path().to_path_buf();
        let rescue_volume = base_dir.join("Volumes/OS X Base System");

        let mut vars: HashMap<String, String> = [
            ("REPLICA_OUT_DIR", "_out"),
            ("REPLICA_ASSETS_DIR", "assets"),
            ("REPLICA_TMP_ROOT", "tmp"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        vars.insert(
            "REPLICA_RESCUE_VOLUME".to_string(),
            rescue_volume.display().to_string(),
        );
        for (k, v) in extra {
            vars.insert(k.to_string(), v.to_string());
        }

        let config = Config::from_vars(&base_dir, &vars).expect("Failed to build config");
        create_assets(&config.assets_dir);

        Self {
            _temp_dir: temp_dir,
            base_dir,
            config,
            rescue_volume,
        }
    }

    /// Create a synthetic "Install OS X" app and return its path.
    pub fn installer_app(&self) -> PathBuf {
        let app = self.base_dir.join("Install OS X El Capitan.app");
        let image = app.join(INSTALL_IMAGE_PATH);
        fs::create_dir_all(image.parent().unwrap()).expect("Failed to create installer app");
        fs::write(&image, b"esd").expect("Failed to create install image");
        app
    }

    pub fn runner(&self) -> FakeRunner {
        FakeRunner::new(&self.rescue_volume)
    }

    /// Path the pipeline writes for the test version.
    pub fn expected_output(&self) -> PathBuf {
        self.config
            .out_dir
            .join(format!("OSX_InstallESD_{}_{}.dmg", TEST_VERSION, TEST_BUILD))
    }

    /// Per-run temp directories currently present under the temp root.
    pub fn run_dirs(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.config.tmp_root) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().starts_with(RUN_DIR_PREFIX))
                    .unwrap_or(false)
            })
            .collect()
    }
}

/// Write the asset files the builders read.
pub fn create_assets(root: &Path) {
    fs::create_dir_all(root.join("packer")).expect("Failed to create assets dir");
    fs::write(root.join("vagrant.jpg"), ACCOUNT_IMAGE_BYTES).expect("Failed to write image");
    fs::write(root.join("usr-password-shadow"), PASSWORD_HASH_BYTES)
        .expect("Failed to write password hash");
    fs::write(root.join("packer/template.json"), "{\"builders\": []}\n")
        .expect("Failed to write packer template");
}

/// Minimal SystemVersion.plist.
pub fn system_version_plist(version: &str, build: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
         <plist version=\"1.0\">\n<dict>\n\
         \t<key>ProductBuildVersion</key>\n\t<string>{}</string>\n\
         \t<key>ProductName</key>\n\t<string>Mac OS X</string>\n\
         \t<key>ProductVersion</key>\n\t<string>{}</string>\n\
         </dict>\n</plist>\n",
        build, version
    )
}

/// Scripted stand-in for the host tools.
pub struct FakeRunner {
    calls: RefCell<Vec<Cmd>>,
    rescue_volume: PathBuf,
    /// Fail every invocation whose command line contains this text
    fail_on: Option<String>,
    /// Leave BaseSystem.dmg out of the install image
    omit_rescue_image: bool,
    /// Restore in place instead of re-mounting at the rescue volume
    restore_in_place: bool,
    version: (String, String),
}

impl FakeRunner {
    pub fn new(rescue_volume: &Path) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            rescue_volume: rescue_volume.to_path_buf(),
            fail_on: None,
            omit_rescue_image: false,
            restore_in_place: false,
            version: (TEST_VERSION.to_string(), TEST_BUILD.to_string()),
        }
    }

    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    pub fn without_rescue_image(mut self) -> Self {
        self.omit_rescue_image = true;
        self
    }

    pub fn restoring_in_place(mut self) -> Self {
        self.restore_in_place = true;
        self
    }

    pub fn calls(&self) -> Vec<Cmd> {
        self.calls.borrow().clone()
    }

    /// Every command line, as echoed to the operator.
    pub fn lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(Cmd::printable).collect()
    }

    /// Command lines starting with `prefix`.
    pub fn lines_starting(&self, prefix: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| l.starts_with(prefix))
            .collect()
    }

    /// Targets of every `hdiutil detach`, in call order.
    pub fn detach_targets(&self) -> Vec<PathBuf> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.program() == "hdiutil" && c.get_args().first().map(String::as_str) == Some("detach"))
            .filter_map(|c| c.get_args().last().map(PathBuf::from))
            .collect()
    }

    /// Mount points of every `hdiutil attach`, in call order.
    pub fn attach_points(&self) -> Vec<PathBuf> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.program() == "hdiutil" && c.get_args().first().map(String::as_str) == Some("attach"))
            .filter_map(|c| arg_after(c, "-mountpoint").map(PathBuf::from))
            .collect()
    }

    fn simulate(&self, cmd: &Cmd) -> std::io::Result<ToolOutput> {
        let args = cmd.get_args();
        let first = args.first().map(String::as_str).unwrap_or("");

        match (cmd.program(), first) {
            ("hdiutil", "attach") => {
                let source = PathBuf::from(&args[1]);
                let mount_point = PathBuf::from(arg_after(cmd, "-mountpoint").unwrap_or_default());
                match source.file_name().and_then(|n| n.to_str()) {
                    Some("InstallESD.dmg") => {
                        fs::create_dir_all(mount_point.join("Packages"))?;
                        fs::write(mount_point.join("Packages/OSInstall.mpkg"), b"mpkg")?;
                        if !self.omit_rescue_image {
                            fs::write(mount_point.join("BaseSystem.dmg"), b"basesystem")?;
                            fs::write(mount_point.join("BaseSystem.chunklist"), b"chunks")?;
                        }
                    }
                    Some("BaseSystem.dmg") => {
                        let plist = mount_point.join("System/Library/CoreServices/SystemVersion.plist");
                        fs::create_dir_all(plist.parent().unwrap())?;
                        fs::write(plist, system_version_plist(&self.version.0, &self.version.1))?;
                    }
                    _ => {}
                }
                Ok(ToolOutput::ok())
            }
            ("hdiutil", "create") => {
                if let Some(path) = arg_after(cmd, "-o") {
                    fs::write(path, b"blank")?;
                }
                Ok(ToolOutput::ok())
            }
            ("hdiutil", "convert") => {
                if let Some(path) = arg_after(cmd, "-o") {
                    fs::write(path, b"converted")?;
                }
                Ok(ToolOutput::ok())
            }
            ("asr", "restore") => {
                let volume = if self.restore_in_place {
                    PathBuf::from(arg_after(cmd, "--target").unwrap_or_default())
                } else {
                    self.rescue_volume.clone()
                };
                fs::create_dir_all(volume.join("System/Installation/Packages"))?;
                fs::write(volume.join("System/Installation/Packages/Stale.pkg"), b"stale")?;
                fs::create_dir_all(volume.join("private/etc"))?;
                Ok(ToolOutput::ok())
            }
            ("sudo", "mv") => {
                let source = PathBuf::from(&args[args.len() - 2]);
                let dest_dir = PathBuf::from(&args[args.len() - 1]);
                let name = source.file_name().unwrap_or_default();
                fs::rename(&source, dest_dir.join(name))?;
                Ok(ToolOutput::ok())
            }
            ("pkgbuild", _) | ("productbuild", _) => {
                if let Some(path) = args.last() {
                    fs::write(path, cmd.program().as_bytes())?;
                }
                Ok(ToolOutput::ok())
            }
            ("vagrant", "ssh-config") => Ok(ToolOutput::with_stdout(
                "Host default\n  HostName 127.0.0.1\n  User vagrant\n  Port 2222\n",
            )),
            _ => Ok(ToolOutput::ok()),
        }
    }
}

impl ToolRunner for FakeRunner {
    fn run_tool(&self, invocation: &Cmd) -> Result<ToolOutput> {
        self.calls.borrow_mut().push(invocation.clone());

        if let Some(needle) = &self.fail_on {
            if invocation.printable().contains(needle.as_str()) {
                let mut out = ToolOutput::with_status(1);
                out.stderr = "simulated failure".to_string();
                return Ok(out);
            }
        }

        let out = self
            .simulate(invocation)
            .unwrap_or_else(|e| panic!("fake {} failed: {}", invocation.printable(), e));
        Ok(out)
    }
}

/// The argument following `flag`, if any.
pub fn arg_after(cmd: &Cmd, flag: &str) -> Option<String> {
    let args = cmd.get_args();
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
