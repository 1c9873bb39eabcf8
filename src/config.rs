//! Configuration management for replica.
//!
//! Reads configuration from the process environment. `main` loads an optional
//! `.env` first via `dotenvy`, so real environment variables take precedence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{ReplicaError, Result};

/// Default re-mount point of the rescue volume after a block restore.
pub const DEFAULT_RESCUE_VOLUME: &str = "/Volumes/OS X Base System";

/// Identity of the automation account baked into the firstboot package.
///
/// The post-install script reads the UID/GID back out of the account record,
/// so these must agree with what the templates render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountIdentity {
    pub username: String,
    pub generated_uid: String,
    pub uid: u32,
    pub gid: u32,
    pub shell: String,
}

impl Default for AccountIdentity {
    fn default() -> Self {
        Self {
            username: "vagrant".to_string(),
            generated_uid: "11112222-3333-4444-AAAA-BBBBCCCCDDDD".to_string(),
            uid: 501,
            gid: 20,
            shell: "/bin/bash".to_string(),
        }
    }
}

/// Identifier and version stamped into the firstboot package manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageIdentity {
    pub identifier: String,
    pub version: String,
    /// File name of the distributable package; also listed in the collection manifest.
    pub file_name: String,
}

impl Default for PackageIdentity {
    fn default() -> Self {
        Self {
            identifier: "com.vagrantup.config".to_string(),
            version: "0.1".to_string(),
            file_name: "config.pkg".to_string(),
        }
    }
}

/// Which OS defaults the firstboot script flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostinstallPolicy {
    pub disable_remote_management: bool,
    pub disable_screen_sharing: bool,
    pub disable_sip: bool,
}

impl Default for PostinstallPolicy {
    fn default() -> Self {
        Self {
            disable_remote_management: true,
            disable_screen_sharing: true,
            disable_sip: false,
        }
    }
}

/// Replica configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where the final image and the packer workdir go (default: ./_out)
    pub out_dir: PathBuf,
    /// Asset provider root (default: ./assets)
    pub assets_dir: PathBuf,
    /// Optional directory of template overrides
    pub templates_dir: Option<PathBuf>,
    /// Parent of the per-run temporary directories
    pub tmp_root: PathBuf,
    /// Size handed to `hdiutil create` for the blank read-write container
    pub image_size: String,
    /// Where the rescue volume re-appears after `asr restore`
    pub rescue_volume: PathBuf,
    pub account: AccountIdentity,
    pub package: PackageIdentity,
    pub policy: PostinstallPolicy,
    pub box_name: String,
    pub snapshot_id: String,
    /// Box artifact path, relative to `out_dir`
    pub box_file: PathBuf,
    /// Preflight free-space threshold in GB
    pub min_free_gb: u64,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load(base_dir: &Path) -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(base_dir, &vars)
    }

    /// Build configuration from an explicit variable map.
    ///
    /// Relative paths are resolved against `base_dir`.
    pub fn from_vars(base_dir: &Path, vars: &HashMap<String, String>) -> Result<Self> {
        let path_var = |key: &str, default: &str| {
            let path = PathBuf::from(vars.get(key).map(String::as_str).unwrap_or(default));
            if path.is_absolute() {
                path
            } else {
                base_dir.join(path)
            }
        };
        let string_var = |key: &str, default: &str| {
            vars.get(key)
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };
        let bool_var = |key: &str, default: bool| -> Result<bool> {
            match vars.get(key) {
                None => Ok(default),
                Some(v) => parse_bool(v).ok_or_else(|| ReplicaError::Config {
                    key: key.to_string(),
                    reason: format!("expected a boolean, got '{}'", v),
                }),
            }
        };

        let templates_dir = vars.get("REPLICA_TEMPLATES_DIR").map(|_| {
            path_var("REPLICA_TEMPLATES_DIR", "")
        });

        let tmp_root = match vars.get("REPLICA_TMP_ROOT") {
            Some(_) => path_var("REPLICA_TMP_ROOT", ""),
            None => std::env::temp_dir(),
        };

        let min_free_gb = match vars.get("REPLICA_MIN_FREE_GB") {
            None => 20,
            Some(v) => v.trim().parse().map_err(|_| ReplicaError::Config {
                key: "REPLICA_MIN_FREE_GB".to_string(),
                reason: format!("expected a whole number of GB, got '{}'", v),
            })?,
        };

        let username = string_var("REPLICA_ACCOUNT_NAME", "vagrant");
        if username.is_empty() || username.contains(|c: char| c == '/' || c.is_whitespace()) {
            return Err(ReplicaError::Config {
                key: "REPLICA_ACCOUNT_NAME".to_string(),
                reason: format!("'{}' is not a valid short account name", username),
            });
        }

        Ok(Self {
            out_dir: path_var("REPLICA_OUT_DIR", "_out"),
            assets_dir: path_var("REPLICA_ASSETS_DIR", "assets"),
            templates_dir,
            tmp_root,
            image_size: string_var("REPLICA_IMAGE_SIZE", "10g"),
            rescue_volume: path_var("REPLICA_RESCUE_VOLUME", DEFAULT_RESCUE_VOLUME),
            account: AccountIdentity {
                username,
                ..AccountIdentity::default()
            },
            package: PackageIdentity::default(),
            policy: PostinstallPolicy {
                disable_remote_management: bool_var("REPLICA_DISABLE_REMOTE_MANAGEMENT", true)?,
                disable_screen_sharing: bool_var("REPLICA_DISABLE_SCREEN_SHARING", true)?,
                disable_sip: bool_var("REPLICA_DISABLE_SIP", false)?,
            },
            box_name: string_var("REPLICA_BOX_NAME", "bitrise-replica-macos"),
            snapshot_id: string_var("REPLICA_SNAPSHOT_ID", "bitrise-replica-initial"),
            box_file: PathBuf::from(string_var("REPLICA_BOX_FILE", "packer/macos_virtualbox.box")),
            min_free_gb,
        })
    }

    /// Absolute path of the box artifact produced by packer.
    pub fn box_path(&self) -> PathBuf {
        self.out_dir.join(&self.box_file)
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  REPLICA_OUT_DIR: {}", self.out_dir.display());
        println!("  REPLICA_ASSETS_DIR: {}", self.assets_dir.display());
        match &self.templates_dir {
            Some(dir) => println!("  REPLICA_TEMPLATES_DIR: {}", dir.display()),
            None => println!("  REPLICA_TEMPLATES_DIR: (built-in templates)"),
        }
        println!("  REPLICA_TMP_ROOT: {}", self.tmp_root.display());
        println!("  REPLICA_IMAGE_SIZE: {}", self.image_size);
        println!("  REPLICA_RESCUE_VOLUME: {}", self.rescue_volume.display());
        println!("  REPLICA_ACCOUNT_NAME: {}", self.account.username);
        println!(
            "  REPLICA_DISABLE_REMOTE_MANAGEMENT: {}",
            self.policy.disable_remote_management
        );
        println!(
            "  REPLICA_DISABLE_SCREEN_SHARING: {}",
            self.policy.disable_screen_sharing
        );
        println!("  REPLICA_DISABLE_SIP: {}", self.policy.disable_sip);
        println!("  REPLICA_BOX_NAME: {}", self.box_name);
        println!("  REPLICA_SNAPSHOT_ID: {}", self.snapshot_id);
        println!("  REPLICA_BOX_FILE: {}", self.box_file.display());
        println!("  REPLICA_MIN_FREE_GB: {}", self.min_free_gb);
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
