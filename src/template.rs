//! Text templates for the account record, firstboot script and installer manifests.
//!
//! Templates use `{{ Name }}` placeholders. Built-in texts are compiled into the
//! binary; a directory of same-named files can override any of them.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::config::{AccountIdentity, PostinstallPolicy};
use crate::error::{IoContext, ReplicaError, Result};

/// Line width of base64 blocks embedded in property lists.
pub const BASE64_LINE_WIDTH: usize = 64;

/// Name of the volume the automated installer erases and installs onto.
pub const TARGET_VOLUME_NAME: &str = "Macintosh HD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemplateId {
    /// Directory-services account record.
    UserPlist,
    /// Firstboot post-install script.
    Postinstall,
    /// Automated install configuration.
    InstallConfig,
    /// Ordered package collection.
    PackageCollection,
    /// Startup hook that erases the target disk.
    CdromLocal,
    /// VM definition file.
    Vagrantfile,
}

impl TemplateId {
    pub const ALL: [TemplateId; 6] = [
        TemplateId::UserPlist,
        TemplateId::Postinstall,
        TemplateId::InstallConfig,
        TemplateId::PackageCollection,
        TemplateId::CdromLocal,
        TemplateId::Vagrantfile,
    ];

    /// File name of the template, both built-in and in an override directory.
    pub fn file_name(self) -> &'static str {
        match self {
            TemplateId::UserPlist => "user.plist",
            TemplateId::Postinstall => "postinstall",
            TemplateId::InstallConfig => "minstallconfig.xml",
            TemplateId::PackageCollection => "OSInstall.collection",
            TemplateId::CdromLocal => "rc.cdrom.local",
            TemplateId::Vagrantfile => "Vagrantfile",
        }
    }

    fn builtin(self) -> &'static str {
        match self {
            TemplateId::UserPlist => include_str!("templates/user.plist"),
            TemplateId::Postinstall => include_str!("templates/postinstall"),
            TemplateId::InstallConfig => include_str!("templates/minstallconfig.xml"),
            TemplateId::PackageCollection => include_str!("templates/OSInstall.collection"),
            TemplateId::CdromLocal => include_str!("templates/rc.cdrom.local"),
            TemplateId::Vagrantfile => include_str!("templates/Vagrantfile"),
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Placeholder values for one render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateParams {
    values: BTreeMap<String, String>,
}

impl TemplateParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// Flags reach the shell script as `0`/`1` tokens.
    pub fn flag(self, key: &str, value: bool) -> Self {
        self.set(key, if value { "1" } else { "0" })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// The set of template texts available to a run.
#[derive(Debug, Clone)]
pub struct Templates {
    texts: HashMap<TemplateId, String>,
}

impl Default for Templates {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Templates {
    /// Built-in texts only.
    pub fn builtin() -> Self {
        let texts = TemplateId::ALL
            .iter()
            .map(|id| (*id, id.builtin().to_string()))
            .collect();
        Self { texts }
    }

    /// No texts at all; every render fails until one is inserted.
    pub fn empty() -> Self {
        Self {
            texts: HashMap::new(),
        }
    }

    /// Built-in texts, replaced by any same-named file in `dir`.
    pub fn with_overrides(dir: &Path) -> Result<Self> {
        let mut templates = Self::builtin();
        for id in TemplateId::ALL {
            let path = dir.join(id.file_name());
            if path.is_file() {
                let text = fs::read_to_string(&path).with_path("Failed to read template", &path)?;
                templates.insert(id, text);
            }
        }
        Ok(templates)
    }

    pub fn insert(&mut self, id: TemplateId, text: impl Into<String>) {
        self.texts.insert(id, text.into());
    }

    /// Fill `id` with `params`. Unknown placeholders are left as they are.
    pub fn render(&self, id: TemplateId, params: &TemplateParams) -> Result<String> {
        let text = self.texts.get(&id).ok_or_else(|| ReplicaError::Template {
            id: id.file_name().to_string(),
        })?;
        Ok(substitute(text, params))
    }
}

fn substitute(text: &str, params: &TemplateParams) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match params.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Break a base64 string into lines of at most `width` characters.
pub fn wrap_base64(encoded: &str, width: usize) -> String {
    let width = width.max(1);
    let bytes = encoded.as_bytes();
    let mut out = String::with_capacity(encoded.len() + encoded.len() / width);
    for (i, chunk) in bytes.chunks(width).enumerate() {
        if i > 0 {
            out.push('\n');
        }
        // base64 output is ASCII, so chunking bytes never splits a character
        out.push_str(&String::from_utf8_lossy(chunk));
    }
    out
}

/// Standard base64 of `data`, wrapped at [`BASE64_LINE_WIDTH`].
pub fn encode_wrapped(data: &[u8]) -> String {
    wrap_base64(&STANDARD.encode(data), BASE64_LINE_WIDTH)
}

/// Parameters for [`TemplateId::UserPlist`].
pub fn user_plist_params(account: &AccountIdentity, image_base64: &str) -> TemplateParams {
    TemplateParams::new()
        .set("AccountUsername", account.username.as_str())
        .set("AccountGeneratedUID", account.generated_uid.as_str())
        .set("AccountUID", account.uid.to_string())
        .set("AccountGID", account.gid.to_string())
        .set("AccountShell", account.shell.as_str())
        .set("AccountImageBase64", image_base64)
}

/// Parameters for [`TemplateId::Postinstall`].
pub fn postinstall_params(account: &AccountIdentity, policy: &PostinstallPolicy) -> TemplateParams {
    TemplateParams::new()
        .set("AccountUsername", account.username.as_str())
        .set("AccountGID", account.gid.to_string())
        .flag("DisableRemoteManagement", policy.disable_remote_management)
        .flag("DisableScreenSharing", policy.disable_screen_sharing)
        .flag("DisableSIP", policy.disable_sip)
}

/// Parameters shared by the installer manifests and the startup hook.
pub fn installer_params(firstboot_package: &str) -> TemplateParams {
    TemplateParams::new()
        .set("TargetVolumeName", TARGET_VOLUME_NAME)
        .set("FirstbootPackage", firstboot_package)
}
