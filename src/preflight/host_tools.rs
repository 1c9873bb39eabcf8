//! Host tool availability checks.

use crate::process;

use super::types::CheckResult;

/// Tools the DMG pipeline cannot run without.
pub const IMAGE_TOOLS: [(&str, &str); 5] = [
    ("hdiutil", "Required to attach, create and convert disk images"),
    ("asr", "Required to restore the base system"),
    ("pkgbuild", "Required to build the firstboot package"),
    ("productbuild", "Required to build the firstboot package"),
    ("sudo", "Required to move the installer packages"),
];

/// Tools only the box and VM stages use.
pub const VM_TOOLS: [(&str, &str); 4] = [
    ("packer", "Required for `replica box`"),
    ("vagrant", "Required for `replica vagrant`"),
    ("rsync", "Required for `replica vagrant --sync-dir`"),
    ("VBoxManage", "Required by the VirtualBox provider"),
];

/// Check host tools are installed.
pub fn check_host_tools() -> Vec<CheckResult> {
    let image = IMAGE_TOOLS
        .iter()
        .map(|(tool, purpose)| check_tool(tool, purpose, true));
    let vm = VM_TOOLS
        .iter()
        .map(|(tool, purpose)| check_tool(tool, purpose, false));
    image.chain(vm).collect()
}

/// Check if a tool exists in PATH.
///
/// Missing required tools fail; missing optional tools only warn.
pub fn check_tool(tool: &str, purpose: &str, required: bool) -> CheckResult {
    match process::which(tool) {
        Some(path) => CheckResult::pass_with(tool, &path.display().to_string()),
        None => {
            let msg = format!("Not found in PATH. {}", purpose);
            if required {
                CheckResult::fail(tool, &msg)
            } else {
                CheckResult::warn(tool, &msg)
            }
        }
    }
}
