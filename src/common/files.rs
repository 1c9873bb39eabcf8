//! File writing helpers that create parent directories and set modes.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::{IoContext, Result};

/// Write a file, creating parent directories as needed.
pub fn write_file_with_dirs<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, content: C) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_path("Failed to create directory", parent)?;
    }
    fs::write(path, content).with_path("Failed to write file", path)
}

/// Write a file and set its Unix mode (0o755 for the scripts we inject).
pub fn write_file_mode<P: AsRef<Path>, C: AsRef<[u8]>>(
    path: P,
    content: C,
    mode: u32,
) -> Result<()> {
    let path = path.as_ref();
    write_file_with_dirs(path, content)?;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_path("Failed to set permissions", path)
}

/// Copy `src` into the directory `dest_dir`, keeping its file name.
pub fn copy_into_dir(src: &Path, dest_dir: &Path) -> Result<u64> {
    let name = src.file_name().unwrap_or(src.as_os_str());
    let dest = dest_dir.join(name);
    fs::copy(src, &dest).with_path("Failed to copy file", &dest)
}

/// Remove a file, symlink or directory tree at `path`.
///
/// Symlinks are removed themselves, never followed.
pub fn remove_path(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path).with_path("Failed to inspect", path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path).with_path("Failed to remove directory", path)
    } else {
        fs::remove_file(path).with_path("Failed to remove file", path)
    }
}
