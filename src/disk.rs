//! Free disk space reporting and output checksums.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use sysinfo::Disks;
use tracing::warn;

use crate::error::{IoContext, Result};

const GIB: u64 = 1024 * 1024 * 1024;

/// Available space, in whole GB, on the disk holding `path`.
///
/// `None` when no mounted disk contains the path.
pub fn free_space_gb(path: &Path) -> Option<u64> {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let disks = Disks::new_with_refreshed_list();
    let mounts: Vec<(PathBuf, u64)> = disks
        .list()
        .iter()
        .map(|d| (d.mount_point().to_path_buf(), d.available_space()))
        .collect();
    containing_disk(&path, &mounts).map(|bytes| bytes / GIB)
}

/// Longest mount point that is a prefix of `path`.
fn containing_disk(path: &Path, mounts: &[(PathBuf, u64)]) -> Option<u64> {
    mounts
        .iter()
        .filter(|(mount, _)| path.starts_with(mount))
        .max_by_key(|(mount, _)| mount.components().count())
        .map(|(_, available)| *available)
}

/// Print the free space around `path`, as the heavy stages do before and after.
pub fn print_free_disk_space(path: &Path) {
    match free_space_gb(path) {
        Some(gb) => println!("Free disk space: {} GB", gb),
        None => warn!(path = %path.display(), "could not determine free disk space"),
    }
}

/// Hex SHA-256 of a file, read in 1MB chunks.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path).with_path("Failed to open for checksum", path)?;
    let mut reader = BufReader::with_capacity(1024 * 1024, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1024 * 1024];

    loop {
        let read = reader
            .read(&mut buffer)
            .with_path("Failed to read for checksum", path)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
