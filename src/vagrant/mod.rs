//! Virtual machine glue around the installer image.
//!
//! - `packer` - turns the unattended-install image into a box artifact
//! - `provision` - registers the box, boots a VM, snapshots it, syncs a directory in

pub mod packer;
pub mod provision;

pub use packer::{build_box, VagrantBoxArtifact};
pub use provision::{Provisioner, SyncSpec, VmInstance};
