//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `create` - installer app to box, end to end
//! - `dmg` - build the unattended-install image
//! - `box_cmd` - build a vagrant box from that image
//! - `vagrant` - boot and snapshot a VM from the box
//! - `sysinfo` - print host tool versions
//! - `version` - print the replica version
//! - `preflight` - run preflight checks
//! - `show` - display configuration

pub mod box_cmd;
pub mod create;
pub mod dmg;
mod preflight;
pub mod show;
pub mod sysinfo;
pub mod vagrant;
pub mod version;

pub use box_cmd::cmd_box;
pub use create::cmd_create;
pub use dmg::cmd_dmg;
pub use preflight::cmd_preflight;
pub use show::cmd_show_config;
pub use sysinfo::cmd_sysinfo;
pub use vagrant::cmd_vagrant;
pub use version::cmd_version;
