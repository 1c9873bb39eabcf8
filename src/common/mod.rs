//! Shared filesystem utilities.

pub mod files;
pub mod temp;

pub use files::{copy_into_dir, remove_path, write_file_mode, write_file_with_dirs};
pub use temp::{cleanup_work_dir, create_run_dir};
