//! Replica library exports.
//!
//! The binary in `main.rs` is a thin clap layer over these modules; the
//! integration tests under `tests/` drive them with a scripted tool runner.

pub mod assets;
pub mod commands;
pub mod common;
pub mod config;
pub mod disk;
pub mod error;
pub mod firstboot;
pub mod mount;
pub mod patcher;
pub mod pipeline;
pub mod preflight;
pub mod probe;
pub mod process;
pub mod template;
pub mod timing;
pub mod vagrant;
