//! Preflight checks for replica.
//!
//! Verifies host tools, assets and disk space before a long image build.
//! Run with `replica preflight` to check everything is ready.

mod environment;
mod host_tools;
mod types;

use anyhow::{bail, Result};

use crate::config::Config;

pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Run all preflight checks.
pub fn run_preflight(config: &Config) -> PreflightReport {
    let mut checks = Vec::new();

    println!("Running preflight checks...\n");

    // =======================================================================
    // Host Tools
    // =======================================================================
    println!("Checking host tools...");
    checks.extend(host_tools::check_host_tools());

    // =======================================================================
    // Assets and Workspace
    // =======================================================================
    println!("Checking assets and workspace...");
    checks.extend(environment::check_assets(config));
    checks.extend(environment::check_workspace(config));

    println!();

    PreflightReport { checks }
}

/// Run preflight and bail if any checks fail.
pub fn run_preflight_or_fail(config: &Config) -> Result<()> {
    let report = run_preflight(config);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed: {} check(s) failed. Fix the issues above before building.",
            report.fail_count()
        );
    }

    println!("All preflight checks passed!\n");
    Ok(())
}
