//! Sysinfo command - prints host tool versions.

use anyhow::{Context, Result};
use std::path::Path;

use crate::disk;
use crate::process::{Cmd, ToolRunner};

/// Label, program and arguments of each version probe.
const PROBES: [(&str, &str, &[&str]); 5] = [
    ("VirtualBox version", "vboxmanage", &["--version"]),
    ("vagrant version", "vagrant", &["--version"]),
    ("packer version", "packer", &["version"]),
    ("Host macOS version", "sw_vers", &[]),
    ("Mac hardware version", "sysctl", &["hw.model"]),
];

/// Run every version probe, stopping at the first missing or failing tool.
pub fn tool_versions(runner: &dyn ToolRunner) -> Result<Vec<(&'static str, String)>> {
    let mut versions = Vec::new();
    for (label, program, args) in PROBES {
        let out = Cmd::new(program)
            .args(args.iter())
            .captured()
            .run_checked(runner, "sysinfo")
            .with_context(|| format!("Failed to get {}", label))?;
        let text = if out.stdout_trimmed().is_empty() {
            out.stderr_trimmed()
        } else {
            out.stdout_trimmed()
        };
        versions.push((label, text.to_string()));
    }
    Ok(versions)
}

/// Execute `replica sysinfo`.
pub fn cmd_sysinfo(runner: &dyn ToolRunner, work_dir: &Path) -> Result<()> {
    let versions = tool_versions(runner)?;

    println!();
    println!("---------- TOOL VERSIONS: ----------");
    for (label, text) in versions {
        println!();
        println!("* {}:", label);
        println!("{}", text);
    }
    println!();
    disk::print_free_disk_space(work_dir);
    println!("------------------------------------");
    println!();
    Ok(())
}
