//! Asset and workspace checks (assets, output directory, disk space).

use std::fs;
use std::path::Path;

use crate::assets::{ACCOUNT_IMAGE, PACKER_DIR, PACKER_TEMPLATE, PASSWORD_SHADOW};
use crate::config::Config;
use crate::disk;
use crate::template::Templates;

use super::types::CheckResult;

/// Check the asset provider holds everything the builders read.
pub fn check_assets(config: &Config) -> Vec<CheckResult> {
    let root = &config.assets_dir;
    let mut results = Vec::new();

    for name in [ACCOUNT_IMAGE, PASSWORD_SHADOW] {
        let path = root.join(name);
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {
                results.push(CheckResult::pass_with(name, &format!("{} bytes", meta.len())));
            }
            Ok(meta) if meta.is_file() => {
                results.push(CheckResult::fail(name, "File is empty"));
            }
            _ => results.push(CheckResult::fail(
                name,
                &format!("Not found at {}", path.display()),
            )),
        }
    }

    let template = root.join(PACKER_DIR).join(PACKER_TEMPLATE);
    if template.is_file() {
        results.push(CheckResult::pass("packer template"));
    } else {
        results.push(CheckResult::warn(
            "packer template",
            &format!("Not found at {} - `replica box` will fail", template.display()),
        ));
    }

    if let Some(dir) = &config.templates_dir {
        match Templates::with_overrides(dir) {
            Ok(_) => results.push(CheckResult::pass_with("template overrides", &dir.display().to_string())),
            Err(e) => results.push(CheckResult::fail("template overrides", &e.to_string())),
        }
    }

    results
}

/// Check the output directory is writable and there is room to build.
pub fn check_workspace(config: &Config) -> Vec<CheckResult> {
    let mut results = vec![check_writable("output directory", &config.out_dir)];
    results.push(check_writable("temp root", &config.tmp_root));

    match disk::free_space_gb(&config.out_dir) {
        Some(free_gb) => results.push(check_free_space(free_gb, config.min_free_gb)),
        None => results.push(CheckResult::warn("disk space", "Could not determine free space")),
    }

    results
}

fn check_writable(name: &str, dir: &Path) -> CheckResult {
    if let Err(e) = fs::create_dir_all(dir) {
        return CheckResult::fail(name, &format!("Cannot create {}: {}", dir.display(), e));
    }

    let probe = dir.join(".preflight-test");
    match fs::write(&probe, "test") {
        Ok(_) => {
            let _ = fs::remove_file(&probe);
            CheckResult::pass_with(name, &dir.display().to_string())
        }
        Err(e) => CheckResult::fail(name, &format!("Cannot write to {}: {}", dir.display(), e)),
    }
}

/// Images are several GB each, so running short is a hard failure.
pub fn check_free_space(free_gb: u64, min_free_gb: u64) -> CheckResult {
    if free_gb < min_free_gb {
        CheckResult::fail(
            "disk space",
            &format!("{}GB free - need at least {}GB", free_gb, min_free_gb),
        )
    } else {
        CheckResult::pass_with("disk space", &format!("{}GB free", free_gb))
    }
}
