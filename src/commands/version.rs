//! Version command.

/// Crate version as reported by `replica version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lines printed by `replica version [--full]`.
pub fn version_lines(full: bool) -> Vec<String> {
    let mut lines = vec![VERSION.to_string()];
    if full {
        lines.push(String::new());
        lines.push(format!("arch: {}", std::env::consts::ARCH));
        lines.push(format!("os: {}", std::env::consts::OS));
    }
    lines
}

pub fn cmd_version(full: bool) {
    for line in version_lines(full) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_version() {
        assert_eq!(version_lines(false), vec![VERSION.to_string()]);
    }

    #[test]
    fn test_full_version_has_target() {
        let lines = version_lines(true);
        assert!(lines.iter().any(|l| l.starts_with("arch: ")));
        assert!(lines.iter().any(|l| l.starts_with("os: ")));
    }
}
