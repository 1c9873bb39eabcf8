//! External tool execution.
//!
//! Every stage of the pipeline talks to the host through [`ToolRunner`], so the
//! stages never depend on a concrete process mechanism. [`SystemRunner`] is the
//! real implementation; tests substitute a scripted fake.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{ReplicaError, Result};

/// Exit code reported when a process was terminated by a signal.
pub const SIGNALLED: i32 = -1;

/// Outcome of one external tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, or [`SIGNALLED`] if the process had none.
    pub status: i32,
    /// Captured stdout (empty when the tool streamed to the terminal).
    pub stdout: String,
    /// Captured stderr (empty when the tool streamed to the terminal).
    pub stderr: String,
}

impl ToolOutput {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_status(status: i32) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// Returns true if the tool exited with status 0.
    pub fn success(&self) -> bool {
        self.status == 0
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Capability to run an external tool and report its exit status.
///
/// A non-zero exit is not an `Err`: callers decide which error it maps to.
/// `Err` is reserved for tools that could not be started at all.
pub trait ToolRunner {
    fn run_tool(&self, invocation: &Cmd) -> Result<ToolOutput>;
}

impl<T: ToolRunner + ?Sized> ToolRunner for &T {
    fn run_tool(&self, invocation: &Cmd) -> Result<ToolOutput> {
        (**self).run_tool(invocation)
    }
}

/// Builder describing one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    /// Capture stdout/stderr instead of streaming them to the terminal.
    capture: bool,
}

impl Cmd {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            current_dir: None,
            capture: false,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set the working directory.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Capture output rather than streaming it.
    pub fn captured(mut self) -> Self {
        self.capture = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    pub fn is_captured(&self) -> bool {
        self.capture
    }

    /// The command line as it is echoed to the operator.
    pub fn printable(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }

    /// Run through `runner` and turn a non-zero exit into `ReplicaError::Tool`.
    pub fn run_checked(&self, runner: &dyn ToolRunner, step: &str) -> Result<ToolOutput> {
        let output = runner.run_tool(self)?;
        if !output.success() {
            return Err(ReplicaError::Tool {
                step: step.to_string(),
                tool: self.program.clone(),
                status: output.status,
                detail: output.stderr_trimmed().to_string(),
            });
        }
        Ok(output)
    }
}

/// Runs tools as child processes of this one.
///
/// Uncaptured invocations inherit the terminal so long-running operations
/// (block restores, packer builds) show their own progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run_tool(&self, invocation: &Cmd) -> Result<ToolOutput> {
        println!();
        println!("$ {}", invocation.printable());
        println!();

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        if let Some(ref dir) = invocation.current_dir {
            cmd.current_dir(dir);
        }

        let not_started = |e: std::io::Error| ReplicaError::Tool {
            step: "start".to_string(),
            tool: invocation.program.clone(),
            status: SIGNALLED,
            detail: format!("failed to execute '{}'. Is it installed? ({})", invocation.program, e),
        };

        let output = if invocation.capture {
            let out = cmd.output().map_err(not_started)?;
            ToolOutput {
                status: out.status.code().unwrap_or(SIGNALLED),
                stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            }
        } else {
            cmd.stdin(Stdio::inherit());
            cmd.stdout(Stdio::inherit());
            cmd.stderr(Stdio::inherit());
            let status = cmd.status().map_err(not_started)?;
            ToolOutput::with_status(status.code().unwrap_or(SIGNALLED))
        };

        debug!(tool = %invocation.program, status = output.status, "tool finished");
        Ok(output)
    }
}

/// Resolve a program in PATH.
pub fn which(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_success() {
        let out = SystemRunner
            .run_tool(&Cmd::new("echo").arg("hello").captured())
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout_trimmed(), "hello");
    }

    #[test]
    fn test_non_zero_exit_is_not_err() {
        let out = SystemRunner.run_tool(&Cmd::new("false").captured()).unwrap();
        assert!(!out.success());
        assert_eq!(out.status, 1);
    }

    #[test]
    fn test_run_checked_maps_failure() {
        let err = Cmd::new("false")
            .captured()
            .run_checked(&SystemRunner, "always fails")
            .unwrap_err();
        match err {
            ReplicaError::Tool { step, tool, status, .. } => {
                assert_eq!(step, "always fails");
                assert_eq!(tool, "false");
                assert_eq!(status, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_program_is_err() {
        let res = SystemRunner.run_tool(&Cmd::new("nonexistent_program_12345").captured());
        assert!(res.is_err());
    }

    #[test]
    fn test_run_in_directory() {
        let out = SystemRunner
            .run_tool(&Cmd::new("pwd").dir(Path::new("/tmp")).captured())
            .unwrap();
        assert!(out.stdout_trimmed().contains("tmp"));
    }

    #[test]
    fn test_printable_quotes_spaces() {
        let cmd = Cmd::new("hdiutil")
            .arg("detach")
            .arg("/Volumes/OS X Base System");
        assert_eq!(cmd.printable(), "hdiutil detach \"/Volumes/OS X Base System\"");
    }

    #[test]
    fn test_which() {
        assert!(which("sh").is_some());
        assert!(which("nonexistent_program_12345").is_none());
    }
}
