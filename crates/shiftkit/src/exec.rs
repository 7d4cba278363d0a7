//! External command execution.
//!
//! Every interaction with `pulumi` and `aws` goes through [`Runner`]. A run
//! never returns an error: spawn failures and non-zero exits are folded into
//! [`ExecResult::success`] so callers branch on the result instead of
//! unwinding.

use crate::report::{NoReport, Reporter};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr, or the spawn error message
    pub stderr: String,
    /// Whether the command ran and exited 0
    pub success: bool,
}

impl ExecResult {
    /// Successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
        }
    }

    /// Failed result with the given stderr.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
        }
    }

    /// The text a caller should look at: stdout on success, otherwise stderr
    /// (falling back to stdout when the tool printed its error there).
    pub fn output(&self) -> &str {
        if self.success || self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        }
    }
}

/// Per-invocation options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Working directory, inherited when `None`
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Suppress progress reporting
    pub silent: bool,
    /// Operation id used to correlate progress events
    pub op: Option<String>,
    /// Human readable description shown while the command runs
    pub message: Option<String>,
}

impl RunOptions {
    /// Options with no overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Silent options: no progress reporting.
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    /// Run inside `dir`.
    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Add several environment variables.
    pub fn envs(mut self, vars: &[(String, String)]) -> Self {
        self.env.extend(vars.iter().cloned());
        self
    }

    /// Report progress under `op` with `message`.
    pub fn observed(mut self, op: impl Into<String>, message: impl Into<String>) -> Self {
        self.silent = false;
        self.op = Some(op.into());
        self.message = Some(message.into());
        self
    }
}

/// Executes external commands.
pub trait Runner {
    /// Run `program` with `args`. Never fails; see [`ExecResult`].
    fn run(&self, program: &str, args: &[&str], opts: &RunOptions) -> ExecResult;

    /// Check if an executable is available.
    fn command_exists(&self, program: &str) -> bool;
}

/// Runner backed by `std::process::Command`.
pub struct SystemRunner<'a> {
    reporter: &'a dyn Reporter,
    programs: HashMap<String, String>,
}

impl Default for SystemRunner<'_> {
    fn default() -> Self {
        Self::new(&NoReport)
    }
}

impl<'a> SystemRunner<'a> {
    /// Create a runner that reports progress to `reporter`.
    pub fn new(reporter: &'a dyn Reporter) -> Self {
        Self {
            reporter,
            programs: HashMap::new(),
        }
    }

    /// Resolve the logical program `name` to `path` (e.g. a pinned `pulumi`).
    pub fn with_program(mut self, name: &str, path: impl Into<String>) -> Self {
        self.programs.insert(name.to_string(), path.into());
        self
    }

    fn resolve<'p>(&'p self, program: &'p str) -> &'p str {
        self.programs.get(program).map_or(program, String::as_str)
    }
}

impl Runner for SystemRunner<'_> {
    fn run(&self, program: &str, args: &[&str], opts: &RunOptions) -> ExecResult {
        let resolved = self.resolve(program);
        let display = format!("{} {}", program, args.join(" "));
        // Secrets only ever travel through `opts.env`, which is not logged.
        log::debug!("exec: {display}");

        let op = opts.op.as_deref().unwrap_or(program);
        if !opts.silent {
            self.reporter
                .op_started(op, opts.message.as_deref().unwrap_or(&display));
        }

        let mut cmd = Command::new(resolved);
        cmd.args(args).stdin(Stdio::null());
        if let Some(cwd) = &opts.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &opts.env {
            cmd.env(key, value);
        }

        let result = match cmd.output() {
            Ok(output) => ExecResult::from(output),
            Err(e) => ExecResult::failed(format!("failed to execute {program}: {e}")),
        };

        if !result.success {
            log::debug!("exec failed: {display}: {}", result.output());
        }
        if !opts.silent {
            self.reporter.op_finished(op, result.success);
        }
        result
    }

    fn command_exists(&self, program: &str) -> bool {
        Command::new("which")
            .arg(self.resolve(program))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_output_prefers_stderr_on_failure() {
        let failed = ExecResult {
            stdout: "partial".to_string(),
            stderr: "error: access denied\n".to_string(),
            success: false,
        };
        assert_eq!(failed.output(), "error: access denied");

        let quiet_failure = ExecResult {
            stdout: "error on stdout".to_string(),
            stderr: String::new(),
            success: false,
        };
        assert_eq!(quiet_failure.output(), "error on stdout");

        assert_eq!(ExecResult::ok(" done \n").output(), "done");
    }

    #[test]
    fn test_spawn_failure_is_folded() {
        let runner = SystemRunner::default();
        let result = runner.run(
            "stackshift-definitely-not-a-real-binary",
            &[],
            &RunOptions::silent(),
        );
        assert!(!result.success);
        assert!(result.output().contains("failed to execute"));
    }

    #[test]
    fn test_runs_in_cwd_with_env() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = SystemRunner::default();
        let result = runner.run(
            "sh",
            &["-c", "pwd; echo $STACKSHIFT_TEST_VAR"],
            &RunOptions::silent()
                .cwd(dir.path())
                .env("STACKSHIFT_TEST_VAR", "hello"),
        );
        assert!(result.success);
        assert!(result.stdout.contains("hello"));
    }

    #[test]
    fn test_non_zero_exit_is_failure() {
        let runner = SystemRunner::default();
        let result = runner.run("sh", &["-c", "echo nope >&2; exit 3"], &RunOptions::silent());
        assert!(!result.success);
        assert_eq!(result.output(), "nope");
    }

    #[test]
    fn test_progress_is_correlated_by_op() {
        struct Recording(RefCell<Vec<String>>);
        impl Reporter for Recording {
            fn op_started(&self, op: &str, _message: &str) {
                self.0.borrow_mut().push(format!("start {op}"));
            }
            fn op_finished(&self, op: &str, succeeded: bool) {
                self.0.borrow_mut().push(format!("finish {op} {succeeded}"));
            }
        }

        let reporter = Recording(RefCell::new(Vec::new()));
        let runner = SystemRunner::new(&reporter);
        runner.run("true", &[], &RunOptions::new().observed("probe", "probing"));
        runner.run("true", &[], &RunOptions::silent());

        assert_eq!(
            reporter.0.into_inner(),
            vec!["start probe".to_string(), "finish probe true".to_string()]
        );
    }

    #[test]
    fn test_program_alias_resolution() {
        let runner = SystemRunner::default().with_program("pulumi", "/opt/pulumi/bin/pulumi");
        assert_eq!(runner.resolve("pulumi"), "/opt/pulumi/bin/pulumi");
        assert_eq!(runner.resolve("aws"), "aws");
    }
}
