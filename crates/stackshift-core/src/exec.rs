//! External command execution.
//!
//! Every call into `pulumi` or `aws` goes through a [`CommandRunner`]. The
//! production runner spawns the process and waits for it; tests drive the
//! orchestrator with a scripted runner instead.

use serde::Serialize;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

use crate::error::{Result, StackshiftError};

// ---------------------------------------------------------------------------
// Tool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Pulumi,
    Aws,
}

impl Tool {
    pub fn program(self) -> &'static str {
        match self {
            Tool::Pulumi => "pulumi",
            Tool::Aws => "aws",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

// ---------------------------------------------------------------------------
// CommandSpec
// ---------------------------------------------------------------------------

/// A fully-built invocation of an external tool.
///
/// Arguments are kept as a structured list and handed to the OS verbatim, so
/// no shell quoting is ever involved. Values registered with
/// [`CommandSpec::secret_arg`] are masked in [`CommandSpec::display_line`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub tool: Tool,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    /// Keep the command line and its stderr out of debug logs.
    pub quiet: bool,
    masked: Vec<usize>,
}

impl CommandSpec {
    pub fn new<I, S>(tool: Tool, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tool,
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            cwd: None,
            quiet: false,
            masked: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append an argument whose value must never appear in logs.
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.masked.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// True if `tokens` appear as a contiguous run at the start of the args.
    pub fn starts_with(&self, tokens: &[&str]) -> bool {
        self.args.len() >= tokens.len() && self.args.iter().zip(tokens).all(|(a, t)| a == t)
    }

    /// Value following `flag`, if present.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Human-readable command line with secret values masked. Environment
    /// overrides are listed by name only.
    pub fn display_line(&self) -> String {
        let mut line = String::new();
        for (key, _) in &self.env {
            line.push_str(key);
            line.push_str("=*** ");
        }
        line.push_str(self.tool.program());
        for (i, arg) in self.args.iter().enumerate() {
            line.push(' ');
            if self.masked.contains(&i) {
                line.push_str("***");
            } else if arg.contains(char::is_whitespace) || arg.is_empty() {
                line.push('\'');
                line.push_str(arg);
                line.push('\'');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_line())
    }
}

// ---------------------------------------------------------------------------
// StepResult
// ---------------------------------------------------------------------------

/// Outcome of one external invocation.
///
/// `output` is stdout on success and the best available diagnostic on
/// failure (stderr, else stdout, else the spawn error). `stdout` is always
/// the raw captured stdout so callers can parse JSON from failed calls too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub success: bool,
    pub output: String,
    #[serde(skip)]
    pub stdout: String,
}

impl StepResult {
    pub fn ok(stdout: impl Into<String>) -> Self {
        let stdout = stdout.into();
        Self {
            success: true,
            output: stdout.clone(),
            stdout,
        }
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            success: false,
            output: diagnostic.into(),
            stdout: String::new(),
        }
    }

    /// Convert into a `Result`, attributing a failure to `spec`.
    pub fn into_result(self, spec: &CommandSpec) -> Result<String> {
        if self.success {
            Ok(self.stdout)
        } else {
            Err(StackshiftError::ExternalCommandFailure {
                command: spec.display_line(),
                stderr: self.output.trim().to_string(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// CommandRunner
// ---------------------------------------------------------------------------

pub trait CommandRunner {
    fn run(&mut self, spec: &CommandSpec) -> StepResult;
}

/// Spawns real processes and waits for them to exit. No timeout is applied.
#[derive(Debug, Default)]
pub struct ProcessRunner {
    verbose: bool,
    search_path: Option<OsString>,
}

impl ProcessRunner {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            search_path: None,
        }
    }

    /// Resolve programs in `paths` (a `PATH`-style list) instead of `PATH`.
    pub fn with_search_path(mut self, paths: impl Into<OsString>) -> Self {
        self.search_path = Some(paths.into());
        self
    }

    fn resolve(&self, tool: Tool) -> std::result::Result<PathBuf, which::Error> {
        match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                which::which_in(tool.program(), Some(paths), cwd)
            }
            None => which::which(tool.program()),
        }
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&mut self, spec: &CommandSpec) -> StepResult {
        if !spec.quiet {
            debug!(command = %spec.display_line(), "running");
        }

        let program = match self.resolve(spec.tool) {
            Ok(p) => p,
            Err(_) => {
                return StepResult::failed(format!(
                    "`{}` not found on PATH; install it and retry",
                    spec.tool
                ))
            }
        };

        let mut cmd = Command::new(&program);
        cmd.args(&spec.args);
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());

        let output = match cmd.output() {
            Ok(o) => o,
            Err(e) => return StepResult::failed(format!("failed to spawn {}: {e}", spec.tool)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if self.verbose && !spec.quiet && !stderr.trim().is_empty() {
            debug!(tool = %spec.tool, stderr = %stderr.trim(), "stderr");
        }

        if output.status.success() {
            return StepResult::ok(stdout);
        }

        let diagnostic = if !stderr.trim().is_empty() {
            stderr.trim().to_string()
        } else if !stdout.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            format!("{} exited with {}", spec.tool, output.status)
        };
        StepResult {
            success: false,
            output: diagnostic,
            stdout,
        }
    }
}

/// Run `spec` with `cwd` applied unless the spec already carries one.
pub fn run_in(runner: &mut dyn CommandRunner, spec: CommandSpec, cwd: &Path) -> StepResult {
    let spec = if spec.cwd.is_some() { spec } else { spec.cwd(cwd) };
    runner.run(&spec)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_line_masks_secrets_and_env() {
        let spec = CommandSpec::new(Tool::Pulumi, ["config", "set", "dbPassword"])
            .secret_arg("hunter2")
            .arg("--secret")
            .env("PULUMI_CONFIG_PASSPHRASE", "pp");
        let line = spec.display_line();
        assert_eq!(
            line,
            "PULUMI_CONFIG_PASSPHRASE=*** pulumi config set dbPassword *** --secret"
        );
        assert!(!line.contains("hunter2"));
        assert!(!line.contains("pp "));
    }

    #[test]
    fn display_line_quotes_whitespace() {
        let spec = CommandSpec::new(Tool::Aws, ["kms", "create-key", "--description"])
            .arg("Pulumi state key");
        assert!(spec.display_line().ends_with("--description 'Pulumi state key'"));
    }

    #[test]
    fn flag_value_and_prefix_helpers() {
        let spec = CommandSpec::new(Tool::Pulumi, ["stack", "export", "--stack", "dev"]);
        assert!(spec.starts_with(&["stack", "export"]));
        assert!(!spec.starts_with(&["stack", "import"]));
        assert_eq!(spec.flag_value("--stack"), Some("dev"));
        assert_eq!(spec.flag_value("--file"), None);
    }

    #[test]
    fn quiet_survives_other_builders() {
        let spec = CommandSpec::new(Tool::Pulumi, ["logout"])
            .quiet()
            .env("PULUMI_CONFIG_PASSPHRASE", "pp")
            .cwd("/tmp");
        assert!(spec.quiet);
        assert!(!CommandSpec::new(Tool::Pulumi, ["logout"]).quiet);
        let applied = {
            let mut seen = None;
            struct Capture<'a>(&'a mut Option<CommandSpec>);
            impl CommandRunner for Capture<'_> {
                fn run(&mut self, spec: &CommandSpec) -> StepResult {
                    *self.0 = Some(spec.clone());
                    StepResult::ok("")
                }
            }
            run_in(&mut Capture(&mut seen), spec, Path::new("/work"));
            seen.unwrap()
        };
        assert!(applied.quiet);
        assert_eq!(applied.cwd.as_deref(), Some(Path::new("/tmp")));
    }

    #[cfg(unix)]
    #[test]
    fn quiet_command_still_reports_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        fake_tool(dir.path(), "pulumi", "echo 'not logged in' >&2; exit 1");
        let mut runner = ProcessRunner::new(true).with_search_path(dir.path().as_os_str());
        let res = runner.run(&CommandSpec::new(Tool::Pulumi, ["logout"]).quiet());
        assert!(!res.success);
        assert_eq!(res.output, "not logged in");
    }

    #[test]
    fn failed_step_converts_to_external_command_failure() {
        let spec = CommandSpec::new(Tool::Aws, ["s3api", "head-bucket"]);
        let err = StepResult::failed("  Not Found\n").into_result(&spec).unwrap_err();
        match err {
            StackshiftError::ExternalCommandFailure { command, stderr } => {
                assert_eq!(command, "aws s3api head-bucket");
                assert_eq!(stderr, "Not Found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_program_is_a_failed_step() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut runner = ProcessRunner::new(false).with_search_path(dir.path().as_os_str());
        let res = runner.run(&CommandSpec::new(Tool::Pulumi, ["version"]));
        assert!(!res.success);
        assert!(res.output.contains("not found"));
    }

    #[cfg(unix)]
    fn fake_tool(dir: &Path, name: &str, body: &str) {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_captures_stdout_on_success() {
        let dir = tempfile::TempDir::new().unwrap();
        fake_tool(dir.path(), "aws", "echo \"args: $*\"");
        let mut runner = ProcessRunner::new(false).with_search_path(dir.path().as_os_str());
        let res = runner.run(&CommandSpec::new(Tool::Aws, ["sts", "get-caller-identity"]));
        assert!(res.success);
        assert_eq!(res.stdout.trim(), "args: sts get-caller-identity");
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_prefers_stderr_on_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        fake_tool(dir.path(), "pulumi", "echo partial; echo 'error: no stack' >&2; exit 3");
        let mut runner = ProcessRunner::new(true).with_search_path(dir.path().as_os_str());
        let res = runner.run(&CommandSpec::new(Tool::Pulumi, ["stack", "ls"]));
        assert!(!res.success);
        assert_eq!(res.output, "error: no stack");
        assert_eq!(res.stdout.trim(), "partial");
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_applies_env_and_cwd() {
        let dir = tempfile::TempDir::new().unwrap();
        let work = tempfile::TempDir::new().unwrap();
        fake_tool(dir.path(), "pulumi", "echo \"$PULUMI_CONFIG_PASSPHRASE\"; pwd");
        let mut runner = ProcessRunner::new(false).with_search_path(dir.path().as_os_str());
        let spec = CommandSpec::new(Tool::Pulumi, ["whoami"])
            .env("PULUMI_CONFIG_PASSPHRASE", "s3cret")
            .cwd(work.path());
        let res = runner.run(&spec);
        assert!(res.success);
        let mut lines = res.stdout.lines();
        assert_eq!(lines.next(), Some("s3cret"));
        let pwd = std::fs::canonicalize(lines.next().unwrap()).unwrap();
        assert_eq!(pwd, std::fs::canonicalize(work.path()).unwrap());
    }
}
