//! External command execution.
//!
//! Every tool the pipeline drives (git, gclient, gn, ninja, python scripts,
//! unzip, the browser) goes through a [`CommandRunner`], so the pipeline can
//! be exercised against a scripted runner and dry runs can skip real work.

use crate::error::{Result, WebglCiError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

/// A single external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,

    /// Arguments passed verbatim (no shell).
    pub args: Vec<String>,

    /// Working directory; inherits the caller's when `None`.
    pub cwd: Option<PathBuf>,

    /// Environment overrides layered over the inherited environment.
    pub env: BTreeMap<String, String>,

    /// Capture stdout/stderr instead of streaming them to the console.
    pub capture: bool,

    /// Command only inspects state, so it still runs during a dry run.
    pub read_only: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            capture: false,
            read_only: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, vars: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn captured(mut self) -> Self {
        self.capture = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Render the command line for logs.
    pub fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                out.push('"');
                out.push_str(&arg.replace('"', "\\\""));
                out.push('"');
            } else {
                out.push_str(arg);
            }
        }
        out
    }
}

/// Result of a command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (0 = success, -1 when terminated by a signal).
    pub exit_code: i32,

    /// Captured stdout (empty unless captured).
    pub stdout: String,

    /// Captured stderr (empty unless captured).
    pub stderr: String,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandOutput {
    /// Successful, empty output.
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn failed(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Executes external commands.
///
/// A non-zero exit code is reported in [`CommandOutput`]; only failures to
/// start the process are errors.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs commands as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        if spec.program.is_empty() {
            return Err(WebglCiError::EmptyCommand(spec.display()));
        }

        let start = Instant::now();
        let mut command = Command::new(&spec.program);
        command.args(&spec.args).envs(&spec.env);
        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }

        let spawn_err = |source| WebglCiError::Spawn {
            command: spec.display(),
            source,
        };

        let (status, stdout, stderr) = if spec.capture {
            let output = command
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await
                .map_err(spawn_err)?;
            (
                output.status,
                String::from_utf8_lossy(&output.stdout).to_string(),
                String::from_utf8_lossy(&output.stderr).to_string(),
            )
        } else {
            let status = command.status().await.map_err(spawn_err)?;
            (status, String::new(), String::new())
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(cmd = %spec.display(), duration_ms, "command finished");

        Ok(CommandOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
            duration_ms,
        })
    }
}

/// Wraps a runner so that only read-only commands are executed.
///
/// Everything else reports success with empty output.
#[derive(Debug, Clone, Default)]
pub struct DryRunRunner<R> {
    inner: R,
}

impl<R: CommandRunner> DryRunRunner<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<R: CommandRunner> CommandRunner for DryRunRunner<R> {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        if spec.read_only {
            return self.inner.run(spec).await;
        }
        debug!(cmd = %spec.display(), "dry run, command skipped");
        Ok(CommandOutput::ok())
    }
}
