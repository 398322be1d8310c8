//! External command execution.
//!
//! Git, the formatter and the package manager all run through a
//! [`CommandRunner`], so tests can script their outputs instead of spawning
//! processes.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// One command line plus extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Invocation {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Returns true if `pattern` appears as a contiguous run of this
    /// invocation's arguments.
    pub fn has_args(&self, pattern: &[&str]) -> bool {
        if pattern.is_empty() {
            return true;
        }
        self.args
            .windows(pattern.len())
            .any(|w| w.iter().zip(pattern).all(|(a, p)| a == p))
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        CommandOutput {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed output with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        CommandOutput {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// The most useful text for an error message: stderr, or stdout when
    /// stderr is empty.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Runs external commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `invocation` in `workdir` to completion.
    ///
    /// A non-zero exit is reported through [`CommandOutput::exit_code`], not
    /// as an error; `Err` means the process could not be started at all.
    async fn run(&self, invocation: &Invocation, workdir: &Path) -> io::Result<CommandOutput>;
}

/// Spawns real processes with tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation, workdir: &Path) -> io::Result<CommandOutput> {
        debug!(command = %invocation, workdir = %workdir.display(), "running command");
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(&invocation.env)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_args_matches_contiguous_run() {
        let inv = Invocation::new("git").args(["-c", "user.name=x", "commit", "-m", "msg"]);
        assert!(inv.has_args(&["commit", "-m"]));
        assert!(inv.has_args(&[]));
        assert!(!inv.has_args(&["commit", "msg"]));
        assert!(!inv.has_args(&["push"]));
    }

    #[test]
    fn display_joins_program_and_args() {
        let inv = Invocation::new("npm").args(["audit", "fix"]).env("CI", "1");
        assert_eq!(inv.to_string(), "npm audit fix");
    }

    #[test]
    fn diagnostic_prefers_stderr() {
        assert_eq!(CommandOutput::failed(1, " boom \n").diagnostic(), "boom");
        let out = CommandOutput {
            exit_code: Some(1),
            stdout: "only stdout".to_string(),
            stderr: String::new(),
        };
        assert_eq!(out.diagnostic(), "only stdout");
    }

    #[test]
    fn signal_termination_is_not_success() {
        let out = CommandOutput {
            exit_code: None,
            ..Default::default()
        };
        assert!(!out.success());
    }

    #[tokio::test]
    async fn system_runner_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = SystemRunner
            .run(&Invocation::new("sh").args(["-c", "echo hi; echo err >&2; exit 3"]), dir.path())
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout.trim(), "hi");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn system_runner_reports_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let result = SystemRunner
            .run(&Invocation::new("definitely-not-a-real-program-xyz"), dir.path())
            .await;
        assert!(result.is_err());
    }
}
