//! Local git operations on a candidate's working copy.
//!
//! Every command runs through the injected [`CommandRunner`] with a clean
//! environment: system and global config are ignored and terminal prompts are
//! disabled, so a missing credential fails fast instead of hanging the run.
//! Commit identity is passed per command with `-c` flags; nothing is written
//! to `.git/config`.

pub mod push;

pub use self::push::PushResult;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::command::{CommandOutput, CommandRunner, Invocation};

/// Environment variable the credential helper reads the push token from.
const TOKEN_ENV: &str = "FORKBOT_GIT_TOKEN";

/// Errors from git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Git command exited non-zero.
    #[error("git command failed: {command}\nstderr: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Git could not be started.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Identity used for creating commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    /// The committer/author name (git `user.name`).
    pub name: String,

    /// The committer/author email (git `user.email`).
    pub email: String,
}

/// How a path changed in the staged diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    /// Renames, copies, type changes and anything else.
    Changed,
}

impl ChangeKind {
    /// Maps a `--name-status` letter (ignoring any similarity score).
    pub fn from_status(status: &str) -> Self {
        match status.chars().next() {
            Some('A') => ChangeKind::Added,
            Some('M') => ChangeKind::Modified,
            Some('D') => ChangeKind::Deleted,
            _ => ChangeKind::Changed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Changed => "changed",
        }
    }
}

/// One staged path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub kind: ChangeKind,
    pub path: String,
}

/// Parses `git diff --name-status` output.
///
/// For renames and copies the destination path is reported.
pub fn parse_name_status(output: &str) -> Vec<FileChange> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let status = fields.next()?.trim();
            let path = fields.last()?.trim();
            if status.is_empty() || path.is_empty() {
                return None;
            }
            Some(FileChange {
                kind: ChangeKind::from_status(status),
                path: path.to_string(),
            })
        })
        .collect()
}

/// Git bound to a command runner and a commit identity.
#[derive(Clone)]
pub struct Git {
    runner: Arc<dyn CommandRunner>,
    identity: CommitIdentity,
    token: Option<String>,
}

impl Git {
    pub fn new(runner: Arc<dyn CommandRunner>, identity: CommitIdentity) -> Self {
        Git {
            runner,
            identity,
            token: None,
        }
    }

    /// Supplies a token for HTTPS remotes.
    ///
    /// The token reaches git through an inline credential helper that reads
    /// it from the environment, so it never appears in command lines or URLs.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn identity(&self) -> &CommitIdentity {
        &self.identity
    }

    /// Builds a git invocation with the clean environment applied.
    pub(crate) fn command<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut invocation = Invocation::new("git")
            .args(args)
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .env("GIT_CONFIG_GLOBAL", "/dev/null")
            .env("GIT_TERMINAL_PROMPT", "0");

        if let Some(token) = &self.token {
            invocation = invocation
                .env("GIT_CONFIG_COUNT", "1")
                .env("GIT_CONFIG_KEY_0", "credential.helper")
                .env(
                    "GIT_CONFIG_VALUE_0",
                    format!(
                        "!f() {{ echo username=x-access-token; echo \"password=${}\"; }}; f",
                        TOKEN_ENV
                    ),
                )
                .env(TOKEN_ENV, token.clone());
        }
        invocation
    }

    /// Runs a git command, failing on non-zero exit.
    pub async fn run(&self, workdir: &Path, args: &[&str]) -> GitResult<CommandOutput> {
        let invocation = self.command(args.iter().copied());
        let output = self.runner.run(&invocation, workdir).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(GitError::CommandFailed {
                command: invocation.to_string(),
                stderr: output.diagnostic(),
            })
        }
    }

    /// Runs a git command and returns trimmed stdout.
    pub async fn stdout(&self, workdir: &Path, args: &[&str]) -> GitResult<String> {
        let output = self.run(workdir, args).await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Clones `url` into `dest`. The parent of `dest` must exist.
    ///
    /// Git runs in the parent directory and is given only the final path
    /// component, so relative destinations resolve the same way absolute
    /// ones do.
    pub async fn clone_repo(&self, url: &str, dest: &Path) -> GitResult<()> {
        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let target = dest
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| dest.to_string_lossy());
        self.run(parent, &["clone", url, target.as_ref()]).await?;
        Ok(())
    }

    /// Stages every change in the working tree, including deletions.
    pub async fn add_all(&self, workdir: &Path) -> GitResult<()> {
        self.run(workdir, &["add", "-A"]).await?;
        Ok(())
    }

    /// Returns true if the index differs from HEAD.
    pub async fn has_staged_changes(&self, workdir: &Path) -> GitResult<bool> {
        let invocation = self.command(["diff", "--cached", "--quiet"]);
        let output = self.runner.run(&invocation, workdir).await?;
        // --quiet exits 1 when there are differences.
        match output.exit_code {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(GitError::CommandFailed {
                command: invocation.to_string(),
                stderr: output.diagnostic(),
            }),
        }
    }

    /// Switches to a new local branch at HEAD.
    pub async fn checkout_new_branch(&self, workdir: &Path, branch: &str) -> GitResult<()> {
        self.run(workdir, &["checkout", "-b", branch]).await?;
        Ok(())
    }

    /// Commits the index with the configured identity.
    pub async fn commit(&self, workdir: &Path, message: &str) -> GitResult<()> {
        let user_name = format!("user.name={}", self.identity.name);
        let user_email = format!("user.email={}", self.identity.email);
        self.run(
            workdir,
            &[
                "-c",
                user_name.as_str(),
                "-c",
                user_email.as_str(),
                "commit",
                "-m",
                message,
            ],
        )
        .await?;
        Ok(())
    }

    /// Staged changes as `--name-status` entries.
    pub async fn diff_name_status_staged(&self, workdir: &Path) -> GitResult<Vec<FileChange>> {
        let out = self
            .stdout(workdir, &["diff", "--cached", "--name-status"])
            .await?;
        Ok(parse_name_status(&out))
    }

    /// The one-line `--shortstat` summary of staged changes.
    pub async fn diff_shortstat_staged(&self, workdir: &Path) -> GitResult<String> {
        self.stdout(workdir, &["diff", "--cached", "--shortstat"])
            .await
    }

    /// Reads the remote default branch from `origin/HEAD`.
    ///
    /// Returns `None` if the symbolic ref is not set.
    pub async fn detect_default_branch(&self, workdir: &Path) -> GitResult<Option<String>> {
        let invocation = self.command(["symbolic-ref", "--short", "refs/remotes/origin/HEAD"]);
        let output = self.runner.run(&invocation, workdir).await?;
        if !output.success() {
            return Ok(None);
        }
        let full = output.stdout.trim();
        let branch = full.strip_prefix("origin/").unwrap_or(full);
        Ok((!branch.is_empty()).then(|| branch.to_string()))
    }
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("identity", &self.identity)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}
