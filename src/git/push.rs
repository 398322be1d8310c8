//! Pushing the enhancement commit to the fork.
//!
//! Pushes use `HEAD:refs/heads/<branch>` refspecs, so the remote branch name
//! does not depend on which local branch is checked out.

use std::path::Path;

use super::{Git, GitError, GitResult};

/// Result of a push operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushResult {
    /// Push succeeded.
    Success,

    /// Push was rejected (non-fast-forward, protected branch, ...).
    Rejected {
        /// Details about why the push was rejected.
        details: String,
    },

    /// Push was a no-op (remote already has this commit).
    AlreadyUpToDate,
}

impl Git {
    /// Pushes the current HEAD to `branch` on `origin`.
    pub async fn push_head_to_branch(&self, workdir: &Path, branch: &str) -> GitResult<PushResult> {
        let refspec = format!("HEAD:refs/heads/{}", branch);
        let invocation = self.command(["push", "origin", refspec.as_str()]);
        let output = self.runner.run(&invocation, workdir).await?;

        if output.success() {
            if output.stdout.contains("Everything up-to-date")
                || output.stderr.contains("Everything up-to-date")
            {
                return Ok(PushResult::AlreadyUpToDate);
            }
            return Ok(PushResult::Success);
        }

        let stderr = &output.stderr;
        if stderr.contains("non-fast-forward")
            || stderr.contains("rejected")
            || stderr.contains("failed to push")
        {
            return Ok(PushResult::Rejected {
                details: output.diagnostic(),
            });
        }

        Err(GitError::CommandFailed {
            command: invocation.to_string(),
            stderr: output.diagnostic(),
        })
    }

    /// Returns true if `branch` exists on `origin`.
    pub async fn remote_branch_exists(&self, workdir: &Path, branch: &str) -> GitResult<bool> {
        let ref_name = format!("refs/heads/{}", branch);
        let out = self
            .stdout(workdir, &["ls-remote", "--heads", "origin", ref_name.as_str()])
            .await?;
        Ok(!out.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use crate::git::CommitIdentity;
    use crate::test_utils::ScriptedRunner;
    use std::sync::Arc;

    fn git(runner: ScriptedRunner) -> (Git, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let identity = CommitIdentity {
            name: "forkbot".to_string(),
            email: "forkbot@example.com".to_string(),
        };
        (Git::new(runner.clone(), identity), runner)
    }

    #[tokio::test]
    async fn push_uses_head_refspec() {
        let (git, runner) = git(ScriptedRunner::new());
        let result = git
            .push_head_to_branch(Path::new("/w"), "forkbot/enhance-1-0")
            .await
            .unwrap();
        assert_eq!(result, PushResult::Success);
        assert!(runner.called_with(&["git", "push", "origin", "HEAD:refs/heads/forkbot/enhance-1-0"]));
    }

    #[tokio::test]
    async fn push_up_to_date_is_detected() {
        let (git, _) = git(ScriptedRunner::new().respond(
            &["git", "push"],
            CommandOutput {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: "Everything up-to-date\n".to_string(),
            },
        ));
        let result = git.push_head_to_branch(Path::new("/w"), "b").await.unwrap();
        assert_eq!(result, PushResult::AlreadyUpToDate);
    }

    #[tokio::test]
    async fn push_rejection_is_not_an_error() {
        let (git, _) = git(ScriptedRunner::new().respond(
            &["git", "push"],
            CommandOutput::failed(1, " ! [rejected]        HEAD -> b (non-fast-forward)"),
        ));
        let result = git.push_head_to_branch(Path::new("/w"), "b").await.unwrap();
        match result {
            PushResult::Rejected { details } => assert!(details.contains("non-fast-forward")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn push_auth_failure_is_an_error() {
        let (git, _) = git(ScriptedRunner::new().respond(
            &["git", "push"],
            CommandOutput::failed(128, "fatal: could not read Username"),
        ));
        let err = git.push_head_to_branch(Path::new("/w"), "b").await.unwrap_err();
        assert!(matches!(err, GitError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn remote_branch_lookup() {
        let (git, _) = git(ScriptedRunner::new().respond(
            &["git", "ls-remote", "--heads", "origin", "refs/heads/taken"],
            CommandOutput::ok("0123abcd\trefs/heads/taken\n"),
        ));
        assert!(git.remote_branch_exists(Path::new("/w"), "taken").await.unwrap());
        assert!(!git.remote_branch_exists(Path::new("/w"), "free").await.unwrap());
    }
}
