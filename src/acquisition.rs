//! Acquisition: obtain a local working copy of a candidate.
//!
//! In a live run the candidate is forked into the authenticated account and
//! the fork is cloned, so the enhancement branch can later be pushed there.
//! A dry run skips the fork and clones upstream directly.
//!
//! Each candidate gets its own directory, `<work_dir>/<owner>__<name>`. A
//! leftover directory from an earlier run is removed before cloning.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, instrument};

use crate::git::{Git, GitError};
use crate::github::{ForkedRepository, GitHubApiError, HostingApi};
use crate::types::{CandidateRepository, RepoId};

/// Errors from acquiring a working copy.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("fork failed: {0}")]
    Fork(#[from] GitHubApiError),

    #[error("clone failed: {0}")]
    Clone(#[from] GitError),

    #[error("could not prepare {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for acquisition.
pub type Result<T> = std::result::Result<T, AcquisitionError>;

/// A candidate's local checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub path: PathBuf,
    /// The fork the checkout was cloned from; `None` in a dry run.
    pub fork: Option<ForkedRepository>,
}

/// Forks and clones candidates into a work directory.
pub struct Acquirer {
    api: Arc<dyn HostingApi>,
    git: Git,
    work_dir: PathBuf,
    dry_run: bool,
    settle_delay: Duration,
}

impl Acquirer {
    pub fn new(api: Arc<dyn HostingApi>, git: Git, work_dir: impl Into<PathBuf>) -> Self {
        Acquirer {
            api,
            git,
            work_dir: work_dir.into(),
            dry_run: false,
            settle_delay: Duration::from_millis(1500),
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Pause between creating a fork and cloning it.
    ///
    /// Fork creation is asynchronous on the platform; cloning immediately can
    /// hit an empty repository.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Directory the candidate is checked out into.
    pub fn workspace_path(&self, id: &RepoId) -> PathBuf {
        self.work_dir.join(id.dir_name())
    }

    #[instrument(skip_all, fields(repo = %candidate.id))]
    pub async fn acquire(&self, candidate: &CandidateRepository) -> Result<Workspace> {
        let (fork, clone_url) = if self.dry_run {
            (None, candidate.clone_url.clone())
        } else {
            info!("forking");
            let fork = self.api.fork(&candidate.id).await?;
            info!(fork = %fork.id, "fork ready");
            tokio::time::sleep(self.settle_delay).await;
            let url = fork.clone_url.clone();
            (Some(fork), url)
        };

        let path = self.workspace_path(&candidate.id);
        self.prepare(&path).await?;

        info!(url = %clone_url, path = %path.display(), "cloning");
        self.git.clone_repo(&clone_url, &path).await?;

        Ok(Workspace { path, fork })
    }

    /// Ensures the work directory exists and `path` does not.
    async fn prepare(&self, path: &Path) -> Result<()> {
        let wrap = |source| AcquisitionError::Workspace {
            path: path.to_path_buf(),
            source,
        };

        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(wrap)?;
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {
                info!(path = %path.display(), "removed stale checkout");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(wrap(e)),
        }
    }
}

impl std::fmt::Debug for Acquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquirer")
            .field("work_dir", &self.work_dir)
            .field("dry_run", &self.dry_run)
            .field("settle_delay", &self.settle_delay)
            .finish_non_exhaustive()
    }
}
