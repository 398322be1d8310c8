//! Publication: commit the pipeline's changes and open a pull request.
//!
//! The only input that decides whether anything is published is the staged
//! diff. Stage failures are reported in the body but never stop publication,
//! and an empty diff is a [`PublishOutcome::NoOp`], not an error.
//!
//! Nothing here retries. A push or pull request failure is returned to the
//! controller, which records it and moves on.

pub mod body;
pub mod branch;

use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::acquisition::Workspace;
use crate::git::{Git, GitError, PushResult};
use crate::github::{ForkedRepository, GitHubApiError, HostingApi, PullRequestDraft, PullRequestRef};
use crate::pipeline::{PipelineContext, StageResult};

pub use self::body::{MAX_REPORT_CHARS, choose_title, render_body, truncate_report};
pub use self::branch::{branch_name, next_branch_name};

const COMMIT_MESSAGE: &str = "chore: automated enhancements";
const MAX_BRANCH_ATTEMPTS: u32 = 5;

/// Errors from publishing a candidate.
#[derive(Debug, Error)]
pub enum PublicationError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Api(#[from] GitHubApiError),

    #[error("push rejected: {details}")]
    PushRejected { details: String },

    #[error("no unused branch name after {attempts} attempts")]
    BranchNamesExhausted { attempts: u32 },

    #[error("live publication needs a fork")]
    MissingFork,
}

pub type Result<T> = std::result::Result<T, PublicationError>;

/// What publication did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Opened(PullRequestRef),
    /// Committed locally on `branch`; nothing left the machine.
    DryRun { branch: String },
    /// The pipeline produced no changes.
    NoOp,
}

/// Commits, pushes and opens pull requests.
pub struct Publisher {
    api: Arc<dyn HostingApi>,
    git: Git,
    rng: StdRng,
    dry_run: bool,
}

impl Publisher {
    pub fn new(api: Arc<dyn HostingApi>, git: Git, rng: StdRng) -> Self {
        Publisher {
            api,
            git,
            rng,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[instrument(skip_all, fields(repo = %ctx.candidate.id))]
    pub async fn publish(
        &mut self,
        ctx: &PipelineContext,
        results: &[StageResult],
        workspace: &Workspace,
    ) -> Result<PublishOutcome> {
        let workdir = ctx.workdir.as_path();

        self.git.add_all(workdir).await?;
        if !self.git.has_staged_changes(workdir).await? {
            info!("no changes to publish");
            return Ok(PublishOutcome::NoOp);
        }

        let changes = self.git.diff_name_status_staged(workdir).await?;
        let shortstat = self.git.diff_shortstat_staged(workdir).await?;
        let title = choose_title(&mut self.rng).to_string();
        let body = render_body(ctx, results, &changes, &shortstat);

        let fork = match (&workspace.fork, self.dry_run) {
            (Some(fork), false) => Some(fork),
            (None, false) => return Err(PublicationError::MissingFork),
            (_, true) => None,
        };

        let branch = self.unused_branch(workdir, fork).await?;
        self.git.checkout_new_branch(workdir, &branch).await?;
        self.git.commit(workdir, COMMIT_MESSAGE).await?;
        info!(branch = %branch, files = changes.len(), "committed");

        let Some(fork) = fork else {
            info!(branch = %branch, title = %title, "dry run; not pushing");
            return Ok(PublishOutcome::DryRun { branch });
        };

        match self.git.push_head_to_branch(workdir, &branch).await? {
            PushResult::Rejected { details } => {
                return Err(PublicationError::PushRejected { details });
            }
            PushResult::Success | PushResult::AlreadyUpToDate => {}
        }

        let base = self.resolve_base(ctx, fork, workdir).await;
        let draft = PullRequestDraft {
            target: ctx.candidate.id.clone(),
            head: format!("{}:{}", fork.id.owner, branch),
            base,
            title,
            body,
        };
        let pr = self.api.create_pull_request(&draft).await?;
        info!(pr = %pr.url, "pull request opened");
        Ok(PublishOutcome::Opened(pr))
    }

    /// Picks a branch name the fork does not have yet.
    ///
    /// Dry runs never push, so the first name is used without checking.
    async fn unused_branch(&self, workdir: &Path, fork: Option<&ForkedRepository>) -> Result<String> {
        let Some(fork) = fork else {
            return Ok(next_branch_name());
        };

        for _ in 0..MAX_BRANCH_ATTEMPTS {
            let candidate = next_branch_name();
            let exists = match self.api.branch_exists(&fork.id, &candidate).await {
                Ok(exists) => exists,
                Err(e) => {
                    warn!(error = %e, "branch lookup failed; asking git");
                    self.git.remote_branch_exists(workdir, &candidate).await?
                }
            };
            if !exists {
                return Ok(candidate);
            }
            info!(branch = %candidate, "branch already exists; trying another");
        }
        Err(PublicationError::BranchNamesExhausted {
            attempts: MAX_BRANCH_ATTEMPTS,
        })
    }

    /// The upstream default branch: asked of the platform first, then of
    /// the fork's metadata, then git's `origin/HEAD`, then the value seen at
    /// discovery.
    async fn resolve_base(&self, ctx: &PipelineContext, fork: &ForkedRepository, workdir: &Path) -> String {
        match self.api.default_branch(&ctx.candidate.id).await {
            Ok(branch) => return branch,
            Err(e) => warn!(error = %e, "default branch lookup failed; falling back"),
        }
        if let Some(branch) = &fork.default_branch {
            return branch.clone();
        }
        match self.git.detect_default_branch(workdir).await {
            Ok(Some(branch)) => branch,
            Ok(None) | Err(_) => ctx.candidate.default_branch.clone(),
        }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("git", &self.git)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}
