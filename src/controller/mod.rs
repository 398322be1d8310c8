//! The run controller.
//!
//! One run is one discovery pass followed by sequential processing of each
//! candidate:
//!
//! ```text
//! Discovered -> Acquiring -> Transforming -> Publishing -> Recorded
//! ```
//!
//! Every dequeued candidate ends in `Recorded`: the ledger entry is written
//! whatever happened before it, so a permanently broken repository is never
//! retried on the next run. Candidate failures are logged and counted; only a
//! ledger write failure ends the run early, since continuing would process
//! repositories that could never be marked done.

use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::acquisition::Acquirer;
use crate::discovery::DiscoveryClient;
use crate::ledger::{Ledger, LedgerError};
use crate::pipeline::{Pipeline, PipelineContext};
use crate::publication::{PublishOutcome, Publisher};
use crate::types::{CandidateRepository, LedgerEntry, RunOutcome};

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub type Result<T> = std::result::Result<T, ControllerError>;

/// Counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Candidates returned by discovery.
    pub discovered: usize,
    /// Candidates that reached `Recorded`.
    pub processed: usize,
    /// Pull requests opened.
    pub published: usize,
    /// Dry-run commits left on a local branch.
    pub dry_runs: usize,
    /// Candidates whose pipeline changed nothing.
    pub no_op: usize,
    /// Acquisition or publication failures.
    pub failed: usize,
}

impl RunSummary {
    fn tally(&mut self, outcome: &RunOutcome) {
        self.processed += 1;
        match outcome {
            RunOutcome::Published { .. } => self.published += 1,
            RunOutcome::DryRun { .. } => self.dry_runs += 1,
            RunOutcome::NothingToPublish => self.no_op += 1,
            RunOutcome::AcquisitionFailed { .. } | RunOutcome::PublicationFailed { .. } => {
                self.failed += 1
            }
            RunOutcome::Unknown => {}
        }
    }
}

/// Drives discovery, acquisition, the pipeline and publication.
pub struct RunController {
    discovery: DiscoveryClient,
    acquirer: Acquirer,
    pipeline: Pipeline,
    publisher: Publisher,
    ledger: Ledger,
    candidate_delay: Duration,
}

impl RunController {
    pub fn new(
        discovery: DiscoveryClient,
        acquirer: Acquirer,
        pipeline: Pipeline,
        publisher: Publisher,
        ledger: Ledger,
    ) -> Self {
        RunController {
            discovery,
            acquirer,
            pipeline,
            publisher,
            ledger,
            candidate_delay: Duration::from_secs(2),
        }
    }

    /// Pause before each candidate after the first.
    pub fn candidate_delay(mut self, delay: Duration) -> Self {
        self.candidate_delay = delay;
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Performs one run.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        let candidates = self.discovery.search(&self.ledger).await;
        summary.discovered = candidates.len();
        info!(
            candidates = candidates.len(),
            stages = ?self.pipeline.stage_names(),
            "discovery complete"
        );

        for candidate in &candidates {
            // Discovery already filters the ledger; this catches duplicates
            // recorded earlier in this run.
            if self.ledger.has(&candidate.id) {
                info!(repo = %candidate.id, "already recorded; skipping");
                continue;
            }
            if summary.processed > 0 {
                tokio::time::sleep(self.candidate_delay).await;
            }

            let outcome = self.process(candidate).await;
            summary.tally(&outcome);
            info!(repo = %candidate.id, outcome = %outcome, "recording");

            if let Err(e) = self.ledger.record(LedgerEntry::now(candidate.id.clone(), outcome)) {
                error!(repo = %candidate.id, error = %e, "ledger write failed; stopping run");
                return Err(e.into());
            }
        }

        info!(
            discovered = summary.discovered,
            processed = summary.processed,
            published = summary.published,
            dry_runs = summary.dry_runs,
            no_op = summary.no_op,
            failed = summary.failed,
            "run complete"
        );
        Ok(summary)
    }

    /// Takes one candidate from `Acquiring` to the outcome to record.
    #[instrument(skip_all, fields(repo = %candidate.id))]
    async fn process(&mut self, candidate: &CandidateRepository) -> RunOutcome {
        let workspace = match self.acquirer.acquire(candidate).await {
            Ok(workspace) => workspace,
            Err(e) => {
                warn!(error = %e, "acquisition failed");
                return RunOutcome::AcquisitionFailed {
                    reason: e.to_string(),
                };
            }
        };

        let mut ctx = PipelineContext::new(&workspace.path, candidate.clone());
        let results = self.pipeline.run(&mut ctx).await;
        let failed = results.iter().filter(|r| !r.success).count();
        info!(stages = results.len(), failed, "pipeline complete");

        match self.publisher.publish(&ctx, &results, &workspace).await {
            Ok(PublishOutcome::Opened(pr)) => RunOutcome::Published { pr_url: pr.url },
            Ok(PublishOutcome::DryRun { branch }) => RunOutcome::DryRun { branch },
            Ok(PublishOutcome::NoOp) => RunOutcome::NothingToPublish,
            Err(e) => {
                warn!(error = %e, "publication failed");
                RunOutcome::PublicationFailed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

impl std::fmt::Debug for RunController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunController")
            .field("discovery", &self.discovery)
            .field("acquirer", &self.acquirer)
            .field("pipeline", &self.pipeline)
            .field("publisher", &self.publisher)
            .field("ledger", &self.ledger.path())
            .field("candidate_delay", &self.candidate_delay)
            .finish()
    }
}
