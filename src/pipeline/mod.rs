//! The transformation pipeline.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s applied one at a time to a
//! candidate's working directory. Ordering is fixed by [`StagePhase`]:
//!
//! 1. `Structure` stages create or normalize files (formatting, README,
//!    license, workflows, container files, manifest)
//! 2. `Content` stages read the structured tree and generate text or tests
//! 3. `Dependencies` stages touch the dependency graph last, so they see the
//!    final manifest
//!
//! Within a phase, registration order is kept.
//!
//! # Failure isolation
//!
//! A stage that returns an error, panics, or exceeds the optional per-stage
//! timeout produces a failed [`StageResult`]; the remaining stages still run
//! against whatever the working directory now contains. Nothing a stage does
//! can abort the candidate.

pub mod context;

use std::any::Any;
use std::io;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;
use tracing::{Instrument, info, info_span, warn};

use crate::generative::GenerationError;

pub use self::context::{PipelineContext, Report, StageFailure};

/// Ordering class of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StagePhase {
    Structure,
    Content,
    Dependencies,
}

/// Errors a stage can report.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Walking the checkout failed part way.
    #[error("walking the checkout: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("{path}: invalid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A file parsed but does not have the expected shape.
    #[error("{path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    /// An external command could not be started.
    #[error("could not run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// An external command exited non-zero.
    #[error("{command} failed: {detail}")]
    Command { command: String, detail: String },

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl StageError {
    /// Wraps an IO error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> StageError {
        let path = path.into();
        move |source| StageError::Io { path, source }
    }
}

/// What a successful stage produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOutcome {
    /// Paths (relative to the checkout) written or changed.
    pub artifacts: Vec<String>,
}

impl StageOutcome {
    /// The stage ran and found nothing to do.
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn wrote(artifacts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        StageOutcome {
            artifacts: artifacts.into_iter().map(Into::into).collect(),
        }
    }
}

/// A unit of transformation applied to a working directory.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stable identifier, used in logs, results and the skip list.
    fn name(&self) -> &'static str;

    fn phase(&self) -> StagePhase;

    async fn run(&self, ctx: &mut PipelineContext) -> Result<StageOutcome, StageError>;
}

/// Detail of a stage result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageDetail {
    Artifacts(Vec<String>),
    Error(String),
}

/// Outcome of running one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub stage: String,
    pub success: bool,
    pub detail: StageDetail,
}

impl StageResult {
    fn succeeded(stage: &str, outcome: StageOutcome) -> Self {
        StageResult {
            stage: stage.to_string(),
            success: true,
            detail: StageDetail::Artifacts(outcome.artifacts),
        }
    }

    fn failed(stage: &str, error: String) -> Self {
        StageResult {
            stage: stage.to_string(),
            success: false,
            detail: StageDetail::Error(error),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.detail {
            StageDetail::Error(e) => Some(e),
            StageDetail::Artifacts(_) => None,
        }
    }
}

/// An ordered set of stages.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    stage_timeout: Option<Duration>,
}

impl Pipeline {
    /// Builds a pipeline, ordering `stages` by phase.
    pub fn new(mut stages: Vec<Box<dyn Stage>>) -> Self {
        stages.sort_by_key(|s| s.phase());
        Pipeline {
            stages,
            stage_timeout: None,
        }
    }

    /// Removes stages whose name is in `skip`.
    pub fn without<S: AsRef<str>>(mut self, skip: &[S]) -> Self {
        self.stages
            .retain(|s| !skip.iter().any(|name| name.as_ref() == s.name()));
        self
    }

    /// Fails any single stage that runs longer than `timeout`.
    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs every stage in order against `ctx`.
    ///
    /// Returns one result per stage. Failures are also appended to
    /// `ctx.failures` so publication can report them.
    pub async fn run(&self, ctx: &mut PipelineContext) -> Vec<StageResult> {
        let mut results = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let name = stage.name();
            let span = info_span!("stage", repo = %ctx.candidate.id, stage = name);

            let result = self.run_stage(stage.as_ref(), ctx).instrument(span).await;
            match &result.detail {
                StageDetail::Artifacts(artifacts) => {
                    info!(
                        repo = %ctx.candidate.id,
                        stage = name,
                        artifacts = artifacts.len(),
                        "stage complete"
                    );
                }
                StageDetail::Error(error) => {
                    warn!(
                        repo = %ctx.candidate.id,
                        stage = name,
                        error = %error,
                        "stage failed; continuing"
                    );
                    ctx.failures.push(StageFailure {
                        stage: name.to_string(),
                        error: error.clone(),
                    });
                }
            }
            results.push(result);
        }

        results
    }

    async fn run_stage(&self, stage: &dyn Stage, ctx: &mut PipelineContext) -> StageResult {
        let name = stage.name();
        let guarded = AssertUnwindSafe(stage.run(ctx)).catch_unwind();

        let caught = match self.stage_timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(caught) => caught,
                Err(_) => {
                    return StageResult::failed(name, format!("timed out after {:?}", limit));
                }
            },
            None => guarded.await,
        };

        match caught {
            Ok(Ok(outcome)) => StageResult::succeeded(name, outcome),
            Ok(Err(e)) => StageResult::failed(name, e.to_string()),
            Err(panic) => StageResult::failed(name, format!("panicked: {}", panic_message(&*panic))),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .field("stage_timeout", &self.stage_timeout)
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests;
