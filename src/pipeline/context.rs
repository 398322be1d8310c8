//! Per-candidate state threaded through every stage.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::types::CandidateRepository;

/// A piece of generated text destined for the pull request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub stage: String,
    pub title: String,
    pub body: String,
}

/// A stage that did not complete, with its diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: String,
    pub error: String,
}

/// Mutable state for one candidate's pass through the pipeline.
///
/// Owned exclusively by the pipeline run for a single candidate and dropped
/// once publication has read it.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Root of the candidate's checkout.
    pub workdir: PathBuf,
    pub candidate: CandidateRepository,
    /// Markers set by earlier stages for later ones (e.g. `workflow-added`).
    pub flags: BTreeSet<String>,
    /// Human-readable list of what was done, in order.
    pub task_log: Vec<String>,
    pub reports: Vec<Report>,
    pub failures: Vec<StageFailure>,
}

impl PipelineContext {
    pub fn new(workdir: impl Into<PathBuf>, candidate: CandidateRepository) -> Self {
        PipelineContext {
            workdir: workdir.into(),
            candidate,
            flags: BTreeSet::new(),
            task_log: Vec::new(),
            reports: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Resolves `relative` against the checkout root.
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.workdir.join(relative)
    }

    pub fn set_flag(&mut self, flag: &str) {
        self.flags.insert(flag.to_string());
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    pub fn log_task(&mut self, task: impl Into<String>) {
        self.task_log.push(task.into());
    }

    pub fn add_report(&mut self, stage: &str, title: impl Into<String>, body: impl Into<String>) {
        self.reports.push(Report {
            stage: stage.to_string(),
            title: title.into(),
            body: body.into(),
        });
    }
}
