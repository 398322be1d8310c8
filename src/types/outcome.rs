//! Per-candidate outcomes and the ledger record built from them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::RepoId;

/// How processing of a single candidate ended.
///
/// Every variant is terminal: the candidate is recorded in the ledger whatever
/// the outcome, so none of these is ever retried automatically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// A pull request was opened.
    Published { pr_url: String },

    /// Changes were committed locally but, being a dry run, not pushed.
    DryRun { branch: String },

    /// The pipeline left no changes to commit.
    NothingToPublish,

    /// Fork or clone failed; no pipeline or publication was attempted.
    AcquisitionFailed { reason: String },

    /// Commit, push or pull request creation failed.
    PublicationFailed { reason: String },

    /// Written by older tooling that recorded only the identifier.
    #[default]
    #[serde(other)]
    Unknown,
}

impl RunOutcome {
    /// Returns true if this outcome counts as a failure in run summaries.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RunOutcome::AcquisitionFailed { .. } | RunOutcome::PublicationFailed { .. }
        )
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Published { pr_url } => write!(f, "published {}", pr_url),
            RunOutcome::DryRun { branch } => write!(f, "dry run on branch {}", branch),
            RunOutcome::NothingToPublish => write!(f, "nothing to publish"),
            RunOutcome::AcquisitionFailed { reason } => write!(f, "acquisition failed: {}", reason),
            RunOutcome::PublicationFailed { reason } => write!(f, "publication failed: {}", reason),
            RunOutcome::Unknown => write!(f, "unknown"),
        }
    }
}

/// One processed candidate, as persisted in the ledger file.
///
/// `full_name` is the only required field so that hand-edited ledgers and
/// entries from earlier versions still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub full_name: RepoId,

    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub outcome: RunOutcome,
}

impl LedgerEntry {
    /// Creates an entry stamped with the current time.
    pub fn now(full_name: RepoId, outcome: RunOutcome) -> Self {
        LedgerEntry {
            full_name,
            processed_at: Some(Utc::now()),
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_with_only_identifier_loads() {
        let entry: LedgerEntry = serde_json::from_str(r#"{"full_name":"a/b"}"#).unwrap();
        assert_eq!(entry.full_name, RepoId::new("a", "b"));
        assert_eq!(entry.processed_at, None);
        assert_eq!(entry.outcome, RunOutcome::Unknown);
    }

    #[test]
    fn entry_ignores_unrelated_fields() {
        let entry: LedgerEntry = serde_json::from_str(
            r#"{"full_name":"a/b","forked_at":"2024-01-01","stars":4}"#,
        )
        .unwrap();
        assert_eq!(entry.full_name.to_string(), "a/b");
    }

    #[test]
    fn outcome_is_tagged() {
        let json = serde_json::to_value(RunOutcome::AcquisitionFailed {
            reason: "clone failed".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "acquisition_failed");
        assert_eq!(json["reason"], "clone failed");
    }

    #[test]
    fn failure_classification() {
        assert!(RunOutcome::AcquisitionFailed { reason: String::new() }.is_failure());
        assert!(RunOutcome::PublicationFailed { reason: String::new() }.is_failure());
        assert!(!RunOutcome::NothingToPublish.is_failure());
        assert!(!RunOutcome::DryRun { branch: "b".into() }.is_failure());
    }
}
