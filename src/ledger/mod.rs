//! Persistent record of repositories that have already been processed.
//!
//! The ledger is the only state that survives between runs. It is a single
//! JSON array of [`LedgerEntry`] values, read fully into memory when opened
//! and rewritten in full on every [`Ledger::record`].
//!
//! # Tolerance
//!
//! Opening never fails. A missing, empty or whitespace-only file is an empty
//! ledger. A file that is not valid JSON is logged, moved aside to
//! `<path>.corrupt`, and treated as empty. Individual entries that do not
//! parse are skipped with a warning while the rest are kept. A false negative
//! only costs a redundant reprocessing of one repository, whereas refusing to
//! start would stall every run.
//!
//! # Concurrency
//!
//! Writes are last-writer-wins with no locking. Two overlapping processes
//! sharing one ledger file can lose entries; runs are expected to be
//! serialized by whatever schedules them.

pub mod atomic;

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{LedgerEntry, RepoId};

use self::atomic::write_atomic;

/// Errors from persisting the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// IO error while rewriting the ledger file.
    #[error("failed to write ledger {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON serialization error.
    #[error("failed to serialize ledger: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// The processed-repository ledger.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: Vec<LedgerEntry>,
    index: HashSet<RepoId>,
}

impl Ledger {
    /// Opens the ledger at `path`, loading every readable entry.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        let index = entries.iter().map(|e| e.full_name.clone()).collect();
        debug!(path = %path.display(), entries = entries.len(), "ledger loaded");
        Ledger {
            path,
            entries,
            index,
        }
    }

    /// Returns true if `id` has already been processed.
    pub fn has(&self, id: &RepoId) -> bool {
        self.index.contains(id)
    }

    /// Appends `entry` and rewrites the backing file.
    ///
    /// The in-memory state is updated before the write, so even if persisting
    /// fails the identifier is not handed out again within this process.
    pub fn record(&mut self, entry: LedgerEntry) -> Result<()> {
        self.index.insert(entry.full_name.clone());
        self.entries.push(entry);

        let bytes = serde_json::to_vec_pretty(&self.entries)?;
        write_atomic(&self.path, &bytes).map_err(|source| LedgerError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Number of entries, counting duplicates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in the order they were recorded.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads and parses the ledger file, degrading to an empty list on any problem.
fn load_entries(path: &Path) -> Vec<LedgerEntry> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read ledger; starting empty");
            return Vec::new();
        }
    };

    if raw.trim().is_empty() {
        return Vec::new();
    }

    let values: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
        Ok(values) => values,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "ledger is not a valid JSON array; starting empty"
            );
            quarantine(path);
            return Vec::new();
        }
    };

    values
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| match serde_json::from_value(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(path = %path.display(), index = i, error = %e, "skipping unreadable ledger entry");
                None
            }
        })
        .collect()
}

/// Moves an unparseable ledger aside so the next write does not destroy it.
fn quarantine(path: &Path) {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".corrupt");
    let target = path.with_file_name(name);

    if let Err(e) = std::fs::rename(path, &target) {
        warn!(path = %path.display(), error = %e, "could not move corrupt ledger aside");
    } else {
        warn!(from = %path.display(), to = %target.display(), "corrupt ledger moved aside");
    }
}
