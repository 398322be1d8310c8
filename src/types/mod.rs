//! Core domain types shared across discovery, the pipeline and the ledger.

pub mod candidate;
pub mod ids;
pub mod outcome;

pub use candidate::CandidateRepository;
pub use ids::{InvalidRepoId, RepoId};
pub use outcome::{LedgerEntry, RunOutcome};
