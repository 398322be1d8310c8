//! Candidate repositories selected by discovery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::RepoId;

/// A repository selected by discovery as eligible for transformation.
///
/// Produced once by the discovery client from a raw search record and then
/// only ever borrowed by acquisition, the pipeline and publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRepository {
    /// The globally unique `owner/name` identifier.
    pub id: RepoId,
    /// HTTPS clone URL of the upstream repository.
    pub clone_url: String,
    /// Browser URL of the upstream repository.
    pub html_url: String,
    /// Default branch as reported at search time.
    ///
    /// Publication re-resolves the default branch before opening a pull
    /// request; this value is only the last-resort fallback.
    pub default_branch: String,
    /// Primary language reported by the platform, if any.
    pub language: Option<String>,
    /// Repository description, if any.
    pub description: Option<String>,
    /// Stargazer count at search time.
    pub stars: u32,
    pub created_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
    /// Login of the owning user or organization.
    pub owner_login: String,
}

impl CandidateRepository {
    /// Returns a minimal candidate, used by tests and dry runs.
    pub fn minimal(id: RepoId) -> Self {
        let clone_url = format!("https://github.com/{}.git", id);
        let html_url = format!("https://github.com/{}", id);
        let owner_login = id.owner.clone();
        CandidateRepository {
            id,
            clone_url,
            html_url,
            default_branch: "main".to_string(),
            language: None,
            description: None,
            stars: 0,
            created_at: None,
            pushed_at: None,
            owner_login,
        }
    }
}
