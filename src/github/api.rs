//! The hosting API seam.
//!
//! Everything the run needs from the hosting platform goes through
//! [`HostingApi`], so discovery, acquisition and publication can be driven by
//! a scripted fake in tests and by [`OctocrabClient`](super::OctocrabClient)
//! in production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::error::GitHubApiError;
use super::quota::QuotaStatus;
use crate::types::{CandidateRepository, InvalidRepoId, RepoId};

/// Result type for hosting API calls.
pub type Result<T> = std::result::Result<T, GitHubApiError>;

/// One repository search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// The full search query (`language:X stars:A..B ...`).
    pub query: String,
    /// Sort key, e.g. `updated`.
    pub sort: String,
    /// `asc` or `desc`.
    pub order: String,
    pub per_page: u32,
    /// 1-based page number.
    pub page: u32,
}

/// One page of search results plus the quota reported with it.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub items: Vec<RawRepository>,
    pub quota: Option<QuotaStatus>,
}

/// Owner sub-object of a raw repository record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawOwner {
    pub login: String,
}

/// A repository record exactly as the search endpoint returns it.
///
/// Only the fields discovery projects are declared; everything else in the
/// payload is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawRepository {
    pub full_name: String,
    pub clone_url: String,
    pub html_url: String,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stargazers_count: u32,
    pub owner: RawOwner,
}

impl TryFrom<RawRepository> for CandidateRepository {
    type Error = InvalidRepoId;

    fn try_from(raw: RawRepository) -> std::result::Result<Self, Self::Error> {
        let id = RepoId::parse(&raw.full_name)?;
        Ok(CandidateRepository {
            id,
            clone_url: raw.clone_url,
            html_url: raw.html_url,
            default_branch: raw.default_branch.unwrap_or_else(|| "main".to_string()),
            language: raw.language,
            description: raw.description,
            stars: raw.stargazers_count,
            created_at: raw.created_at,
            pushed_at: raw.pushed_at,
            owner_login: raw.owner.login,
        })
    }
}

/// Body of a search response.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponseBody {
    #[serde(default)]
    pub items: Vec<RawRepository>,
}

/// The fork created (or already existing) under the authenticated account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkedRepository {
    pub id: RepoId,
    pub clone_url: String,
    pub default_branch: Option<String>,
}

/// A pull request to open against the upstream repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDraft {
    /// The upstream repository receiving the pull request.
    pub target: RepoId,
    /// `forkowner:branch`.
    pub head: String,
    /// Base branch on the upstream repository.
    pub base: String,
    pub title: String,
    pub body: String,
}

/// Reference to an opened pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRef {
    pub number: u64,
    pub url: String,
}

/// Operations the run performs against the hosting platform.
#[async_trait]
pub trait HostingApi: Send + Sync {
    /// Fetches one page of repository search results.
    async fn search_repositories(&self, request: &SearchRequest) -> Result<SearchPage>;

    /// Forks `upstream` into the authenticated account.
    ///
    /// Forking an already-forked repository returns the existing fork.
    async fn fork(&self, upstream: &RepoId) -> Result<ForkedRepository>;

    /// Returns the current default branch of `repo`.
    async fn default_branch(&self, repo: &RepoId) -> Result<String>;

    /// Returns true if `branch` exists on `repo`.
    async fn branch_exists(&self, repo: &RepoId, branch: &str) -> Result<bool>;

    /// Opens a pull request.
    async fn create_pull_request(&self, draft: &PullRequestDraft) -> Result<PullRequestRef>;
}
