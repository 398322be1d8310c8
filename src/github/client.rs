//! Octocrab-backed implementation of [`HostingApi`].
//!
//! Search goes through octocrab's raw `_get` so the quota headers on the
//! response can be read; octocrab's typed search API drops them. Search is
//! never retried here: the quota, including the one on a rate-limited error,
//! goes back to the caller's [`QuotaGate`](super::QuotaGate), which waits for
//! the reset. The remaining operations use the typed builders and are wrapped
//! in [`retry_rate_limited`] so secondary rate limits on forks and pull
//! requests are waited out.

use async_trait::async_trait;
use octocrab::Octocrab;
use octocrab::params::repos::Reference;
use tracing::debug;

use super::api::{
    ForkedRepository, HostingApi, PullRequestDraft, PullRequestRef, Result, SearchPage,
    SearchRequest, SearchResponseBody,
};
use super::error::GitHubApiError;
use super::quota::QuotaStatus;
use super::retry::{RetryConfig, retry_rate_limited};
use crate::types::RepoId;

/// A GitHub API client for the whole run.
///
/// Unlike a repository-scoped client, every call names the repository it
/// targets: one run touches many upstreams and their forks.
#[derive(Clone)]
pub struct OctocrabClient {
    client: Octocrab,
    retry: RetryConfig,
}

impl OctocrabClient {
    pub fn new(client: Octocrab) -> Self {
        Self {
            client,
            retry: RetryConfig::RATE_LIMIT,
        }
    }

    /// Creates a client authenticated with a personal access token.
    pub fn from_token(token: impl Into<String>) -> std::result::Result<Self, octocrab::Error> {
        let client = Octocrab::builder().personal_token(token.into()).build()?;
        Ok(Self::new(client))
    }

    /// Creates an unauthenticated client.
    ///
    /// Only useful for dry runs: search works at a much lower quota, and
    /// every mutating call will be rejected.
    pub fn anonymous() -> std::result::Result<Self, octocrab::Error> {
        Ok(Self::new(Octocrab::builder().build()?))
    }

    async fn search_once(&self, uri: &str) -> Result<SearchPage> {
        let response = self
            .client
            ._get(uri)
            .await
            .map_err(GitHubApiError::from_octocrab)?;

        let status = response.status();
        let quota = QuotaStatus::from_headers(response.headers());
        let body = self
            .client
            .body_to_string(response)
            .await
            .map_err(GitHubApiError::from_octocrab)?;

        if !status.is_success() {
            return Err(GitHubApiError::from_status(status.as_u16(), &body).with_quota(quota));
        }

        let parsed: SearchResponseBody = serde_json::from_str(&body).map_err(|e| {
            GitHubApiError::permanent(format!("unexpected search response: {}", e))
        })?;

        Ok(SearchPage {
            items: parsed.items,
            quota,
        })
    }
}

/// Builds the relative URI for a search request.
pub(crate) fn search_uri(request: &SearchRequest) -> String {
    format!(
        "/search/repositories?q={}&sort={}&order={}&per_page={}&page={}",
        urlencoding::encode(&request.query),
        urlencoding::encode(&request.sort),
        urlencoding::encode(&request.order),
        request.per_page,
        request.page
    )
}

#[async_trait]
impl HostingApi for OctocrabClient {
    async fn search_repositories(&self, request: &SearchRequest) -> Result<SearchPage> {
        let uri = search_uri(request);
        debug!(uri = %uri, "searching repositories");
        self.search_once(&uri).await
    }

    async fn fork(&self, upstream: &RepoId) -> Result<ForkedRepository> {
        let client = &self.client;
        let (owner, name) = (upstream.owner.as_str(), upstream.name.as_str());

        let repo = retry_rate_limited(self.retry, "fork", move || async move {
            client
                .repos(owner, name)
                .create_fork()
                .send()
                .await
                .map_err(GitHubApiError::from_octocrab)
        })
        .await?;

        let id = match (&repo.full_name, &repo.owner) {
            (Some(full_name), _) => RepoId::parse(full_name)
                .map_err(|e| GitHubApiError::permanent(e.to_string()))?,
            (None, Some(owner)) => RepoId::new(owner.login.clone(), repo.name.clone()),
            (None, None) => {
                return Err(GitHubApiError::permanent(
                    "fork response carried no owner or full name",
                ));
            }
        };
        let clone_url = repo
            .clone_url
            .as_ref()
            .map(|u| u.to_string())
            .unwrap_or_else(|| format!("https://github.com/{}.git", id));

        Ok(ForkedRepository {
            id,
            clone_url,
            default_branch: repo.default_branch,
        })
    }

    async fn default_branch(&self, repo: &RepoId) -> Result<String> {
        let client = &self.client;
        let (owner, name) = (repo.owner.as_str(), repo.name.as_str());

        let fetched = retry_rate_limited(self.retry, "get repository", move || async move {
            client
                .repos(owner, name)
                .get()
                .await
                .map_err(GitHubApiError::from_octocrab)
        })
        .await?;

        fetched
            .default_branch
            .ok_or_else(|| GitHubApiError::permanent(format!("{} reports no default branch", repo)))
    }

    async fn branch_exists(&self, repo: &RepoId, branch: &str) -> Result<bool> {
        let client = &self.client;
        let (owner, name) = (repo.owner.as_str(), repo.name.as_str());

        let result = retry_rate_limited(self.retry, "get ref", move || async move {
            client
                .repos(owner, name)
                .get_ref(&Reference::Branch(branch.to_string()))
                .await
                .map_err(GitHubApiError::from_octocrab)
        })
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_pull_request(&self, draft: &PullRequestDraft) -> Result<PullRequestRef> {
        let client = &self.client;

        let pr = retry_rate_limited(self.retry, "create pull request", move || async move {
            client
                .pulls(draft.target.owner.as_str(), draft.target.name.as_str())
                .create(draft.title.as_str(), draft.head.as_str(), draft.base.as_str())
                .body(draft.body.as_str())
                .send()
                .await
                .map_err(GitHubApiError::from_octocrab)
        })
        .await?;

        let url = pr
            .html_url
            .as_ref()
            .map(|u| u.to_string())
            .unwrap_or_else(|| format!("https://github.com/{}/pull/{}", draft.target, pr.number));

        Ok(PullRequestRef {
            number: pr.number,
            url,
        })
    }
}

impl std::fmt::Debug for OctocrabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctocrabClient")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
