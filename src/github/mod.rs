//! Hosting platform access.
//!
//! - [`HostingApi`] is the seam every other module talks to
//! - [`OctocrabClient`] implements it against the GitHub REST API
//! - Errors are classified as rate-limited, transient or permanent; only
//!   rate limits are retried
//! - [`QuotaGate`] waits out an exhausted search quota before the next request

mod api;
mod client;
mod error;
mod quota;
mod retry;

pub use api::{
    ForkedRepository, HostingApi, PullRequestDraft, PullRequestRef, RawOwner, RawRepository,
    SearchPage, SearchRequest,
};
pub use client::OctocrabClient;
pub use error::{GitHubApiError, GitHubErrorKind};
pub use quota::{QuotaGate, QuotaStatus};
pub use retry::{RetryConfig, retry_rate_limited};
