//! Hosting API error types.
//!
//! Errors are classified by how the caller should react:
//!
//! - **RateLimited**: the request quota is exhausted. This is the only kind
//!   that is retried, by waiting for the quota window to reset.
//! - **Transient**: network blips and 5xx responses. Logged, and the current
//!   page or candidate is skipped. Never retried within a run.
//! - **Permanent**: 4xx responses such as a deleted repository or a forbidden
//!   fork. Terminal for the candidate that hit them.

use std::fmt;

use thiserror::Error;

use super::quota::QuotaStatus;

/// The kind of hosting API error, categorized for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitHubErrorKind {
    /// Quota exhausted (HTTP 429, or 403 with rate-limit wording).
    RateLimited,

    /// Network failure or server-side error.
    Transient,

    /// Client-side error that will fail the same way on every attempt.
    Permanent,
}

impl GitHubErrorKind {
    /// Returns true if this error should be retried after a wait.
    pub fn is_retriable(&self) -> bool {
        matches!(self, GitHubErrorKind::RateLimited)
    }
}

/// A hosting API error with categorization for retry decisions.
#[derive(Debug, Error)]
pub struct GitHubApiError {
    pub kind: GitHubErrorKind,

    /// The HTTP status code, if available.
    pub status_code: Option<u16>,

    /// A human-readable description of the error.
    pub message: String,

    /// Quota headers from the failing response, if it carried any.
    pub quota: Option<QuotaStatus>,

    /// The underlying octocrab error, if available.
    #[source]
    pub source: Option<octocrab::Error>,
}

impl fmt::Display for GitHubApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "GitHub API error (HTTP {}): {}", code, self.message),
            None => write!(f, "GitHub API error: {}", self.message),
        }
    }
}

impl GitHubApiError {
    pub fn new(kind: GitHubErrorKind, status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status_code,
            message: message.into(),
            quota: None,
            source: None,
        }
    }

    /// Attaches the quota reported alongside this error.
    pub fn with_quota(mut self, quota: Option<QuotaStatus>) -> Self {
        self.quota = quota;
        self
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(GitHubErrorKind::Permanent, None, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(GitHubErrorKind::Transient, None, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(GitHubErrorKind::RateLimited, None, message)
    }

    /// Returns true if the error is an HTTP 404.
    pub fn is_not_found(&self) -> bool {
        self.status_code == Some(404)
    }

    /// Categorizes a raw HTTP status with its response body.
    ///
    /// Used where the response was read directly (search), so the status is
    /// known exactly and no string parsing is needed.
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = classify(Some(status), body);
        let message = summarize_body(body);
        Self::new(kind, Some(status), message)
    }

    /// Categorizes an octocrab error.
    pub fn from_octocrab(err: octocrab::Error) -> Self {
        let status_code = extract_status_code(&err);
        let message = err.to_string();
        let kind = classify(status_code, &message);
        Self {
            kind,
            status_code,
            message,
            quota: None,
            source: Some(err),
        }
    }
}

fn classify(status_code: Option<u16>, message: &str) -> GitHubErrorKind {
    match status_code {
        Some(429) => GitHubErrorKind::RateLimited,
        Some(403) if is_rate_limit_error(message) => GitHubErrorKind::RateLimited,
        Some(code) if (500..600).contains(&code) => GitHubErrorKind::Transient,
        Some(_) => GitHubErrorKind::Permanent,
        None if is_rate_limit_error(message) => GitHubErrorKind::RateLimited,
        None if is_network_error(message) => GitHubErrorKind::Transient,
        None => GitHubErrorKind::Permanent,
    }
}

/// Pulls the `message` field out of a GitHub JSON error body, if present.
fn summarize_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().chars().take(200).collect())
}

/// Extracts the HTTP status code from an octocrab error, if present.
///
/// Octocrab does not expose the status uniformly across its error variants,
/// so this falls back to matching the rendered message. An unrecognized
/// message yields `None`, which classifies conservatively.
fn extract_status_code(err: &octocrab::Error) -> Option<u16> {
    if let octocrab::Error::GitHub { source, .. } = err {
        return Some(source.status_code.as_u16());
    }

    let err_str = err.to_string();
    if let Some(idx) = err_str.find("status: ") {
        let digits: String = err_str[idx + 8..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(code) = digits.parse() {
            return Some(code);
        }
    }

    let lower = err_str.to_lowercase();
    [
        (404, "not found"),
        (403, "forbidden"),
        (401, "unauthorized"),
        (422, "unprocessable"),
        (429, "too many requests"),
    ]
    .into_iter()
    .find(|(code, text)| err_str.contains(&code.to_string()) || lower.contains(text))
    .map(|(code, _)| code)
}

/// Checks if an error message indicates a rate limit.
fn is_rate_limit_error(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("rate limit")
        || message_lower.contains("api rate")
        || message_lower.contains("secondary rate")
        || message_lower.contains("abuse detection")
}

/// Checks if an error message indicates a network-level error.
fn is_network_error(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("timeout")
        || message_lower.contains("connection")
        || message_lower.contains("network")
        || message_lower.contains("dns")
        || message_lower.contains("timed out")
}
