//! Request-quota tracking for the search API.
//!
//! GitHub reports the remaining request budget and the epoch second at which
//! it resets in `x-ratelimit-remaining` / `x-ratelimit-reset` response
//! headers. The [`QuotaGate`] remembers the most recent values and, when the
//! budget drops below a safety threshold, suspends the caller until the reset
//! time before the next request is sent. The wait is a single scheduled sleep.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use http::HeaderMap;
use tracing::{debug, warn};

/// Header carrying the remaining request count.
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Header carrying the reset time as Unix epoch seconds.
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Grace period added after the reported reset time.
const RESET_GRACE: Duration = Duration::from_secs(1);

/// A snapshot of the API request quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl QuotaStatus {
    pub fn new(remaining: u32, reset_at: DateTime<Utc>) -> Self {
        Self {
            remaining,
            reset_at,
        }
    }

    /// Parses quota headers. Returns `None` when either header is missing or malformed.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let remaining = header_number(headers, REMAINING_HEADER)?;
        let reset_epoch = header_number(headers, RESET_HEADER)?;
        let reset_at = Utc.timestamp_opt(reset_epoch as i64, 0).single()?;
        Some(Self::new(u32::try_from(remaining).ok()?, reset_at))
    }

    /// How long to wait before the next request, if the budget is below `threshold`.
    ///
    /// Returns `None` when there is enough budget or the reset time has passed.
    pub fn required_wait(&self, threshold: u32, now: DateTime<Utc>) -> Option<Duration> {
        if self.remaining >= threshold {
            return None;
        }
        self.until_reset(now)
    }

    /// Time left until the reset plus grace, or `None` if it already passed.
    pub fn until_reset(&self, now: DateTime<Utc>) -> Option<Duration> {
        let until_reset = (self.reset_at - now).to_std().ok()?;
        Some(until_reset + RESET_GRACE)
    }
}

fn header_number(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Holds back the next request while the quota is nearly exhausted.
#[derive(Debug, Clone)]
pub struct QuotaGate {
    threshold: u32,
    last: Option<QuotaStatus>,
}

impl QuotaGate {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            last: None,
        }
    }

    /// Records the quota reported by the latest response.
    ///
    /// A response without quota headers leaves the previous observation in place.
    pub fn observe(&mut self, status: Option<QuotaStatus>) {
        if let Some(status) = status {
            debug!(remaining = status.remaining, reset_at = %status.reset_at, "quota observed");
            self.last = Some(status);
        }
    }

    /// The most recent observation, if any.
    pub fn last(&self) -> Option<QuotaStatus> {
        self.last
    }

    /// Sleeps until the quota resets if the last observation is below threshold.
    ///
    /// Returns the time waited. After waiting, the stale observation is cleared
    /// so the next response re-establishes the budget.
    pub async fn wait_if_exhausted(&mut self) -> Duration {
        let Some(status) = self.last else {
            return Duration::ZERO;
        };
        let Some(wait) = status.required_wait(self.threshold, Utc::now()) else {
            return Duration::ZERO;
        };

        warn!(
            remaining = status.remaining,
            threshold = self.threshold,
            wait_secs = wait.as_secs(),
            reset_at = %status.reset_at,
            "approaching API rate limit; waiting for quota reset"
        );
        tokio::time::sleep(wait).await;
        self.last = None;
        wait
    }

    /// Sleeps until `status` resets, whatever the threshold.
    ///
    /// Used after the API has already refused a request for quota.
    pub async fn wait_for_reset(&mut self, status: QuotaStatus) -> Duration {
        let wait = status.until_reset(Utc::now()).unwrap_or(Duration::ZERO);
        if !wait.is_zero() {
            warn!(
                wait_secs = wait.as_secs(),
                reset_at = %status.reset_at,
                "rate limited; waiting for quota reset"
            );
            tokio::time::sleep(wait).await;
        }
        self.last = None;
        wait
    }
}
