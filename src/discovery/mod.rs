//! Candidate discovery.
//!
//! One discovery pass runs a query per configured language, samples two
//! adjacent result pages starting at a random page, shuffles each page and
//! drops anything already in the ledger. Randomness comes from a single
//! seeded [`StdRng`], so a run is reproducible from its seed given the same
//! search responses.
//!
//! Search failures never abort the pass: a failed page is logged and skipped.
//! Quota exhaustion is handled by the [`QuotaGate`], which holds back the next
//! request until the reported reset time. A page refused for quota is fetched
//! again once, after the reset it reported.

pub mod query;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::github::{GitHubErrorKind, HostingApi, QuotaGate, RawRepository, SearchRequest};
use crate::ledger::Ledger;
use crate::types::CandidateRepository;

use self::query::{QueryFilters, build_query, staleness_cutoff};

/// Errors from configuring discovery.
///
/// Searching itself never fails; these are raised when the client is built.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no languages configured")]
    NoLanguages,

    #[error("star range {min}..{max} is empty")]
    EmptyStarRange { min: u32, max: u32 },

    #[error("page window and page size must be at least 1")]
    EmptyPaging,

    #[error("cannot compute a date {months} months before {today}")]
    Cutoff { months: u32, today: NaiveDate },
}

/// Result type for discovery setup.
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Search criteria and limits for one discovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverySettings {
    pub languages: Vec<String>,
    pub min_stars: u32,
    pub max_stars: u32,
    /// Repositories pushed within this many months are skipped.
    pub stale_months: u32,
    pub license: String,
    pub per_page: u32,
    /// The first sampled page is drawn uniformly from `1..=page_window`.
    pub page_window: u32,
    /// Stop collecting once this many candidates are found.
    pub max_candidates: usize,
    pub quota_threshold: u32,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        DiscoverySettings {
            languages: vec!["JavaScript".to_string(), "TypeScript".to_string()],
            min_stars: 3,
            max_stars: 10,
            stale_months: 6,
            license: "mit".to_string(),
            per_page: 30,
            page_window: 29,
            max_candidates: 10,
            quota_threshold: 5,
        }
    }
}

/// Finds candidate repositories through the hosting API.
pub struct DiscoveryClient {
    api: Arc<dyn HostingApi>,
    settings: DiscoverySettings,
    filters: QueryFilters,
    rng: StdRng,
    gate: QuotaGate,
}

impl DiscoveryClient {
    /// Validates `settings` and fixes the staleness cutoff relative to `today`.
    pub fn new(
        api: Arc<dyn HostingApi>,
        settings: DiscoverySettings,
        today: NaiveDate,
        rng: StdRng,
    ) -> Result<Self> {
        if settings.languages.is_empty() {
            return Err(DiscoveryError::NoLanguages);
        }
        if settings.min_stars > settings.max_stars {
            return Err(DiscoveryError::EmptyStarRange {
                min: settings.min_stars,
                max: settings.max_stars,
            });
        }
        if settings.page_window == 0 || settings.per_page == 0 {
            return Err(DiscoveryError::EmptyPaging);
        }
        let pushed_before =
            staleness_cutoff(today, settings.stale_months).ok_or(DiscoveryError::Cutoff {
                months: settings.stale_months,
                today,
            })?;

        let filters = QueryFilters {
            min_stars: settings.min_stars,
            max_stars: settings.max_stars,
            pushed_before,
            license: settings.license.clone(),
        };
        let gate = QuotaGate::new(settings.quota_threshold);

        Ok(DiscoveryClient {
            api,
            settings,
            filters,
            rng,
            gate,
        })
    }

    /// Runs one discovery pass.
    ///
    /// Returns candidates not present in `ledger`, each identifier at most
    /// once, in shuffled order, capped at `max_candidates`.
    #[instrument(skip_all)]
    pub async fn search(&mut self, ledger: &Ledger) -> Vec<CandidateRepository> {
        let mut found: Vec<CandidateRepository> = Vec::new();
        let mut seen = HashSet::new();
        let cap = self.settings.max_candidates;

        let languages = self.settings.languages.clone();
        'languages: for language in &languages {
            let query = build_query(language, &self.filters);
            let first = self.rng.random_range(1..=self.settings.page_window);

            for page in [first, first.saturating_add(1)] {
                if found.len() >= cap {
                    break 'languages;
                }

                let request = SearchRequest {
                    query: query.clone(),
                    sort: "updated".to_string(),
                    order: "asc".to_string(),
                    per_page: self.settings.per_page,
                    page,
                };
                let Some(mut items) = self.fetch_page(language, &request).await else {
                    continue;
                };

                if items.is_empty() {
                    info!(language = %language, page, "no results");
                    continue;
                }

                items.shuffle(&mut self.rng);

                for raw in items {
                    if found.len() >= cap {
                        break;
                    }
                    let full_name = raw.full_name.clone();
                    let candidate = match CandidateRepository::try_from(raw) {
                        Ok(c) => c,
                        Err(e) => {
                            warn!(full_name = %full_name, error = %e, "skipping malformed search result");
                            continue;
                        }
                    };
                    if ledger.has(&candidate.id) {
                        debug!(repo = %candidate.id, "already processed");
                        continue;
                    }
                    if !seen.insert(candidate.id.clone()) {
                        continue;
                    }
                    found.push(candidate);
                }
            }
        }

        info!(count = found.len(), "discovery complete");
        for (i, c) in found.iter().enumerate() {
            info!(rank = i + 1, repo = %c.id, stars = c.stars, "candidate");
        }
        found
    }
}

impl DiscoveryClient {
    /// Fetches one page, honouring the quota gate.
    ///
    /// A rate-limited response that reports its reset is retried once after
    /// the reset. Any other failure is logged and the page skipped.
    async fn fetch_page(&mut self, language: &str, request: &SearchRequest) -> Option<Vec<RawRepository>> {
        let mut waited_for_reset = false;
        loop {
            self.gate.wait_if_exhausted().await;

            let e = match self.api.search_repositories(request).await {
                Ok(result) => {
                    self.gate.observe(result.quota);
                    return Some(result.items);
                }
                Err(e) => e,
            };

            if e.kind == GitHubErrorKind::RateLimited
                && !waited_for_reset
                && let Some(quota) = e.quota
            {
                warn!(language = %language, page = request.page, error = %e, "search rate limited");
                self.gate.wait_for_reset(quota).await;
                waited_for_reset = true;
                continue;
            }

            self.gate.observe(e.quota);
            warn!(
                language = %language,
                page = request.page,
                kind = ?e.kind,
                error = %e,
                "search failed; skipping page"
            );
            return None;
        }
    }
}

impl std::fmt::Debug for DiscoveryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryClient")
            .field("settings", &self.settings)
            .field("filters", &self.filters)
            .finish_non_exhaustive()
    }
}
