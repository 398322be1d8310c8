//! Process-wide configuration.
//!
//! Every option can be given as a flag or through a `FORKBOT_*` environment
//! variable (credentials use their conventional names). `.env` files are
//! loaded by the binary before parsing. The parsed [`Args`] are validated once
//! into an immutable [`RunConfig`].

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::discovery::DiscoverySettings;
use crate::git::CommitIdentity;

/// The search API serves at most this many results per query.
pub const SEARCH_RESULT_LIMIT: u32 = 1000;

/// Configuration problems detected before any network call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one language is required")]
    NoLanguages,

    #[error("min stars ({min}) is greater than max stars ({max})")]
    StarRange { min: u32, max: u32 },

    #[error("per-page ({per_page}) must be between 1 and 100")]
    PerPage { per_page: u32 },

    #[error("page window must be at least 1")]
    PageWindow,

    #[error(
        "pages up to {last_page} of {per_page} results reach past the search API's {limit}-result limit"
    )]
    PagingBeyondLimit { per_page: u32, last_page: u32, limit: u32 },

    #[error("a live run needs GITHUB_TOKEN; pass --dry-run to run without one")]
    MissingToken,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "forkbot", version, about)]
pub struct Args {
    /// Languages to search, comma-separated.
    #[arg(
        long,
        env = "FORKBOT_LANGUAGES",
        value_delimiter = ',',
        default_value = "JavaScript,TypeScript"
    )]
    pub languages: Vec<String>,

    #[arg(long, env = "FORKBOT_MIN_STARS", default_value_t = 3)]
    pub min_stars: u32,

    #[arg(long, env = "FORKBOT_MAX_STARS", default_value_t = 10)]
    pub max_stars: u32,

    /// Only repositories with no push for this many months are considered.
    #[arg(long, env = "FORKBOT_STALE_MONTHS", default_value_t = 6)]
    pub stale_months: u32,

    /// Required license key, as used by the search API.
    #[arg(long, env = "FORKBOT_LICENSE", default_value = "mit")]
    pub license: String,

    #[arg(long, env = "FORKBOT_PER_PAGE", default_value_t = 30)]
    pub per_page: u32,

    /// The first page fetched per language is drawn from 1..=window.
    #[arg(long, env = "FORKBOT_PAGE_WINDOW", default_value_t = 29)]
    pub page_window: u32,

    #[arg(long, env = "FORKBOT_MAX_CANDIDATES", default_value_t = 10)]
    pub max_candidates: usize,

    /// Wait for the quota reset when fewer requests than this remain.
    #[arg(long, env = "FORKBOT_QUOTA_THRESHOLD", default_value_t = 5)]
    pub quota_threshold: u32,

    /// Run the pipeline and commit locally, but never fork, push or open PRs.
    #[arg(long, env = "FORKBOT_DRY_RUN")]
    pub dry_run: bool,

    #[arg(long, env = "FORKBOT_WORK_DIR", default_value = "forks")]
    pub work_dir: PathBuf,

    #[arg(long, env = "FORKBOT_LEDGER", default_value = "fork-log.json")]
    pub ledger: PathBuf,

    /// Pause between candidates, in seconds.
    #[arg(long, env = "FORKBOT_DELAY_SECS", default_value_t = 2)]
    pub delay_secs: u64,

    /// Pause between forking and cloning, in milliseconds.
    #[arg(long, env = "FORKBOT_CLONE_DELAY_MS", default_value_t = 1500)]
    pub clone_delay_ms: u64,

    /// Seed for page sampling, shuffling and titles. Drawn at random when
    /// absent.
    #[arg(long, env = "FORKBOT_SEED")]
    pub seed: Option<u64>,

    #[arg(long, env = "FORKBOT_GIT_NAME", default_value = "forkbot")]
    pub git_name: String,

    #[arg(
        long,
        env = "FORKBOT_GIT_EMAIL",
        default_value = "forkbot@users.noreply.github.com"
    )]
    pub git_email: String,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "FORKBOT_MODEL", default_value = "gpt-3.5-turbo")]
    pub model: String,

    /// Chat-completions endpoint, for OpenAI-compatible servers.
    #[arg(long, env = "FORKBOT_OPENAI_ENDPOINT")]
    pub openai_endpoint: Option<String>,

    /// Timeout for a single generation request, in seconds.
    #[arg(long, env = "FORKBOT_GENERATION_TIMEOUT_SECS", default_value_t = 60)]
    pub generation_timeout_secs: u64,

    /// Stage names to disable, comma-separated.
    #[arg(long, env = "FORKBOT_SKIP_STAGES", value_delimiter = ',')]
    pub skip_stages: Vec<String>,

    /// Fail any stage that runs longer than this many seconds.
    #[arg(long, env = "FORKBOT_STAGE_TIMEOUT_SECS")]
    pub stage_timeout_secs: Option<u64>,

    #[arg(long, env = "FORKBOT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Validated settings for one run.
#[derive(Clone)]
pub struct RunConfig {
    pub discovery: DiscoverySettings,
    pub dry_run: bool,
    pub work_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub candidate_delay: Duration,
    pub clone_delay: Duration,
    pub seed: u64,
    pub identity: CommitIdentity,
    pub github_token: Option<String>,
    pub openai_api_key: Option<String>,
    pub model: String,
    pub openai_endpoint: Option<String>,
    pub generation_timeout: Duration,
    pub skip_stages: Vec<String>,
    pub stage_timeout: Option<Duration>,
}

impl Args {
    /// Validates the arguments. A missing seed is drawn from entropy.
    pub fn into_config(self) -> Result<RunConfig, ConfigError> {
        let languages = clean_list(self.languages);
        if languages.is_empty() {
            return Err(ConfigError::NoLanguages);
        }
        if self.min_stars > self.max_stars {
            return Err(ConfigError::StarRange {
                min: self.min_stars,
                max: self.max_stars,
            });
        }
        if !(1..=100).contains(&self.per_page) {
            return Err(ConfigError::PerPage {
                per_page: self.per_page,
            });
        }
        if self.page_window == 0 {
            return Err(ConfigError::PageWindow);
        }
        // The second sampled page is window + 1.
        let last_page = self.page_window.saturating_add(1);
        if last_page.saturating_mul(self.per_page) > SEARCH_RESULT_LIMIT {
            return Err(ConfigError::PagingBeyondLimit {
                per_page: self.per_page,
                last_page,
                limit: SEARCH_RESULT_LIMIT,
            });
        }

        let github_token = self.github_token.filter(|t| !t.trim().is_empty());
        if github_token.is_none() && !self.dry_run {
            return Err(ConfigError::MissingToken);
        }

        Ok(RunConfig {
            discovery: DiscoverySettings {
                languages,
                min_stars: self.min_stars,
                max_stars: self.max_stars,
                stale_months: self.stale_months,
                license: self.license,
                per_page: self.per_page,
                page_window: self.page_window,
                max_candidates: self.max_candidates,
                quota_threshold: self.quota_threshold,
            },
            dry_run: self.dry_run,
            work_dir: self.work_dir,
            ledger_path: self.ledger,
            candidate_delay: Duration::from_secs(self.delay_secs),
            clone_delay: Duration::from_millis(self.clone_delay_ms),
            seed: self.seed.unwrap_or_else(rand::random),
            identity: CommitIdentity {
                name: self.git_name,
                email: self.git_email,
            },
            github_token,
            openai_api_key: self.openai_api_key.filter(|k| !k.trim().is_empty()),
            model: self.model,
            openai_endpoint: self.openai_endpoint.filter(|e| !e.trim().is_empty()),
            generation_timeout: Duration::from_secs(self.generation_timeout_secs),
            skip_stages: clean_list(self.skip_stages),
            stage_timeout: self.stage_timeout_secs.map(Duration::from_secs),
        })
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl std::fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("RunConfig")
            .field("discovery", &self.discovery)
            .field("dry_run", &self.dry_run)
            .field("work_dir", &self.work_dir)
            .field("ledger_path", &self.ledger_path)
            .field("candidate_delay", &self.candidate_delay)
            .field("clone_delay", &self.clone_delay)
            .field("seed", &self.seed)
            .field("identity", &self.identity)
            .field("github_token", &redact(&self.github_token))
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("model", &self.model)
            .field("openai_endpoint", &self.openai_endpoint)
            .field("generation_timeout", &self.generation_timeout)
            .field("skip_stages", &self.skip_stages)
            .field("stage_timeout", &self.stage_timeout)
            .finish()
    }
}
