//! Shared fakes and arbitrary generators for tests.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use proptest::prelude::*;
use tokio::time::Instant;

use crate::command::{CommandOutput, CommandRunner, Invocation};
use crate::generative::{GenerationError, TextGenerator};
use crate::github::{
    ForkedRepository, GitHubApiError, GitHubErrorKind, HostingApi, PullRequestDraft,
    PullRequestRef, QuotaStatus, RawOwner, RawRepository, SearchPage, SearchRequest,
};
use crate::types::RepoId;

pub fn arb_repo_id() -> impl Strategy<Value = RepoId> {
    ("[a-z][a-z0-9-]{0,15}", "[a-z][a-z0-9._-]{0,20}").prop_map(|(o, n)| RepoId::new(o, n))
}

/// A raw search record for `full_name` with plausible defaults.
pub fn raw_repo(full_name: &str) -> RawRepository {
    let owner = full_name.split('/').next().unwrap_or_default().to_string();
    RawRepository {
        full_name: full_name.to_string(),
        clone_url: format!("https://github.com/{}.git", full_name),
        html_url: format!("https://github.com/{}", full_name),
        default_branch: Some("main".to_string()),
        language: Some("JavaScript".to_string()),
        description: Some("A small project".to_string()),
        created_at: None,
        pushed_at: None,
        stargazers_count: 5,
        owner: RawOwner { login: owner },
    }
}

/// A search page containing `full_names`, with no quota information.
pub fn page(full_names: &[&str]) -> SearchPage {
    SearchPage {
        items: full_names.iter().map(|n| raw_repo(n)).collect(),
        quota: None,
    }
}

/// A search page that also reports a quota.
pub fn page_with_quota(full_names: &[&str], quota: QuotaStatus) -> SearchPage {
    SearchPage {
        quota: Some(quota),
        ..page(full_names)
    }
}

fn api_error(kind: GitHubErrorKind, message: &str) -> GitHubApiError {
    let status = match kind {
        GitHubErrorKind::RateLimited => 429,
        GitHubErrorKind::Transient => 502,
        GitHubErrorKind::Permanent => 404,
    };
    GitHubApiError::new(kind, Some(status), message)
}

#[derive(Debug)]
struct FakeHostingState {
    search_script: VecDeque<Result<SearchPage, (GitHubErrorKind, Option<QuotaStatus>)>>,
    search_calls: Vec<(SearchRequest, Instant)>,
    fork_owner: String,
    fork_error: Option<GitHubErrorKind>,
    forks: Vec<RepoId>,
    default_branch: Option<String>,
    taken_branch_names: usize,
    branch_checks: Vec<String>,
    pr_error: Option<GitHubErrorKind>,
    pull_requests: Vec<PullRequestDraft>,
}

/// A scripted [`HostingApi`].
///
/// Search responses are served from a queue; once it is drained every search
/// returns an empty page. Forks, branch checks and pull requests are recorded.
#[derive(Debug)]
pub struct FakeHostingApi {
    state: Mutex<FakeHostingState>,
}

impl Default for FakeHostingApi {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHostingApi {
    pub fn new() -> Self {
        FakeHostingApi {
            state: Mutex::new(FakeHostingState {
                search_script: VecDeque::new(),
                search_calls: Vec::new(),
                fork_owner: "forkbot".to_string(),
                fork_error: None,
                forks: Vec::new(),
                default_branch: Some("main".to_string()),
                taken_branch_names: 0,
                branch_checks: Vec::new(),
                pr_error: None,
                pull_requests: Vec::new(),
            }),
        }
    }

    pub fn with_search_pages(self, pages: impl IntoIterator<Item = SearchPage>) -> Self {
        self.state
            .lock()
            .unwrap()
            .search_script
            .extend(pages.into_iter().map(Ok));
        self
    }

    pub fn with_search_failure(self, kind: GitHubErrorKind) -> Self {
        self.state.lock().unwrap().search_script.push_back(Err((kind, None)));
        self
    }

    /// A rate-limited search response carrying the quota headers GitHub sends.
    pub fn with_rate_limited_search(self, quota: QuotaStatus) -> Self {
        self.state
            .lock()
            .unwrap()
            .search_script
            .push_back(Err((GitHubErrorKind::RateLimited, Some(quota))));
        self
    }

    pub fn failing_fork(self, kind: GitHubErrorKind) -> Self {
        self.state.lock().unwrap().fork_error = Some(kind);
        self
    }

    pub fn failing_pull_request(self, kind: GitHubErrorKind) -> Self {
        self.state.lock().unwrap().pr_error = Some(kind);
        self
    }

    /// `None` makes the default-branch lookup fail.
    pub fn with_default_branch(self, branch: Option<&str>) -> Self {
        self.state.lock().unwrap().default_branch = branch.map(str::to_string);
        self
    }

    /// Reports the first `n` branch lookups as already existing.
    pub fn with_taken_branch_names(self, n: usize) -> Self {
        self.state.lock().unwrap().taken_branch_names = n;
        self
    }

    pub fn search_calls(&self) -> Vec<(SearchRequest, Instant)> {
        self.state.lock().unwrap().search_calls.clone()
    }

    pub fn forks(&self) -> Vec<RepoId> {
        self.state.lock().unwrap().forks.clone()
    }

    pub fn branch_checks(&self) -> Vec<String> {
        self.state.lock().unwrap().branch_checks.clone()
    }

    pub fn pull_requests(&self) -> Vec<PullRequestDraft> {
        self.state.lock().unwrap().pull_requests.clone()
    }
}

#[async_trait]
impl HostingApi for FakeHostingApi {
    async fn search_repositories(
        &self,
        request: &SearchRequest,
    ) -> Result<SearchPage, GitHubApiError> {
        let mut state = self.state.lock().unwrap();
        state.search_calls.push((request.clone(), Instant::now()));
        match state.search_script.pop_front() {
            Some(Ok(page)) => Ok(page),
            Some(Err((kind, quota))) => {
                Err(api_error(kind, "scripted search failure").with_quota(quota))
            }
            None => Ok(SearchPage::default()),
        }
    }

    async fn fork(&self, upstream: &RepoId) -> Result<ForkedRepository, GitHubApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(kind) = state.fork_error {
            return Err(api_error(kind, "scripted fork failure"));
        }
        state.forks.push(upstream.clone());
        let id = RepoId::new(state.fork_owner.clone(), upstream.name.clone());
        Ok(ForkedRepository {
            clone_url: format!("https://github.com/{}.git", id),
            id,
            default_branch: Some("main".to_string()),
        })
    }

    async fn default_branch(&self, _repo: &RepoId) -> Result<String, GitHubApiError> {
        self.state
            .lock()
            .unwrap()
            .default_branch
            .clone()
            .ok_or_else(|| api_error(GitHubErrorKind::Permanent, "Not Found"))
    }

    async fn branch_exists(&self, _repo: &RepoId, branch: &str) -> Result<bool, GitHubApiError> {
        let mut state = self.state.lock().unwrap();
        state.branch_checks.push(branch.to_string());
        Ok(state.branch_checks.len() <= state.taken_branch_names)
    }

    async fn create_pull_request(
        &self,
        draft: &PullRequestDraft,
    ) -> Result<PullRequestRef, GitHubApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(kind) = state.pr_error {
            return Err(api_error(kind, "scripted pull request failure"));
        }
        state.pull_requests.push(draft.clone());
        let number = state.pull_requests.len() as u64;
        Ok(PullRequestRef {
            number,
            url: format!("https://github.com/{}/pull/{}", draft.target, number),
        })
    }
}

type Responder = Box<dyn Fn(&Invocation, &Path) -> io::Result<CommandOutput> + Send + Sync>;

/// A [`CommandRunner`] that answers from a list of rules.
///
/// A rule pattern is `[program, args...]`; it matches when the program is
/// equal and the arguments appear contiguously in the invocation. Rules are
/// tried in registration order. Unmatched invocations succeed with empty
/// output. Every invocation is recorded with its working directory.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<(Vec<String>, Responder)>,
    calls: Mutex<Vec<(Invocation, PathBuf)>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, pattern: &[&str], output: CommandOutput) -> Self {
        self.respond_with(pattern, move |_, _| Ok(output.clone()))
    }

    pub fn respond_with<F>(mut self, pattern: &[&str], responder: F) -> Self
    where
        F: Fn(&Invocation, &Path) -> io::Result<CommandOutput> + Send + Sync + 'static,
    {
        self.rules.push((
            pattern.iter().map(|s| s.to_string()).collect(),
            Box::new(responder),
        ));
        self
    }

    pub fn calls(&self) -> Vec<(Invocation, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called_with(&self, pattern: &[&str]) -> bool {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .any(|(inv, _)| rule_matches(pattern, inv))
    }
}

fn rule_matches<S: AsRef<str>>(pattern: &[S], invocation: &Invocation) -> bool {
    let Some((program, args)) = pattern.split_first() else {
        return true;
    };
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    invocation.program == program.as_ref() && invocation.has_args(&args)
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation, workdir: &Path) -> io::Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((invocation.clone(), workdir.to_path_buf()));
        for (pattern, responder) in &self.rules {
            if rule_matches(pattern, invocation) {
                return responder(invocation, workdir);
            }
        }
        Ok(CommandOutput::ok(""))
    }
}

/// Makes `git clone` create the destination directory, like the real thing.
pub fn cloning_runner() -> ScriptedRunner {
    ScriptedRunner::new().respond_with(&["git", "clone"], |inv, workdir| {
        let dest = inv.args.last().cloned().unwrap_or_default();
        std::fs::create_dir_all(workdir.join(dest))?;
        Ok(CommandOutput::ok(""))
    })
}

/// A [`TextGenerator`] with a canned reply.
#[derive(Debug, Default)]
pub struct FakeGenerator {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn replying(reply: impl Into<String>) -> Self {
        FakeGenerator {
            reply: Some(reply.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A generator whose every call fails.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply
            .clone()
            .ok_or(GenerationError::EmptyResponse)
    }
}
