//! README creation and normalization.

use std::fs;

use async_trait::async_trait;

use super::{DOCKER_WORKFLOW_ADDED, DOCKERFILE_ADDED, WORKFLOW_ADDED, read_optional, write_file};
use crate::pipeline::{PipelineContext, Stage, StageError, StageOutcome, StagePhase};
use crate::types::CandidateRepository;

/// Creates a README when none exists and tidies an existing one.
pub struct ReadmeStage;

#[async_trait]
impl Stage for ReadmeStage {
    fn name(&self) -> &'static str {
        "readme"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Structure
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<StageOutcome, StageError> {
        let Some(name) = find_readme(ctx)? else {
            let content = normalize(&generate(ctx));
            write_file(&ctx.path("README.md"), &content)?;
            ctx.log_task("Created README.md from repository metadata");
            return Ok(StageOutcome::wrote(["README.md"]));
        };

        let path = ctx.path(&name);
        let Some(original) = read_optional(&path)? else {
            return Ok(StageOutcome::unchanged());
        };
        let normalized = normalize(&original);
        if normalized == original {
            return Ok(StageOutcome::unchanged());
        }
        write_file(&path, &normalized)?;
        ctx.log_task(format!("Normalized headings and spacing in {}", name));
        Ok(StageOutcome::wrote([name]))
    }
}

/// Name of the top-level README (`README` or `README.md`, any case).
fn find_readme(ctx: &PipelineContext) -> Result<Option<String>, StageError> {
    let entries = fs::read_dir(&ctx.workdir).map_err(StageError::io(&ctx.workdir))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(StageError::io(&ctx.workdir))?;
        if !entry.path().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            let lower = name.to_ascii_lowercase();
            if lower == "readme" || lower == "readme.md" {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names.into_iter().next())
}

/// Puts exactly one space after heading markers and collapses runs of blank
/// lines to a single blank line. Fenced code blocks are left untouched.
pub(crate) fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0;
    let mut in_fence = false;

    for line in text.split_inclusive('\n') {
        let terminated = line.ends_with('\n');
        let body = line.trim_end_matches(['\n', '\r']);

        if body.trim_start().starts_with("```") {
            in_fence = !in_fence;
        } else if in_fence {
            out.push_str(line);
            newlines = usize::from(terminated);
            continue;
        }

        if body.trim().is_empty() && terminated {
            newlines += 1;
            if newlines <= 2 {
                out.push_str(line);
            }
            continue;
        }
        newlines = usize::from(terminated);

        out.push_str(&normalize_heading(body));
        out.push_str(&line[body.len()..]);
    }
    out
}

fn normalize_heading(line: &str) -> String {
    let hashes = line.len() - line.trim_start_matches('#').len();
    if hashes == 0 {
        return line.to_string();
    }
    let rest = &line[hashes..];
    let title = rest.trim_start();
    if title.len() == rest.len() {
        // `#hashtag` without whitespace is not a heading.
        return line.to_string();
    }
    format!("{} {}", &line[..hashes], title)
}

fn generate(ctx: &PipelineContext) -> String {
    let repo: &CandidateRepository = &ctx.candidate;
    let date = |d: Option<chrono::DateTime<chrono::Utc>>| {
        d.map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    };

    let mut text = format!(
        "# {name}\n\n\
         > This README was generated automatically because the repository did not include one.\n\n\
         {description}\
         ## Project Overview\n\n\
         | Property | Value |\n\
         |---|---|\n\
         | Repository | [{id}]({url}) |\n\
         | Owner | {owner} |\n\
         | Main language | {language} |\n\
         | Created | {created} |\n\
         | Last updated | {updated} |\n",
        name = repo.id.name,
        description = repo
            .description
            .as_deref()
            .map(|d| format!("{}\n\n", d.trim()))
            .unwrap_or_default(),
        id = repo.id,
        url = repo.html_url,
        owner = repo.owner_login,
        language = repo.language.as_deref().unwrap_or("Unknown"),
        created = date(repo.created_at),
        updated = date(repo.pushed_at),
    );

    let mut notes = Vec::new();
    if ctx.has_flag(DOCKERFILE_ADDED) {
        notes.push("A `Dockerfile` was added to enable containerized builds.");
    }
    if ctx.has_flag(DOCKER_WORKFLOW_ADDED) {
        notes.push("A GitHub Actions workflow builds the Docker image on changes.");
    }
    if ctx.has_flag(WORKFLOW_ADDED) {
        notes.push("A GitHub Actions CI workflow runs lint and tests on pushes and pull requests.");
    }
    if !notes.is_empty() {
        text.push_str("\n## Automation\n\n");
        for note in notes {
            text.push_str("- ");
            text.push_str(note);
            text.push('\n');
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RepoId;

    fn context(dir: &tempfile::TempDir) -> PipelineContext {
        let mut candidate = CandidateRepository::minimal(RepoId::new("octo", "widget"));
        candidate.language = Some("JavaScript".to_string());
        candidate.description = Some("Turns sprockets into widgets.".to_string());
        PipelineContext::new(dir.path(), candidate)
    }

    #[test]
    fn headings_get_a_single_space() {
        assert_eq!(normalize("##   Usage\n"), "## Usage\n");
        assert_eq!(normalize("#\tTitle\n"), "# Title\n");
        assert_eq!(normalize("#hashtag\n"), "#hashtag\n");
        assert_eq!(normalize("plain # text\n"), "plain # text\n");
    }

    #[test]
    fn blank_runs_collapse() {
        assert_eq!(normalize("a\n\n\n\n\nb\n"), "a\n\nb\n");
        assert_eq!(normalize("a\n\nb"), "a\n\nb");
        assert_eq!(normalize("a\n   \n\t\n\nb\n"), "a\n   \nb\n");
    }

    #[test]
    fn fenced_code_is_left_alone() {
        let text = "# A\n\n```sh\n#   install deps\nnpm i\n```\n##  B\n";
        assert_eq!(normalize(text), "# A\n\n```sh\n#   install deps\nnpm i\n```\n## B\n");
    }

    #[test]
    fn crlf_endings_survive() {
        assert_eq!(normalize("##  A\r\nbody\r\n"), "## A\r\nbody\r\n");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("#  A\n\n\n\n##B\n###   C\ntext\n\n\n");
        assert_eq!(normalize(&once), once);
    }

    #[tokio::test]
    async fn creates_readme_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(&dir);
        ctx.set_flag(DOCKERFILE_ADDED);

        let outcome = ReadmeStage.run(&mut ctx).await.unwrap();

        assert_eq!(outcome.artifacts, vec!["README.md".to_string()]);
        let readme = fs::read_to_string(dir.path().join("README.md")).unwrap();
        assert!(readme.starts_with("# widget\n"));
        assert!(readme.contains("Turns sprockets into widgets."));
        assert!(readme.contains("| Main language | JavaScript |"));
        assert!(readme.contains("| Created | Unknown |"));
        assert!(readme.contains("`Dockerfile`"));
    }

    #[tokio::test]
    async fn normalizes_existing_readme_in_place() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("readme.md"), "#Widget\n\n\n\n##  Install\n").unwrap();
        let mut ctx = context(&dir);

        let outcome = ReadmeStage.run(&mut ctx).await.unwrap();

        assert_eq!(outcome.artifacts, vec!["readme.md".to_string()]);
        assert_eq!(
            fs::read_to_string(dir.path().join("readme.md")).unwrap(),
            "#Widget\n\n## Install\n"
        );
    }

    #[tokio::test]
    async fn second_run_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(&dir);

        ReadmeStage.run(&mut ctx).await.unwrap();
        let first = fs::read_to_string(dir.path().join("README.md")).unwrap();
        let outcome = ReadmeStage.run(&mut ctx).await.unwrap();

        assert!(outcome.artifacts.is_empty());
        assert_eq!(fs::read_to_string(dir.path().join("README.md")).unwrap(), first);
    }
}
