//! Pull request title and body assembly.

use rand::Rng;
use rand::seq::IndexedRandom;

use crate::git::FileChange;
use crate::pipeline::{PipelineContext, StageResult};
use crate::stages::{DOCKER_WORKFLOW_ADDED, DOCKERFILE_ADDED, WORKFLOW_ADDED};

/// Longest report excerpt embedded in a body, in characters.
pub const MAX_REPORT_CHARS: usize = 2000;
const TRUNCATION_MARKER: &str = "\n... (truncated)";

const TITLES: &[&str] = &[
    "Refactor and enhance project structure and formatting",
    "Improve code consistency and documentation clarity",
    "Apply standardized formatting and update README content",
    "Enhance code readability with formatting improvements",
    "Update documentation and streamline structure",
    "Improve formatting across source and configuration files",
    "Refine codebase with consistent styling and comments",
    "Modernize formatting and align with best practices",
    "Enhance clarity and structure across code and docs",
    "Apply formatting adjustments and documentation improvements",
    "Unify styling and improve overall codebase organization",
];

pub fn choose_title<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    TITLES.choose(rng).copied().unwrap_or(TITLES[0])
}

/// Cuts `text` to `max` characters, marking the cut.
pub fn truncate_report(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Renders the pull request description.
pub fn render_body(
    ctx: &PipelineContext,
    results: &[StageResult],
    changes: &[FileChange],
    shortstat: &str,
) -> String {
    let mut sections = Vec::new();

    let summary = if shortstat.trim().is_empty() {
        "No stats available.".to_string()
    } else {
        shortstat.trim().to_string()
    };
    sections.push(format!("## Summary\n\n> {}", summary));

    let files: Vec<String> = changes
        .iter()
        .map(|c| format!("- {} `{}`", c.kind.as_str(), c.path))
        .collect();
    sections.push(format!("### Changed files\n\n{}", files.join("\n")));

    if !ctx.task_log.is_empty() {
        sections.push(format!("### Task log\n\n{}", bullets(&ctx.task_log)));
    }

    let notes: Vec<&str> = [
        (DOCKERFILE_ADDED, "Added `Dockerfile`."),
        (DOCKER_WORKFLOW_ADDED, "Added GitHub Actions Docker workflow."),
        (WORKFLOW_ADDED, "Added GitHub Actions CI workflow."),
    ]
    .into_iter()
    .filter(|(flag, _)| ctx.has_flag(flag))
    .map(|(_, note)| note)
    .collect();
    if !notes.is_empty() {
        sections.push(format!("### Notes\n\n{}", bullets(&notes)));
    }

    for report in &ctx.reports {
        sections.push(format!(
            "### {}\n\n```markdown\n{}\n```",
            report.title,
            truncate_report(report.body.trim(), MAX_REPORT_CHARS)
        ));
    }

    if !ctx.failures.is_empty() {
        let failures: Vec<String> = ctx
            .failures
            .iter()
            .map(|f| format!("`{}`: {}", f.stage, f.error))
            .collect();
        sections.push(format!("### Stage failures\n\n{}", bullets(&failures)));
    }

    let succeeded = results.iter().filter(|r| r.success).count();
    sections.push(format!(
        "---\n\n_{} of {} stages completed. Opened automatically by forkbot._",
        succeeded,
        results.len()
    ));

    sections.join("\n\n") + "\n"
}

fn bullets<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|i| format!("- {}", i.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}
