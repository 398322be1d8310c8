//! Code quality review of the candidate's sources.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{read_optional, relative_display, source_files, write_file};
use crate::generative::{GenerationError, TextGenerator};
use crate::pipeline::{PipelineContext, Stage, StageError, StageOutcome, StagePhase};

const REPORT_PATH: &str = "code-review-report.md";
const REPORT_TITLE: &str = "Code Quality Analysis";
const SOURCE_EXTENSIONS: &[&str] = &["js", "ts", "jsx", "tsx"];

/// Files longer than this are assumed to be generated or bundled.
const MAX_FILE_CHARS: usize = 30_000;
const CHUNK_CHARS: usize = 4_000;
const MAX_REVIEW_FILES: usize = 20;

/// Writes `code-review-report.md` and hands the text to publication.
///
/// With a generator each source file is reviewed in chunks. Without one the
/// report is a fixed checklist, so runs without an API key still produce a
/// useful artifact.
pub struct QualityReportStage {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl QualityReportStage {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        QualityReportStage { generator }
    }
}

/// A source file worth reviewing, with its content.
struct SourceFile {
    relative: String,
    content: String,
}

#[async_trait]
impl Stage for QualityReportStage {
    fn name(&self) -> &'static str {
        "quality-report"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Content
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<StageOutcome, StageError> {
        let files = reviewable_files(ctx)?;
        if files.is_empty() {
            info!("no reviewable source files");
            return Ok(StageOutcome::unchanged());
        }

        let report = match &self.generator {
            Some(generator) => review(generator.as_ref(), &files).await?,
            None => fallback_report(&files),
        };

        ctx.add_report(self.name(), REPORT_TITLE, report.clone());

        let path = ctx.path(REPORT_PATH);
        if read_optional(&path)?.as_deref() == Some(report.as_str()) {
            return Ok(StageOutcome::unchanged());
        }
        write_file(&path, &report)?;
        ctx.log_task(format!("Reviewed {} source files for code quality", files.len()));
        Ok(StageOutcome::wrote([REPORT_PATH]))
    }
}

fn reviewable_files(ctx: &PipelineContext) -> Result<Vec<SourceFile>, StageError> {
    let mut files = Vec::new();
    for path in source_files(&ctx.workdir, SOURCE_EXTENSIONS)? {
        if files.len() == MAX_REVIEW_FILES {
            break;
        }
        let relative = relative_display(&ctx.workdir, &path);
        if relative.ends_with(".min.js") {
            continue;
        }
        let Some(content) = read_optional(&path)? else {
            continue;
        };
        if is_reviewable(&content) {
            files.push(SourceFile { relative, content });
        }
    }
    Ok(files)
}

/// Skips huge files and single-line (minified) ones.
fn is_reviewable(content: &str) -> bool {
    content.chars().count() <= MAX_FILE_CHARS && content.trim().lines().nth(1).is_some()
}

fn chunks(content: &str) -> Vec<String> {
    let chars: Vec<char> = content.chars().collect();
    chars
        .chunks(CHUNK_CHARS)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

fn prompt(file: &str, part: usize, parts: usize, code: &str) -> String {
    format!(
        "Analyze the following chunk of {file} (part {part}/{parts}) for code quality issues.\n\
         Provide insights on:\n\
         - Maintainability\n\
         - Readability\n\
         - Function complexity\n\
         - Any potential refactors (optional)\n\n\
         Respond in Markdown.\n\n\
         ```\n{code}\n```"
    )
}

/// Reviews every chunk of every file.
///
/// A failed chunk is noted in the report. If every request fails the stage
/// fails with the last error.
async fn review(generator: &dyn TextGenerator, files: &[SourceFile]) -> Result<String, StageError> {
    let mut report = String::from("# Code Review Report\n");
    let mut succeeded = 0;
    let mut last_error: Option<GenerationError> = None;

    for file in files {
        let parts = chunks(&file.content);
        let total = parts.len();
        for (i, code) in parts.iter().enumerate() {
            let heading = if total > 1 {
                format!("{} (part {}/{})", file.relative, i + 1, total)
            } else {
                file.relative.clone()
            };
            report.push_str(&format!("\n## {}\n\n", heading));

            match generator.complete(&prompt(&file.relative, i + 1, total, code)).await {
                Ok(text) => {
                    succeeded += 1;
                    report.push_str(text.trim());
                    report.push('\n');
                }
                Err(e) => {
                    warn!(file = %file.relative, part = i + 1, error = %e, "review request failed");
                    report.push_str(&format!("_Review unavailable: {}_\n", e));
                    last_error = Some(e);
                }
            }
        }
    }

    match (succeeded, last_error) {
        (0, Some(e)) => Err(e.into()),
        _ => Ok(report),
    }
}

fn fallback_report(files: &[SourceFile]) -> String {
    let mut report = String::from(
        "# Code Review Report\n\n\
         No automated reviewer was configured for this run, so this report is a general checklist.\n\n\
         ## Files in scope\n\n",
    );
    for file in files {
        report.push_str(&format!("- `{}`\n", file.relative));
    }
    report.push_str(
        "\n## Checklist\n\n\
         - Keep functions short and focused on one task.\n\
         - Prefer descriptive names over comments that restate the code.\n\
         - Remove unused variables, imports and dead branches.\n\
         - Handle errors from asynchronous calls explicitly.\n\
         - Cover public functions with unit tests.\n",
    );
    report
}
