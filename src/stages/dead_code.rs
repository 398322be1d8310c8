//! Unused file, export and dependency detection.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{read_optional, run_output, write_file};
use crate::command::{CommandRunner, Invocation};
use crate::pipeline::{PipelineContext, Stage, StageError, StageOutcome, StagePhase};

const REPORT_PATH: &str = "deadcode-report.md";
const REPORT_TITLE: &str = "Dead Code Analysis";

/// Runs `knip`, `depcheck` and, for TypeScript projects, `ts-prune`, and
/// writes their findings to `deadcode-report.md`.
///
/// The tools only report; nothing in the checkout besides the report is
/// touched. They exit non-zero when they find something, so the exit status
/// is ignored and whatever they printed goes into the report.
pub struct DeadCodeStage {
    runner: Arc<dyn CommandRunner>,
}

impl DeadCodeStage {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        DeadCodeStage { runner }
    }

    async fn section(&self, ctx: &PipelineContext, tool: &str, invocation: Invocation) -> String {
        let text = match run_output(self.runner.as_ref(), &invocation, &ctx.workdir).await {
            Ok(output) => {
                if !output.success() {
                    debug!(tool, exit_code = ?output.exit_code, "analyzer reported findings");
                }
                if output.stdout.trim().is_empty() {
                    output.diagnostic()
                } else {
                    output.stdout.trim().to_string()
                }
            }
            Err(e) => {
                warn!(tool, error = %e, "analyzer could not be started");
                e.to_string()
            }
        };
        format!("### {tool}\n```\n{text}\n```")
    }
}

#[async_trait]
impl Stage for DeadCodeStage {
    fn name(&self) -> &'static str {
        "dead-code"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Content
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<StageOutcome, StageError> {
        if !ctx.path("package.json").is_file() {
            info!("no package.json; skipping dead code analysis");
            return Ok(StageOutcome::unchanged());
        }

        let mut sections = vec!["## Dead Code Report".to_string()];
        sections.push(
            self.section(ctx, "knip", Invocation::new("npx").args(["knip", "--json"]))
                .await,
        );
        sections.push(
            self.section(ctx, "depcheck", Invocation::new("npx").arg("depcheck"))
                .await,
        );
        if ctx.path("tsconfig.json").is_file() {
            sections.push(
                self.section(ctx, "ts-prune", Invocation::new("npx").arg("ts-prune"))
                    .await,
            );
        }
        let report = format!("{}\n", sections.join("\n\n"));

        ctx.add_report(self.name(), REPORT_TITLE, report.clone());

        let path = ctx.path(REPORT_PATH);
        if read_optional(&path)?.as_deref() == Some(report.as_str()) {
            return Ok(StageOutcome::unchanged());
        }
        write_file(&path, &report)?;
        ctx.log_task("Generated dead code report");
        Ok(StageOutcome::wrote([REPORT_PATH]))
    }
}
