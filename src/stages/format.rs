//! Source formatting through an external formatter.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::run_checked;
use crate::command::{CommandRunner, Invocation};
use crate::pipeline::{PipelineContext, Stage, StageError, StageOutcome, StagePhase};

/// Runs the configured formatter over Node projects.
///
/// Trees without a `package.json` are left alone. Which files changed is left
/// to publication's diff, so the outcome never lists artifacts.
pub struct FormatStage {
    runner: Arc<dyn CommandRunner>,
    command: Option<Invocation>,
}

impl FormatStage {
    pub fn new(runner: Arc<dyn CommandRunner>, command: Option<Invocation>) -> Self {
        FormatStage { runner, command }
    }
}

#[async_trait]
impl Stage for FormatStage {
    fn name(&self) -> &'static str {
        "format"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Structure
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<StageOutcome, StageError> {
        let Some(command) = &self.command else {
            return Ok(StageOutcome::unchanged());
        };
        if !ctx.path("package.json").is_file() {
            info!("no package.json; skipping formatter");
            return Ok(StageOutcome::unchanged());
        }

        run_checked(self.runner.as_ref(), command, &ctx.workdir).await?;
        ctx.log_task(format!("Formatted sources with `{}`", command));
        Ok(StageOutcome::unchanged())
    }
}
