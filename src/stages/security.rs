//! Dependency vulnerability fixes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::run_output;
use crate::command::{CommandRunner, Invocation};
use crate::pipeline::{PipelineContext, Stage, StageError, StageOutcome, StagePhase};

/// Applies compatible fixes from `npm audit`.
///
/// Runs last so it sees the final manifest. A clean audit changes nothing.
/// `npm audit fix` exits non-zero whenever vulnerabilities remain that it
/// could not fix; that is noted and the stage still succeeds.
pub struct SecurityStage {
    runner: Arc<dyn CommandRunner>,
}

impl SecurityStage {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        SecurityStage { runner }
    }
}

#[async_trait]
impl Stage for SecurityStage {
    fn name(&self) -> &'static str {
        "security"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Dependencies
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<StageOutcome, StageError> {
        if !ctx.path("package.json").is_file() {
            info!("no package.json; skipping audit");
            return Ok(StageOutcome::unchanged());
        }

        let audit = Invocation::new("npm").args(["audit", "fix"]);
        let output = run_output(self.runner.as_ref(), &audit, &ctx.workdir).await?;
        if output.success() {
            ctx.log_task("Applied `npm audit fix`");
        } else {
            warn!(
                exit_code = ?output.exit_code,
                detail = %output.diagnostic(),
                "npm audit fix left unresolved vulnerabilities"
            );
            ctx.log_task("Ran `npm audit fix`; some vulnerabilities need manual review");
        }
        Ok(StageOutcome::unchanged())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use crate::test_utils::ScriptedRunner;
    use crate::types::{CandidateRepository, RepoId};

    fn context(dir: &tempfile::TempDir) -> PipelineContext {
        PipelineContext::new(dir.path(), CandidateRepository::minimal(RepoId::new("octo", "widget")))
    }

    #[tokio::test]
    async fn audits_node_projects() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        let runner = Arc::new(ScriptedRunner::new());

        SecurityStage::new(runner.clone())
            .run(&mut context(&dir))
            .await
            .unwrap();
        assert!(runner.called_with(&["npm", "audit", "fix"]));
    }

    #[tokio::test]
    async fn skips_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());

        SecurityStage::new(runner.clone())
            .run(&mut context(&dir))
            .await
            .unwrap();
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn unresolved_vulnerabilities_do_not_fail_the_stage() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        let runner = Arc::new(
            ScriptedRunner::new().respond(&["npm", "audit"], CommandOutput::failed(1, "ERESOLVE could not resolve")),
        );
        let mut ctx = context(&dir);

        let outcome = SecurityStage::new(runner).run(&mut ctx).await.unwrap();

        assert!(outcome.artifacts.is_empty());
        assert_eq!(
            ctx.task_log,
            vec!["Ran `npm audit fix`; some vulnerabilities need manual review".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_npm_is_a_stage_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        let runner = Arc::new(ScriptedRunner::new().respond_with(&["npm", "audit"], |_, _| {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "npm not found"))
        }));

        let err = SecurityStage::new(runner)
            .run(&mut context(&dir))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Spawn { .. }));
    }
}
