use std::future::pending;

use super::*;
use crate::types::{CandidateRepository, RepoId};

enum Behavior {
    Succeed,
    Fail,
    Panic,
    Hang,
}

struct ScriptedStage {
    name: &'static str,
    phase: StagePhase,
    behavior: Behavior,
}

impl ScriptedStage {
    fn boxed(name: &'static str, phase: StagePhase, behavior: Behavior) -> Box<dyn Stage> {
        Box::new(ScriptedStage {
            name,
            phase,
            behavior,
        })
    }
}

#[async_trait]
impl Stage for ScriptedStage {
    fn name(&self) -> &'static str {
        self.name
    }

    fn phase(&self) -> StagePhase {
        self.phase
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<StageOutcome, StageError> {
        ctx.log_task(self.name);
        match self.behavior {
            Behavior::Succeed => {
                std::fs::write(ctx.path(format!("{}.txt", self.name)), self.name)
                    .map_err(StageError::io(ctx.path(self.name)))?;
                Ok(StageOutcome::wrote([format!("{}.txt", self.name)]))
            }
            Behavior::Fail => Err(StageError::Command {
                command: "scripted".to_string(),
                detail: "exit status 2".to_string(),
            }),
            Behavior::Panic => panic!("stage exploded"),
            Behavior::Hang => {
                pending::<()>().await;
                Ok(StageOutcome::unchanged())
            }
        }
    }
}

fn context(dir: &tempfile::TempDir) -> PipelineContext {
    PipelineContext::new(dir.path(), CandidateRepository::minimal(RepoId::new("octo", "widget")))
}

#[tokio::test]
async fn failing_stage_does_not_stop_later_stages() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(&dir);
    let pipeline = Pipeline::new(vec![
        ScriptedStage::boxed("s1", StagePhase::Structure, Behavior::Succeed),
        ScriptedStage::boxed("s2", StagePhase::Structure, Behavior::Fail),
        ScriptedStage::boxed("s3", StagePhase::Structure, Behavior::Succeed),
    ]);

    let results = pipeline.run(&mut ctx).await;

    assert_eq!(results.len(), 3);
    assert!(results[0].success);
    assert!(!results[1].success);
    assert_eq!(results[1].error(), Some("scripted failed: exit status 2"));
    assert!(results[2].success);
    assert_eq!(
        results[2].detail,
        StageDetail::Artifacts(vec!["s3.txt".to_string()])
    );
    // S3 saw the tree S1 left behind.
    assert!(dir.path().join("s1.txt").exists());
    assert!(dir.path().join("s3.txt").exists());
    assert_eq!(ctx.failures.len(), 1);
    assert_eq!(ctx.failures[0].stage, "s2");
}

#[tokio::test]
async fn panicking_stage_is_contained() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(&dir);
    let pipeline = Pipeline::new(vec![
        ScriptedStage::boxed("boom", StagePhase::Structure, Behavior::Panic),
        ScriptedStage::boxed("after", StagePhase::Structure, Behavior::Succeed),
    ]);

    let results = pipeline.run(&mut ctx).await;

    assert!(!results[0].success);
    assert_eq!(results[0].error(), Some("panicked: stage exploded"));
    assert!(results[1].success);
}

#[tokio::test(start_paused = true)]
async fn stage_timeout_fails_only_that_stage() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(&dir);
    let pipeline = Pipeline::new(vec![
        ScriptedStage::boxed("stuck", StagePhase::Structure, Behavior::Hang),
        ScriptedStage::boxed("after", StagePhase::Content, Behavior::Succeed),
    ])
    .with_stage_timeout(Some(Duration::from_secs(5)));

    let results = pipeline.run(&mut ctx).await;

    assert!(!results[0].success);
    assert!(results[0].error().unwrap().starts_with("timed out"));
    assert!(results[1].success);
}

#[test]
fn stages_are_ordered_by_phase_then_registration() {
    let pipeline = Pipeline::new(vec![
        ScriptedStage::boxed("audit", StagePhase::Dependencies, Behavior::Succeed),
        ScriptedStage::boxed("review", StagePhase::Content, Behavior::Succeed),
        ScriptedStage::boxed("readme", StagePhase::Structure, Behavior::Succeed),
        ScriptedStage::boxed("tests", StagePhase::Content, Behavior::Succeed),
        ScriptedStage::boxed("license", StagePhase::Structure, Behavior::Succeed),
    ]);
    assert_eq!(
        pipeline.stage_names(),
        vec!["readme", "license", "review", "tests", "audit"]
    );
}

#[test]
fn skipped_stages_are_removed() {
    let pipeline = Pipeline::new(vec![
        ScriptedStage::boxed("a", StagePhase::Structure, Behavior::Succeed),
        ScriptedStage::boxed("b", StagePhase::Structure, Behavior::Succeed),
        ScriptedStage::boxed("c", StagePhase::Content, Behavior::Succeed),
    ])
    .without(&["b", "not-a-stage"]);
    assert_eq!(pipeline.stage_names(), vec!["a", "c"]);
}

#[tokio::test]
async fn empty_pipeline_yields_no_results() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(&dir);
    let results = Pipeline::new(Vec::new()).run(&mut ctx).await;
    assert!(results.is_empty());
    assert!(ctx.failures.is_empty());
}
