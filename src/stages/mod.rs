//! Built-in transformation stages.
//!
//! Every stage here is idempotent: run twice against an unchanged tree, the
//! second run writes nothing. Stages that create a file only do so when it is
//! missing; stages that rewrite a file only write when the content changes.

mod dead_code;
mod format;
mod license;
mod package_json;
mod quality;
mod readme;
mod scaffold;
mod security;
mod test_scaffold;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::{DirEntry, WalkDir};

use crate::command::{CommandOutput, CommandRunner, Invocation};
use crate::generative::TextGenerator;
use crate::pipeline::{PipelineContext, Stage, StageError};

pub use self::dead_code::DeadCodeStage;
pub use self::format::FormatStage;
pub use self::license::LicenseStage;
pub use self::package_json::PackageJsonStage;
pub use self::quality::QualityReportStage;
pub use self::readme::ReadmeStage;
pub use self::scaffold::{CiWorkflowStage, ComposeStage, DockerfileStage};
pub use self::security::SecurityStage;
pub use self::test_scaffold::TestScaffoldStage;

/// Flag set when the CI workflow was created.
pub const WORKFLOW_ADDED: &str = "workflow-added";
/// Flag set when a `Dockerfile` was created.
pub const DOCKERFILE_ADDED: &str = "dockerfile-added";
/// Flag set when the Docker build workflow was created.
pub const DOCKER_WORKFLOW_ADDED: &str = "docker-workflow-added";

/// Directories never descended into when collecting source files.
const IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "dist",
    "build",
    "coverage",
    "vendor",
    "__tests__",
];

/// What the built-in stages need from the outside world.
#[derive(Clone)]
pub struct StageDeps {
    pub runner: Arc<dyn CommandRunner>,
    pub generator: Option<Arc<dyn TextGenerator>>,
    /// Formatter command; `None` disables the `format` stage's work.
    pub formatter: Option<Invocation>,
    /// Year written into generated license files.
    pub year: i32,
}

/// The default formatter: Prettier over the whole tree.
pub fn default_formatter() -> Invocation {
    Invocation::new("npx").args(["prettier", "--write", "."])
}

/// Every built-in stage in registration order.
///
/// Scaffolding stages register before `readme` so a generated README can
/// mention what they added; `format` registers last in its phase so it also
/// formats generated files.
pub fn default_stages(deps: StageDeps) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(CiWorkflowStage),
        Box::new(DockerfileStage),
        Box::new(ComposeStage),
        Box::new(ReadmeStage),
        Box::new(LicenseStage::new(deps.year)),
        Box::new(PackageJsonStage),
        Box::new(FormatStage::new(deps.runner.clone(), deps.formatter)),
        Box::new(QualityReportStage::new(deps.generator.clone())),
        Box::new(TestScaffoldStage::new(deps.generator)),
        Box::new(DeadCodeStage::new(deps.runner.clone())),
        Box::new(SecurityStage::new(deps.runner)),
    ]
}

/// Reads a file, returning `None` when it does not exist.
pub(crate) fn read_optional(path: &Path) -> Result<Option<String>, StageError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StageError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes `content` to `path`, creating parent directories.
pub(crate) fn write_file(path: &Path, content: &str) -> Result<(), StageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(StageError::io(parent))?;
    }
    fs::write(path, content).map_err(StageError::io(path))
}

/// Writes `relative` under the checkout unless it already exists.
///
/// Returns whether the file was created.
pub(crate) fn write_if_missing(
    ctx: &PipelineContext,
    relative: &str,
    content: &str,
) -> Result<bool, StageError> {
    let path = ctx.path(relative);
    if path.exists() {
        return Ok(false);
    }
    write_file(&path, content)?;
    Ok(true)
}

/// Collects files under `root` whose extension is in `extensions`.
///
/// Skips [`IGNORED_DIRS`] and does not follow symlinks. Results are sorted so
/// stages behave the same on every run.
pub(crate) fn source_files(root: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, StageError> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_ignored_dir(entry));

    let mut found = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extensions.contains(&e))
        {
            found.push(entry.into_path());
        }
    }

    found.sort();
    Ok(found)
}

fn is_ignored_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| IGNORED_DIRS.contains(&name))
}

/// Runs `invocation` in the checkout and returns its output whatever the exit
/// status; only a failure to start the process is an error.
pub(crate) async fn run_output(
    runner: &dyn CommandRunner,
    invocation: &Invocation,
    workdir: &Path,
) -> Result<CommandOutput, StageError> {
    runner
        .run(invocation, workdir)
        .await
        .map_err(|source| StageError::Spawn {
            command: invocation.to_string(),
            source,
        })
}

/// Runs `invocation` in the checkout; a non-zero exit is a stage error.
pub(crate) async fn run_checked(
    runner: &dyn CommandRunner,
    invocation: &Invocation,
    workdir: &Path,
) -> Result<(), StageError> {
    let output = run_output(runner, invocation, workdir).await?;
    if output.success() {
        Ok(())
    } else {
        Err(StageError::Command {
            command: invocation.to_string(),
            detail: output.diagnostic(),
        })
    }
}

/// `path` relative to `root`, with forward slashes.
pub(crate) fn relative_display(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedRunner;

    #[test]
    fn source_walk_skips_ignored_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for file in [
            "index.js",
            "src/app.ts",
            "src/view.tsx",
            "src/notes.md",
            "node_modules/left-pad/index.js",
            "dist/bundle.js",
            "__tests__/index.test.js",
        ] {
            write_file(&root.join(file), "x").unwrap();
        }

        let files: Vec<String> = source_files(root, &["js", "ts", "tsx"])
            .unwrap()
            .iter()
            .map(|p| relative_display(root, p))
            .collect();

        assert_eq!(files, vec!["index.js", "src/app.ts", "src/view.tsx"]);
    }

    #[test]
    fn checkout_named_like_an_ignored_directory_is_still_walked() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("build");
        write_file(&root.join("src/app.js"), "x").unwrap();
        write_file(&root.join("dist/app.js"), "x").unwrap();

        let files = source_files(&root, &["js"]).unwrap();
        assert_eq!(files, vec![root.join("src/app.js")]);
    }

    #[test]
    fn missing_root_is_a_walk_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = source_files(&dir.path().join("absent"), &["js"]).unwrap_err();
        assert!(matches!(err, StageError::Walk(_)));
    }

    #[test]
    fn write_if_missing_leaves_existing_files_alone() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = PipelineContext::new(
            dir.path(),
            crate::types::CandidateRepository::minimal(crate::types::RepoId::new("octo", "widget")),
        );

        assert!(write_if_missing(&ctx, "a/b.txt", "first").unwrap());
        assert!(!write_if_missing(&ctx, "a/b.txt", "second").unwrap());
        assert_eq!(fs::read_to_string(dir.path().join("a/b.txt")).unwrap(), "first");
    }

    #[test]
    fn read_optional_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_optional(&dir.path().join("nope")).unwrap(), None);
    }

    #[test]
    fn default_stage_order() {
        let deps = StageDeps {
            runner: Arc::new(ScriptedRunner::new()),
            generator: None,
            formatter: Some(default_formatter()),
            year: 2026,
        };
        let pipeline = crate::pipeline::Pipeline::new(default_stages(deps));
        assert_eq!(
            pipeline.stage_names(),
            vec![
                "ci-workflow",
                "dockerfile",
                "compose",
                "readme",
                "license",
                "package-json",
                "format",
                "quality-report",
                "test-scaffold",
                "dead-code",
                "security",
            ]
        );
    }
}
