//! Jest test scaffolding for untested source files.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{read_optional, relative_display, source_files, write_file, write_if_missing};
use crate::generative::TextGenerator;
use crate::pipeline::{PipelineContext, Stage, StageError, StageOutcome, StagePhase};

const TESTS_DIR: &str = "__tests__";
const SOURCE_EXTENSIONS: &[&str] = &["js", "ts"];
const MAX_GENERATED_TESTS: usize = 20;
const MAX_SOURCE_CHARS: usize = 30_000;
/// Generated code shorter than this is treated as a failed generation.
const MIN_TEST_CHARS: usize = 50;

const JEST_CONFIG: &str = "module.exports = {\n  testEnvironment: 'node',\n};\n";

/// Adds `__tests__/<name>.test.js` for source files that have no test.
///
/// Test bodies come from the generator when one is configured; otherwise, or
/// when generation fails, a `test.todo` placeholder is written.
pub struct TestScaffoldStage {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl TestScaffoldStage {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        TestScaffoldStage { generator }
    }

    async fn test_body(&self, relative: &str, source: &str) -> String {
        let Some(generator) = &self.generator else {
            return placeholder(relative);
        };
        if source.chars().count() > MAX_SOURCE_CHARS {
            return placeholder(relative);
        }

        match generator.complete(&prompt(relative, source)).await {
            Ok(reply) => {
                let code = extract_code(&reply);
                if code.len() < MIN_TEST_CHARS {
                    debug!(file = relative, "generated test too short; using placeholder");
                    placeholder(relative)
                } else {
                    format!("{}\n", code)
                }
            }
            Err(e) => {
                warn!(file = relative, error = %e, "test generation failed; using placeholder");
                placeholder(relative)
            }
        }
    }
}

#[async_trait]
impl Stage for TestScaffoldStage {
    fn name(&self) -> &'static str {
        "test-scaffold"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Content
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<StageOutcome, StageError> {
        let mut written = Vec::new();

        for path in source_files(&ctx.workdir, SOURCE_EXTENSIONS)? {
            if written.len() == MAX_GENERATED_TESTS {
                break;
            }
            let relative = relative_display(&ctx.workdir, &path);
            let Some(base) = testable_base(&relative) else {
                continue;
            };
            let test_path = format!("{}/{}.test.js", TESTS_DIR, base);
            let spec_path = format!("{}/{}.spec.js", TESTS_DIR, base);
            if ctx.path(&test_path).exists() || ctx.path(&spec_path).exists() {
                continue;
            }
            let Some(source) = read_optional(&path)? else {
                continue;
            };

            let body = self.test_body(&relative, &source).await;
            write_file(&ctx.path(&test_path), &body)?;
            written.push(test_path);
        }

        if written.is_empty() {
            return Ok(StageOutcome::unchanged());
        }
        ctx.log_task(format!("Added {} test files under {}/", written.len(), TESTS_DIR));

        if !has_jest_config(ctx) && write_if_missing(ctx, "jest.config.js", JEST_CONFIG)? {
            written.push("jest.config.js".to_string());
        }
        Ok(StageOutcome::wrote(written))
    }
}

/// Name to file the test under, or `None` for files that should not get a
/// test (tests themselves, declarations, bundles, tool configuration).
///
/// The name is built from the checkout-relative path so that `src/a/index.js`
/// and `src/b/index.js` get distinct tests: directories are joined with `-`,
/// a leading `src/` is dropped, and non-`.js` sources keep their extension
/// (`foo.ts` becomes `foo-ts`) so they never share a test with `foo.js`.
fn testable_base(relative: &str) -> Option<String> {
    let path = Path::new(relative);
    let lower = path.file_name()?.to_str()?.to_ascii_lowercase();
    let skip = [".test.", ".spec.", ".min.", ".d.ts", ".config.", "bundle"];
    if skip.iter().any(|s| lower.contains(s)) {
        return None;
    }

    let mut parts: Vec<&str> = relative.split('/').collect();
    parts.pop();
    if parts.first() == Some(&"src") {
        parts.remove(0);
    }
    parts.push(path.file_stem()?.to_str()?);
    match path.extension().and_then(|e| e.to_str()) {
        Some("js") | None => {}
        Some(ext) => parts.push(ext),
    }
    Some(parts.join("-"))
}

fn has_jest_config(ctx: &PipelineContext) -> bool {
    ["jest.config.js", "jest.config.cjs", "jest.config.mjs", "jest.config.ts"]
        .iter()
        .any(|name| ctx.path(name).exists())
}

fn prompt(relative: &str, source: &str) -> String {
    format!(
        "You are a senior test engineer. Generate a Jest test file for the following source.\n\
         - Cover primary public functions.\n\
         - Include both happy-path and edge cases.\n\
         - Do not include explanations; output only test code.\n\n\
         FILE: {relative}\n\n\
         SOURCE:\n{source}"
    )
}

fn placeholder(relative: &str) -> String {
    format!(
        "// Placeholder generated for {relative}; replace with real tests.\n\
         test.todo('{relative}');\n"
    )
}

/// Pulls code out of the first fenced block, or returns the whole reply.
fn extract_code(reply: &str) -> String {
    let Some(start) = reply.find("```") else {
        return reply.trim().to_string();
    };
    let after_fence = &reply[start + 3..];
    // Skip the info string (`js`, `javascript`, ...).
    let body_start = after_fence.find('\n').map_or(after_fence.len(), |i| i + 1);
    let body = &after_fence[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    body[..end].trim().to_string()
}
