//! MIT license for unlicensed repositories.

use std::fs;

use async_trait::async_trait;

use super::write_file;
use crate::pipeline::{PipelineContext, Stage, StageError, StageOutcome, StagePhase};

const MIT_TEMPLATE: &str = "MIT License

Copyright (c) {year} {holder}

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the \"Software\"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED \"AS IS\", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
";

/// Adds an MIT `LICENSE` naming the repository owner when no license file
/// exists at the top level.
pub struct LicenseStage {
    year: i32,
}

impl LicenseStage {
    pub fn new(year: i32) -> Self {
        LicenseStage { year }
    }
}

#[async_trait]
impl Stage for LicenseStage {
    fn name(&self) -> &'static str {
        "license"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Structure
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<StageOutcome, StageError> {
        if has_license(ctx)? {
            return Ok(StageOutcome::unchanged());
        }

        let text = MIT_TEMPLATE
            .replace("{year}", &self.year.to_string())
            .replace("{holder}", &ctx.candidate.owner_login);
        write_file(&ctx.path("LICENSE"), &text)?;
        ctx.log_task("Added MIT LICENSE");
        Ok(StageOutcome::wrote(["LICENSE"]))
    }
}

/// Any top-level entry whose name starts with `license`, case-insensitively
/// (`LICENSE`, `license.md`, `LICENSE-MIT`, ...).
fn has_license(ctx: &PipelineContext) -> Result<bool, StageError> {
    let entries = fs::read_dir(&ctx.workdir).map_err(StageError::io(&ctx.workdir))?;
    for entry in entries {
        let entry = entry.map_err(StageError::io(&ctx.workdir))?;
        if entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.to_ascii_lowercase().starts_with("license"))
        {
            return Ok(true);
        }
    }
    Ok(false)
}
