//! `package.json` housekeeping.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::{read_optional, write_file};
use crate::pipeline::{PipelineContext, Stage, StageError, StageOutcome, StagePhase};
use crate::types::CandidateRepository;

const SCRIPTS: &[(&str, &str)] = &[
    ("lint", "eslint ."),
    ("format", "prettier -w ."),
    ("format:check", "prettier -c ."),
    ("test", "echo \"No tests\" && exit 0"),
];

/// Fills in missing manifest fields. Existing values are never overwritten.
pub struct PackageJsonStage;

#[async_trait]
impl Stage for PackageJsonStage {
    fn name(&self) -> &'static str {
        "package-json"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Structure
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<StageOutcome, StageError> {
        let path = ctx.path("package.json");
        let Some(text) = read_optional(&path)? else {
            return Ok(StageOutcome::unchanged());
        };
        let mut manifest: Value = serde_json::from_str(&text).map_err(|source| StageError::Json {
            path: path.clone(),
            source,
        })?;
        let Some(fields) = manifest.as_object_mut() else {
            return Err(StageError::Manifest {
                path,
                reason: "top level is not an object".to_string(),
            });
        };

        let added = fill_missing(fields, &ctx.candidate);
        if added.is_empty() {
            return Ok(StageOutcome::unchanged());
        }

        let mut rendered = serde_json::to_string_pretty(&manifest).map_err(|source| StageError::Json {
            path: path.clone(),
            source,
        })?;
        rendered.push('\n');
        write_file(&path, &rendered)?;

        ctx.log_task(format!("Completed package.json ({})", added.join(", ")));
        Ok(StageOutcome::wrote(["package.json"]))
    }
}

/// Adds what is missing and returns the names of the fields it added.
fn fill_missing(fields: &mut Map<String, Value>, candidate: &CandidateRepository) -> Vec<String> {
    let mut added = Vec::new();

    if !fields.contains_key("name") {
        fields.insert("name".to_string(), json!(package_name(&candidate.id.name)));
        added.push("name".to_string());
    }
    if !fields.contains_key("license") {
        fields.insert("license".to_string(), json!("MIT"));
        added.push("license".to_string());
    }
    if !fields.contains_key("repository") {
        fields.insert(
            "repository".to_string(),
            json!({ "type": "git", "url": candidate.clone_url }),
        );
        added.push("repository".to_string());
    }

    let scripts = fields
        .entry("scripts")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(scripts) = scripts.as_object_mut() {
        for (name, command) in SCRIPTS {
            if !scripts.contains_key(*name) {
                scripts.insert(name.to_string(), json!(command));
                added.push(format!("scripts.{}", name));
            }
        }
    }

    added
}

/// npm package names are lowercase and URL-safe.
fn package_name(repo_name: &str) -> String {
    let name: String = repo_name
        .to_ascii_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    name.trim_start_matches(['.', '_']).to_string()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::types::RepoId;

    fn context(dir: &tempfile::TempDir) -> PipelineContext {
        PipelineContext::new(dir.path(), CandidateRepository::minimal(RepoId::new("octo", "My Widget")))
    }

    #[test]
    fn package_names_are_sanitized() {
        assert_eq!(package_name("My Widget"), "my-widget");
        assert_eq!(package_name(".dotfiles"), "dotfiles");
        assert_eq!(package_name("left_pad.js"), "left_pad.js");
    }

    #[tokio::test]
    async fn fills_only_missing_fields_and_keeps_key_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"version":"1.0.0","name":"widget","scripts":{"test":"jest"}}"#,
        )
        .unwrap();
        let mut ctx = context(&dir);

        let outcome = PackageJsonStage.run(&mut ctx).await.unwrap();
        assert_eq!(outcome.artifacts, vec!["package.json".to_string()]);

        let text = fs::read_to_string(dir.path().join("package.json")).unwrap();
        let manifest: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(manifest["name"], "widget");
        assert_eq!(manifest["license"], "MIT");
        assert_eq!(manifest["scripts"]["test"], "jest");
        assert_eq!(manifest["scripts"]["lint"], "eslint .");
        assert_eq!(manifest["repository"]["url"], "https://github.com/octo/My Widget.git");
        let keys: Vec<&str> = manifest.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(&keys[..3], &["version", "name", "scripts"]);
        assert!(text.ends_with("}\n"));
    }

    #[tokio::test]
    async fn complete_manifest_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(&dir);
        fs::write(dir.path().join("package.json"), "{}").unwrap();

        PackageJsonStage.run(&mut ctx).await.unwrap();
        let first = fs::read_to_string(dir.path().join("package.json")).unwrap();
        let outcome = PackageJsonStage.run(&mut ctx).await.unwrap();

        assert!(outcome.artifacts.is_empty());
        assert_eq!(fs::read_to_string(dir.path().join("package.json")).unwrap(), first);
    }

    #[tokio::test]
    async fn missing_manifest_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = PackageJsonStage.run(&mut context(&dir)).await.unwrap();
        assert!(outcome.artifacts.is_empty());
        assert!(!dir.path().join("package.json").exists());
    }

    #[tokio::test]
    async fn non_object_manifest_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "[1, 2]").unwrap();
        let err = PackageJsonStage.run(&mut context(&dir)).await.unwrap_err();
        assert!(matches!(err, StageError::Manifest { .. }));
    }
}
