//! CI and container scaffolding: workflows, `Dockerfile`, compose file.

use async_trait::async_trait;

use super::{DOCKER_WORKFLOW_ADDED, DOCKERFILE_ADDED, WORKFLOW_ADDED, read_optional, write_if_missing};
use crate::pipeline::{PipelineContext, Stage, StageError, StageOutcome, StagePhase};

const CI_WORKFLOW_PATH: &str = ".github/workflows/ci.yml";
const DOCKER_WORKFLOW_PATH: &str = ".github/workflows/docker.yml";

const CI_WORKFLOW: &str = r#"name: CI
on:
  pull_request:
  push:
    branches: [ main, master ]

jobs:
  build-test:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
        with:
          fetch-depth: 0

      - name: Detect Node project
        id: detect
        run: |
          if [ -f package.json ]; then
            echo "node_project=true" >> $GITHUB_OUTPUT
          else
            echo "node_project=false" >> $GITHUB_OUTPUT
          fi

      - uses: actions/setup-node@v4
        if: steps.detect.outputs.node_project == 'true'
        with:
          node-version: 20
          cache: npm

      - name: Install dependencies
        if: steps.detect.outputs.node_project == 'true'
        run: npm ci || npm install

      - name: Lint
        if: steps.detect.outputs.node_project == 'true'
        run: npm run lint --if-present

      - name: Test
        if: steps.detect.outputs.node_project == 'true'
        run: npm test --if-present
"#;

const DOCKERFILE: &str = r#"FROM node:20
WORKDIR /app
COPY . .
RUN npm install || true
CMD ["npm", "start"]
"#;

const DOCKER_WORKFLOW: &str = r#"name: Docker Build

on:
  push:
    paths:
      - 'Dockerfile'
      - '.github/workflows/docker.yml'

jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - name: Build Docker image
        run: docker build -t app .
"#;

/// Adds a CI workflow that installs, lints and tests Node projects.
pub struct CiWorkflowStage;

#[async_trait]
impl Stage for CiWorkflowStage {
    fn name(&self) -> &'static str {
        "ci-workflow"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Structure
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<StageOutcome, StageError> {
        if !write_if_missing(ctx, CI_WORKFLOW_PATH, CI_WORKFLOW)? {
            return Ok(StageOutcome::unchanged());
        }
        ctx.set_flag(WORKFLOW_ADDED);
        ctx.log_task("Added GitHub Actions CI workflow");
        Ok(StageOutcome::wrote([CI_WORKFLOW_PATH]))
    }
}

/// Adds a `Dockerfile` and a workflow that builds it.
pub struct DockerfileStage;

#[async_trait]
impl Stage for DockerfileStage {
    fn name(&self) -> &'static str {
        "dockerfile"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Structure
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<StageOutcome, StageError> {
        let mut written = Vec::new();

        if write_if_missing(ctx, "Dockerfile", DOCKERFILE)? {
            ctx.set_flag(DOCKERFILE_ADDED);
            ctx.log_task("Added Dockerfile");
            written.push("Dockerfile");
        }
        if write_if_missing(ctx, DOCKER_WORKFLOW_PATH, DOCKER_WORKFLOW)? {
            ctx.set_flag(DOCKER_WORKFLOW_ADDED);
            ctx.log_task("Added Docker build workflow");
            written.push(DOCKER_WORKFLOW_PATH);
        }

        Ok(StageOutcome::wrote(written))
    }
}

/// Backing services detected from `package.json` dependencies.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Services {
    mongo: bool,
    redis: bool,
}

impl Services {
    fn detect(manifest: &serde_json::Value) -> Self {
        let has = |name: &str| {
            ["dependencies", "devDependencies"]
                .iter()
                .any(|section| manifest.get(section).and_then(|deps| deps.get(name)).is_some())
        };
        Services {
            mongo: has("mongodb") || has("mongoose"),
            redis: has("redis"),
        }
    }

    fn compose_file(self) -> String {
        let mut depends = Vec::new();
        if self.mongo {
            depends.push("mongo");
        }
        if self.redis {
            depends.push("redis");
        }

        let mut yaml = String::from(
            "services:\n  app:\n    build: .\n    command: npm start\n    ports:\n      - \"3000:3000\"\n    environment:\n      - NODE_ENV=production\n",
        );
        if !depends.is_empty() {
            yaml.push_str("    depends_on:\n");
            for service in &depends {
                yaml.push_str(&format!("      - {}\n", service));
            }
        }
        if self.mongo {
            yaml.push_str(
                "\n  mongo:\n    image: mongo:7\n    restart: unless-stopped\n    ports:\n      - \"27017:27017\"\n    volumes:\n      - mongo_data:/data/db\n",
            );
        }
        if self.redis {
            yaml.push_str(
                "\n  redis:\n    image: redis:7\n    restart: unless-stopped\n    ports:\n      - \"6379:6379\"\n",
            );
        }
        if self.mongo {
            yaml.push_str("\nvolumes:\n  mongo_data:\n");
        }
        yaml
    }
}

/// Adds a `docker-compose.yml` with the app and any services it depends on.
pub struct ComposeStage;

#[async_trait]
impl Stage for ComposeStage {
    fn name(&self) -> &'static str {
        "compose"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Structure
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<StageOutcome, StageError> {
        if ctx.path("docker-compose.yml").exists() || ctx.path("compose.yaml").exists() {
            return Ok(StageOutcome::unchanged());
        }

        let manifest_path = ctx.path("package.json");
        let services = match read_optional(&manifest_path)? {
            Some(text) => {
                let manifest = serde_json::from_str(&text).map_err(|source| StageError::Json {
                    path: manifest_path.clone(),
                    source,
                })?;
                Services::detect(&manifest)
            }
            None => Services::default(),
        };

        write_if_missing(ctx, "docker-compose.yml", &services.compose_file())?;
        ctx.log_task("Added docker-compose.yml");
        Ok(StageOutcome::wrote(["docker-compose.yml"]))
    }
}
