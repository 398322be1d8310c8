use std::sync::Arc;

use anyhow::Context;
use chrono::{Datelike, Utc};
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use forkbot::acquisition::Acquirer;
use forkbot::command::{CommandRunner, SystemRunner};
use forkbot::config::{Args, LogFormat, RunConfig};
use forkbot::controller::RunController;
use forkbot::discovery::DiscoveryClient;
use forkbot::generative::{OpenAiGenerator, TextGenerator};
use forkbot::git::Git;
use forkbot::github::{HostingApi, OctocrabClient};
use forkbot::ledger::Ledger;
use forkbot::pipeline::Pipeline;
use forkbot::publication::Publisher;
use forkbot::stages::{StageDeps, default_formatter, default_stages};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = args.into_config().context("invalid configuration")?;
    tracing::info!(seed = config.seed, dry_run = config.dry_run, "starting run");
    tracing::debug!(?config, "configuration");

    let mut controller = build(&config)?;
    let summary = controller.run().await.context("run aborted")?;
    tracing::info!(?summary, "done");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "forkbot=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

fn build(config: &RunConfig) -> anyhow::Result<RunController> {
    let api: Arc<dyn HostingApi> = Arc::new(match &config.github_token {
        Some(token) => OctocrabClient::from_token(token.clone()),
        None => OctocrabClient::anonymous(),
    }
    .context("failed to build GitHub client")?);

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let mut git = Git::new(runner.clone(), config.identity.clone());
    if let Some(token) = &config.github_token {
        git = git.with_token(token.clone());
    }

    let now = Utc::now();
    let discovery = DiscoveryClient::new(
        api.clone(),
        config.discovery.clone(),
        now.date_naive(),
        StdRng::seed_from_u64(config.seed),
    )
    .context("invalid discovery settings")?;

    let acquirer = Acquirer::new(api.clone(), git.clone(), &config.work_dir)
        .dry_run(config.dry_run)
        .settle_delay(config.clone_delay);

    let generator: Option<Arc<dyn TextGenerator>> = match &config.openai_api_key {
        Some(key) => {
            let mut generator = OpenAiGenerator::new(key.clone(), config.model.clone())
                .with_timeout(config.generation_timeout);
            if let Some(endpoint) = &config.openai_endpoint {
                generator = generator.with_endpoint(endpoint.clone());
            }
            Some(Arc::new(generator))
        }
        None => {
            tracing::info!("OPENAI_API_KEY not set; generated content uses fallbacks");
            None
        }
    };

    let pipeline = Pipeline::new(default_stages(StageDeps {
        runner,
        generator,
        formatter: Some(default_formatter()),
        year: now.year(),
    }));
    let known = pipeline.stage_names();
    for name in &config.skip_stages {
        if !known.contains(&name.as_str()) {
            tracing::warn!(stage = %name, known = ?known, "unknown stage in skip list");
        }
    }
    let pipeline = pipeline
        .without(&config.skip_stages)
        .with_stage_timeout(config.stage_timeout);

    // Titles draw from their own stream so they do not shift discovery sampling.
    let publisher = Publisher::new(api.clone(), git, StdRng::seed_from_u64(config.seed.wrapping_add(1)))
        .dry_run(config.dry_run);

    let ledger = Ledger::open(&config.ledger_path);
    tracing::info!(path = %ledger.path().display(), entries = ledger.len(), "ledger loaded");

    Ok(RunController::new(discovery, acquirer, pipeline, publisher, ledger)
        .candidate_delay(config.candidate_delay))
}
