use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use remediation_scorer::config::SandboxDriver;
use remediation_scorer::runner::{ProcessRunner, Runner};
use remediation_scorer::store::{RedisQueue, RedisStore, SubmissionStore};
use remediation_scorer::{ScoringService, ScoringWorker, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load().context("Failed to load scoring settings")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("remediation_scorer={}", settings.log_level).parse()?),
        )
        .init();

    info!("Starting Scoring Worker...");

    let runner: Arc<dyn Runner> = Arc::new(ProcessRunner::new());
    log_tool_availability(&settings, runner.as_ref());

    let service = ScoringService::from_settings(&settings, runner)?;
    let store: Arc<dyn SubmissionStore> = Arc::new(RedisStore::connect(&settings.redis_url).await?);
    let worker = ScoringWorker::new(Arc::new(service), store, settings.worker.stop_timeout());
    worker.start().await;

    let mut queue = RedisQueue::connect(&settings.redis_url, settings.queue_key.as_str()).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown requested; finishing the current poll");
        shutdown_tx.send_replace(true);
    });

    info!("Waiting for submissions...");
    worker.pull_from(&mut queue, shutdown_rx).await;

    info!("Shutting down...");
    worker.stop().await;
    Ok(())
}

/// Report which external tools were found on this host
fn log_tool_availability(settings: &Settings, runner: &dyn Runner) {
    let mut tools = Vec::new();
    if settings.analyzers.semgrep.enabled {
        tools.push(settings.analyzers.semgrep.binary.as_str());
    }
    if settings.analyzers.bandit.enabled {
        tools.push(settings.analyzers.bandit.binary.as_str());
    }
    match settings.sandbox.driver {
        SandboxDriver::Local => tools.push(settings.sandbox.python.as_str()),
        SandboxDriver::Containerized => tools.push(settings.sandbox.runtime.as_str()),
        SandboxDriver::Disabled => {}
    }

    for tool in tools {
        match runner.locate(tool) {
            Some(path) => info!("Found {} at {}", tool, path.display()),
            None => warn!("{} not found; its stage will degrade", tool),
        }
    }
}
