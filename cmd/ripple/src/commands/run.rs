//! Run command implementation.

use crate::RunArgs;
use anyhow::{Context, Result};
use ripple_correlation::CorrelationEngine;
use ripple_model::ScenarioConfig;
use ripple_orchestrator::{JobOrchestrator, JobRequest, JobStatus};
use ripple_otlp::{HttpSinkFactory, SinkTarget};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const STATUS_POLL: Duration = Duration::from_secs(1);

/// Runs the run command.
pub async fn run(args: &RunArgs) -> Result<()> {
    let config = ScenarioConfig::load(Path::new(&args.scenario))
        .with_context(|| format!("Failed to load scenario: {}", args.scenario))?;

    let mut target = SinkTarget::new(&args.endpoint).with_auth_type(&args.auth_type);
    if let Some(key) = &args.api_key {
        target = target.with_api_key(key);
    }

    let mut request = JobRequest::new(config, target)
        .with_owner(&args.owner)
        .with_description(&args.description);
    if let Some(hours) = args.duration_hours {
        request = request.with_duration(Duration::from_secs(hours * 60 * 60));
    }

    let orchestrator = JobOrchestrator::new(
        args.limits.to_limits(),
        Arc::new(CorrelationEngine::new()),
        Arc::new(HttpSinkFactory),
    );
    let job_id = orchestrator
        .start(request)
        .with_context(|| "Failed to start job")?;
    info!("Job {} streaming to {}", job_id, args.endpoint);

    let cleanup_token = CancellationToken::new();
    let cleanup = orchestrator.spawn_cleanup(cleanup_token.clone());

    let mut poll = tokio::time::interval(STATUS_POLL);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.with_context(|| "Failed to listen for Ctrl+C")?;
                info!("Interrupted; stopping job {}", job_id);
                break;
            }
            _ = poll.tick() => {
                let job = orchestrator.get(&job_id)?;
                if job.status != JobStatus::Running {
                    info!("Job {} is {}", job_id, job.status);
                    break;
                }
            }
        }
    }

    cleanup_token.cancel();
    orchestrator.shutdown().await;
    if let Err(err) = cleanup.await {
        warn!("Cleanup task ended abnormally: {err}");
    }

    let job = orchestrator.get(&job_id)?;
    println!("{}", serde_json::to_string_pretty(&job)?);

    if job.status == JobStatus::Failed {
        anyhow::bail!(
            "Job {job_id} failed: {}",
            job.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
