//! Per-job trace and metrics loops.

use ripple_correlation::CorrelationEngine;
use ripple_model::DependencyGraph;
use ripple_otlp::{
    log_payload, trace_payload, ResourceCatalog, ServiceMetrics, Signal, TelemetrySink,
};
use ripple_spans::SpanTreeGenerator;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Terminal failure reported by a runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct JobFailure {
    pub job_id: String,
    pub generation: u64,
    pub message: String,
    pub failures: u32,
}

pub(crate) type FailureHandler = Arc<dyn Fn(JobFailure) + Send + Sync>;

pub(crate) struct RunnerConfig {
    pub job_id: String,
    pub generation: u64,
    pub graph: Arc<DependencyGraph>,
    pub correlation: Arc<CorrelationEngine>,
    pub sink: Arc<dyn TelemetrySink>,
    pub max_consecutive_failures: u32,
    pub on_failure: FailureHandler,
}

struct Shared {
    config: RunnerConfig,
    catalog: ResourceCatalog,
    token: CancellationToken,
    consecutive_failures: AtomicU32,
    reported: AtomicBool,
}

impl Shared {
    /// Exports one payload. Returns false when the loop should exit.
    async fn export(&self, signal: Signal, payload: &Value) -> bool {
        let result = tokio::select! {
            biased;
            () = self.token.cancelled() => return false,
            result = self.config.sink.export(signal, payload) => result,
        };

        match result {
            Ok(()) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                true
            }
            Err(err) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(
                    "Job {} failed to export {} ({} consecutive): {}",
                    self.config.job_id, signal, failures, err
                );
                if failures >= self.config.max_consecutive_failures {
                    self.fail(format!("OTLP export failed {failures} times in a row: {err}"), failures);
                    return false;
                }
                true
            }
        }
    }

    fn fail(&self, message: String, failures: u32) {
        if self.reported.swap(true, Ordering::SeqCst) {
            return;
        }
        error!("Job {} failed: {}", self.config.job_id, message);
        self.token.cancel();
        (self.config.on_failure)(JobFailure {
            job_id: self.config.job_id.clone(),
            generation: self.config.generation,
            message,
            failures,
        });
    }
}

fn now_ns() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .and_then(|ns| u64::try_from(ns).ok())
        .unwrap_or_default()
}

async fn trace_loop(shared: Arc<Shared>) {
    let telemetry = shared.config.graph.config().telemetry.clone();
    if telemetry.trace_rate == 0 {
        debug!("Job {} has trace_rate 0; trace loop idle", shared.config.job_id);
        shared.token.cancelled().await;
        return;
    }

    let mut generator = SpanTreeGenerator::new(Arc::clone(&shared.config.graph))
        .with_correlation(Arc::clone(&shared.config.correlation));
    let mut ticker = interval(Duration::from_secs_f64(1.0 / f64::from(telemetry.trace_rate)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = shared.token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let trace = generator.generate_trace();
        debug!(
            "Job {} generated trace {} with {} spans",
            shared.config.job_id,
            trace.trace_id,
            trace.len()
        );

        if !shared.export(Signal::Traces, &trace_payload(&trace, &shared.catalog)).await {
            break;
        }
        if telemetry.include_logs
            && !shared.export(Signal::Logs, &log_payload(&trace, &shared.catalog)).await
        {
            break;
        }
    }
    debug!("Job {} trace loop exited", shared.config.job_id);
}

async fn metrics_loop(shared: Arc<Shared>) {
    let period = shared.config.graph.config().telemetry.metrics_interval;
    if period == 0 {
        debug!("Job {} has metrics_interval 0; metrics loop idle", shared.config.job_id);
        shared.token.cancelled().await;
        return;
    }

    let mut metrics = ServiceMetrics::new();
    let mut ticker = interval(Duration::from_secs(period));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = shared.token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let payload = metrics.payload(
            &shared.config.graph,
            &shared.catalog,
            Some(&shared.config.correlation),
            now_ns(),
        );
        if !shared.export(Signal::Metrics, &payload).await {
            break;
        }
    }
    debug!("Job {} metrics loop exited", shared.config.job_id);
}

/// The live loops of one job generation.
pub(crate) struct JobRunner {
    job_id: String,
    generation: u64,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl JobRunner {
    /// Spawns the trace and metrics loops on the current runtime.
    pub fn spawn(config: RunnerConfig) -> Self {
        let token = CancellationToken::new();
        let job_id = config.job_id.clone();
        let generation = config.generation;
        let shared = Arc::new(Shared {
            catalog: ResourceCatalog::new(&config.graph),
            config,
            token: token.clone(),
            consecutive_failures: AtomicU32::new(0),
            reported: AtomicBool::new(false),
        });

        info!("Starting loops for job {job_id} (generation {generation})");
        let tasks = vec![
            tokio::spawn(trace_loop(Arc::clone(&shared))),
            tokio::spawn(metrics_loop(shared)),
        ];

        Self {
            job_id,
            generation,
            token,
            tasks,
        }
    }

    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancels the loops and waits up to `grace` for them to exit.
    ///
    /// Returns false if the wait timed out; the loops are left to notice the
    /// cancellation on their own.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        self.token.cancel();
        let tasks = std::mem::take(&mut self.tasks);
        let joined = timeout(grace, async move {
            for task in tasks {
                if let Err(err) = task.await {
                    warn!("Job loop ended abnormally: {err}");
                }
            }
        })
        .await;

        if joined.is_err() {
            warn!(
                "Job {} loops did not exit within {:?}; proceeding",
                self.job_id, grace
            );
            return false;
        }
        debug!("Job {} loops exited", self.job_id);
        true
    }
}

#[cfg(test)]
impl JobRunner {
    /// A runner whose single task ignores cancellation for `hold`.
    pub(crate) fn unresponsive(job_id: &str, generation: u64, hold: Duration) -> Self {
        Self {
            job_id: job_id.to_string(),
            generation,
            token: CancellationToken::new(),
            tasks: vec![tokio::spawn(tokio::time::sleep(hold))],
        }
    }
}

impl Drop for JobRunner {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
