//! Job registry and lifecycle.

use crate::cascade::{CascadeDriver, CascadeHandle};
use crate::error::{Error, LimitScope, Result};
use crate::job::{cutoff, deadline, JobRecord, JobRequest, JobSnapshot, JobStatus, RestartRequest};
use crate::limits::{Limits, LimitsReport, OwnerUsage};
use crate::runner::{JobFailure, JobRunner, RunnerConfig};
use chrono::{DateTime, Utc};
use ripple_correlation::{CorrelationEngine, IncidentRequest};
use ripple_model::{DependencyGraph, ScenarioConfig};
use ripple_otlp::{SinkFactory, SinkTarget, TelemetrySink};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const RESOLVED_INCIDENT_AGE: Duration = Duration::from_secs(60 * 60);
const ACTIVE_INCIDENT_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Outcome of one cleanup sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Stopped or failed jobs removed after the retention window.
    pub removed: usize,
    /// Running jobs stopped because their timeout passed.
    pub timed_out: usize,
    /// Stale incidents removed from the correlation engine.
    pub incidents: usize,
}

struct Inner {
    limits: Limits,
    correlation: Arc<CorrelationEngine>,
    sinks: Arc<dyn SinkFactory>,
    /// Lock order: `jobs` before `runners`.
    jobs: Mutex<HashMap<String, JobRecord>>,
    runners: Mutex<HashMap<String, JobRunner>>,
    generations: AtomicU64,
    shutdown: CancellationToken,
}

impl Inner {
    fn jobs(&self) -> MutexGuard<'_, HashMap<String, JobRecord>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn runners(&self) -> MutexGuard<'_, HashMap<String, JobRunner>> {
        self.runners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn check_limits(&self, jobs: &HashMap<String, JobRecord>, owner: &str) -> Result<()> {
        let running = jobs.values().filter(|j| j.status == JobStatus::Running);
        let (total, owned) = running.fold((0, 0), |(total, owned), job| {
            (total + 1, owned + usize::from(job.owner == owner))
        });

        if total >= self.limits.max_active_jobs {
            return Err(Error::OverLimit {
                scope: LimitScope::System,
                limit: self.limits.max_active_jobs,
            });
        }
        if owned >= self.limits.max_jobs_per_user {
            return Err(Error::OverLimit {
                scope: LimitScope::Owner,
                limit: self.limits.max_jobs_per_user,
            });
        }
        Ok(())
    }

    fn report_failure(&self, failure: JobFailure) {
        let mut jobs = self.jobs();
        let Some(job) = jobs.get_mut(&failure.job_id) else {
            return;
        };
        if job.generation != failure.generation || job.status != JobStatus::Running {
            debug!(
                "Ignoring stale failure for job {} (generation {})",
                failure.job_id, failure.generation
            );
            return;
        }

        warn!("Job {} failed: {}", failure.job_id, failure.message);
        job.status = JobStatus::Failed;
        job.error_message = Some(failure.message);
        job.failure_count = failure.failures;

        let mut runners = self.runners();
        if runners
            .get(&failure.job_id)
            .is_some_and(|r| r.generation() == failure.generation)
        {
            runners.remove(&failure.job_id);
        }
    }
}

/// Runs simulation jobs concurrently under [`Limits`].
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

impl JobOrchestrator {
    /// Creates an orchestrator exporting through sinks built by `sinks`.
    pub fn new(
        limits: Limits,
        correlation: Arc<CorrelationEngine>,
        sinks: Arc<dyn SinkFactory>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                limits,
                correlation,
                sinks,
                jobs: Mutex::new(HashMap::new()),
                runners: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Configured limits.
    pub fn limits(&self) -> &Limits {
        &self.inner.limits
    }

    /// Shared correlation engine.
    pub fn correlation(&self) -> &Arc<CorrelationEngine> {
        &self.inner.correlation
    }

    fn prepare(&self, config: &ScenarioConfig, target: &SinkTarget) -> Result<Arc<dyn TelemetrySink>> {
        config.validate()?;
        Ok(self.inner.sinks.create(target)?)
    }

    fn spawn_runner(&self, job: &JobRecord, sink: Arc<dyn TelemetrySink>) -> JobRunner {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        JobRunner::spawn(RunnerConfig {
            job_id: job.id.clone(),
            generation: job.generation,
            graph: Arc::new(DependencyGraph::new(job.config.clone())),
            correlation: Arc::clone(&self.inner.correlation),
            sink,
            max_consecutive_failures: self.inner.limits.max_consecutive_failures,
            on_failure: Arc::new(move |failure: JobFailure| {
                if let Some(inner) = weak.upgrade() {
                    inner.report_failure(failure);
                }
            }),
        })
    }

    /// Starts a job and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OverLimit`] if a concurrency ceiling is reached, or
    /// an error if the scenario is invalid or the sink cannot be built. No
    /// job is created on error.
    pub fn start(&self, request: JobRequest) -> Result<String> {
        let sink = self.prepare(&request.config, &request.target)?;

        let mut jobs = self.inner.jobs();
        self.inner.check_limits(&jobs, &request.owner)?;

        let id = loop {
            let candidate = Uuid::new_v4().simple().to_string()[..8].to_string();
            if !jobs.contains_key(&candidate) {
                break candidate;
            }
        };

        let now = Utc::now();
        let duration = self.inner.limits.effective_duration(request.duration);
        let job = JobRecord {
            id: id.clone(),
            description: request.description,
            owner: request.owner,
            config: request.config,
            target: request.target,
            status: JobStatus::Running,
            created_at: now,
            duration,
            timeout_at: deadline(now, duration),
            error_message: None,
            failure_count: 0,
            restart_count: 0,
            generation: self.inner.next_generation(),
        };

        info!(
            "Starting job {} for {} ({} services, timeout {})",
            id,
            job.owner,
            job.config.services.len(),
            job.timeout_at
        );

        let runner = self.spawn_runner(&job, sink);
        jobs.insert(id.clone(), job);
        self.inner.runners().insert(id.clone(), runner);
        Ok(id)
    }

    /// Stops a running job, waiting up to the grace period for its loops.
    ///
    /// # Errors
    ///
    /// Returns an error if the job does not exist or is not running.
    pub async fn stop(&self, job_id: &str) -> Result<()> {
        let runner = {
            let mut jobs = self.inner.jobs();
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| Error::NotFound(job_id.to_string()))?;
            if job.status != JobStatus::Running {
                return Err(Error::NotRunning(job_id.to_string()));
            }
            job.status = JobStatus::Stopped;
            self.inner.runners().remove(job_id)
        };

        info!("Stopping job {job_id}");
        if let Some(runner) = runner {
            runner.shutdown(self.inner.limits.stop_grace).await;
        }
        Ok(())
    }

    /// Stops the job if running and starts it again under the same id.
    ///
    /// Clears the failure state. A running job keeps its slot; a stopped or
    /// failed job is checked against the limits again.
    ///
    /// # Errors
    ///
    /// Returns an error if the job does not exist, a limit is reached, or the
    /// new settings are invalid. A job that was running is left stopped on
    /// error; any other job keeps its status.
    pub async fn restart(&self, job_id: &str, request: RestartRequest) -> Result<()> {
        let (config, target, owner) = {
            let jobs = self.inner.jobs();
            let job = jobs
                .get(job_id)
                .ok_or_else(|| Error::NotFound(job_id.to_string()))?;
            (
                request.config.clone().unwrap_or_else(|| job.config.clone()),
                request.target.clone().unwrap_or_else(|| job.target.clone()),
                request.owner.clone().unwrap_or_else(|| job.owner.clone()),
            )
        };

        // Fence the old loops first so a late failure report cannot touch
        // the restarted job.
        let generation = self.inner.next_generation();
        let (old, was_running) = {
            let mut jobs = self.inner.jobs();
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| Error::NotFound(job_id.to_string()))?;
            job.generation = generation;
            (self.inner.runners().remove(job_id), job.status == JobStatus::Running)
        };
        if let Some(old) = old {
            old.shutdown(self.inner.limits.stop_grace).await;
        }

        let sink = match self.prepare(&config, &target) {
            Ok(sink) => sink,
            Err(err) => {
                if was_running {
                    self.mark_stopped(job_id, generation);
                }
                return Err(err);
            }
        };

        let mut jobs = self.inner.jobs();
        if !was_running {
            self.inner.check_limits(&jobs, &owner)?;
        }
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| Error::NotFound(job_id.to_string()))?;
        if job.generation != generation {
            debug!("Job {job_id} was restarted concurrently");
            return Ok(());
        }

        let now = Utc::now();
        job.config = config;
        job.target = target;
        job.owner = owner;
        if let Some(description) = request.description {
            job.description = description;
        }
        job.status = JobStatus::Running;
        job.error_message = None;
        job.failure_count = 0;
        job.restart_count += 1;
        job.timeout_at = deadline(now, job.duration);

        info!("Restarting job {} (restart {})", job_id, job.restart_count);
        let runner = self.spawn_runner(job, sink);
        self.inner.runners().insert(job_id.to_string(), runner);
        Ok(())
    }

    fn mark_stopped(&self, job_id: &str, generation: u64) {
        if let Some(job) = self.inner.jobs().get_mut(job_id) {
            if job.generation == generation {
                job.status = JobStatus::Stopped;
            }
        }
    }

    /// Stops the job if running, discards it and its incidents.
    ///
    /// # Errors
    ///
    /// Returns an error if the job does not exist.
    pub async fn delete(&self, job_id: &str) -> Result<()> {
        let runner = {
            let mut jobs = self.inner.jobs();
            jobs.remove(job_id)
                .ok_or_else(|| Error::NotFound(job_id.to_string()))?;
            self.inner.runners().remove(job_id)
        };

        if let Some(runner) = runner {
            runner.shutdown(self.inner.limits.stop_grace).await;
        }
        let incidents = self.inner.correlation.remove_for_job(job_id);
        info!("Deleted job {job_id} ({incidents} incidents removed)");
        Ok(())
    }

    /// Snapshot of one job.
    ///
    /// # Errors
    ///
    /// Returns an error if the job does not exist.
    pub fn get(&self, job_id: &str) -> Result<JobSnapshot> {
        self.inner
            .jobs()
            .get(job_id)
            .map(JobRecord::snapshot)
            .ok_or_else(|| Error::NotFound(job_id.to_string()))
    }

    /// Snapshots of all jobs, oldest first.
    pub fn list(&self) -> Vec<JobSnapshot> {
        let mut jobs: Vec<JobSnapshot> = self.inner.jobs().values().map(JobRecord::snapshot).collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// Usage against the configured limits.
    pub fn usage(&self) -> LimitsReport {
        let mut breakdown: BTreeMap<String, OwnerUsage> = BTreeMap::new();
        for job in self.inner.jobs().values() {
            let usage = breakdown.entry(job.owner.clone()).or_default();
            usage.total += 1;
            if job.status == JobStatus::Running {
                usage.active += 1;
            } else {
                usage.stopped += 1;
            }
        }
        LimitsReport::new(&self.inner.limits, breakdown)
    }

    /// Starts an incident for a job and drives its cascade in the background.
    ///
    /// # Errors
    ///
    /// Returns an error if the job does not exist or the request is invalid.
    pub fn start_cascade(&self, request: IncidentRequest) -> Result<CascadeHandle> {
        if !self.inner.jobs().contains_key(&request.job_id) {
            return Err(Error::NotFound(request.job_id));
        }
        CascadeDriver::new(
            Arc::clone(&self.inner.correlation),
            self.inner.shutdown.clone(),
        )
        .start(request)
    }

    /// Runs one cleanup sweep now.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Runs one cleanup sweep as of `now`.
    ///
    /// Removes stopped and failed jobs created before the retention window,
    /// stops running jobs past their timeout, and sweeps stale incidents.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let retention_cutoff = cutoff(now, self.inner.limits.job_retention);
        let mut report = SweepReport::default();

        let (removed, expired) = {
            let mut jobs = self.inner.jobs();
            let removed: Vec<String> = jobs
                .values()
                .filter(|j| j.status != JobStatus::Running && j.created_at < retention_cutoff)
                .map(|j| j.id.clone())
                .collect();
            for id in &removed {
                jobs.remove(id);
            }

            let mut runners = self.inner.runners();
            let mut expired = Vec::new();
            for job in jobs.values_mut() {
                if job.status == JobStatus::Running && now > job.timeout_at {
                    job.status = JobStatus::Stopped;
                    expired.push((job.id.clone(), runners.remove(&job.id)));
                }
            }
            (removed, expired)
        };

        for id in &removed {
            info!("Cleaning up old job {id}");
            self.inner.correlation.remove_for_job(id);
        }
        for (id, runner) in expired {
            info!("Job {id} stopped due to timeout");
            if let Some(runner) = runner {
                runner.shutdown(self.inner.limits.stop_grace).await;
            }
            report.timed_out += 1;
        }

        report.removed = removed.len();
        report.incidents = self
            .inner
            .correlation
            .sweep_stale(RESOLVED_INCIDENT_AGE, ACTIVE_INCIDENT_AGE);
        if report != SweepReport::default() {
            info!(
                "Cleanup removed {} jobs, timed out {}, dropped {} incidents",
                report.removed, report.timed_out, report.incidents
            );
        }
        report
    }

    /// Spawns the periodic cleanup sweep; it exits when `token` is cancelled.
    pub fn spawn_cleanup(&self, token: CancellationToken) -> JoinHandle<()> {
        let orchestrator = self.clone();
        let period = self.inner.limits.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        orchestrator.sweep().await;
                    }
                }
            }
            debug!("Cleanup loop exited");
        })
    }

    /// Stops every running job and pending cascade.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let runners: Vec<JobRunner> = {
            let mut jobs = self.inner.jobs();
            for job in jobs.values_mut().filter(|j| j.status == JobStatus::Running) {
                job.status = JobStatus::Stopped;
            }
            self.inner.runners().drain().map(|(_, runner)| runner).collect()
        };

        info!("Shutting down {} jobs", runners.len());
        for runner in runners {
            runner.shutdown(self.inner.limits.stop_grace).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_correlation::{CascadeStage, RootCauseType};
    use ripple_model::{Dependency, Service, TelemetryConfig};
    use ripple_otlp::{MemorySink, Signal};

    fn scenario() -> ScenarioConfig {
        ScenarioConfig::new(vec![
            Service::new("frontend").with_dependency(Dependency::service("api")),
            Service::new("api").with_dependency(Dependency::database("postgres")),
        ])
        .with_database("postgres", "postgres")
        .with_telemetry(TelemetryConfig {
            trace_rate: 2,
            metrics_interval: 5,
            ..TelemetryConfig::default()
        })
    }

    fn request(owner: &str) -> JobRequest {
        JobRequest::new(scenario(), SinkTarget::new("http://collector:4318"))
            .with_owner(owner)
            .with_description("checkout demo")
    }

    fn orchestrator(limits: Limits) -> (JobOrchestrator, MemorySink) {
        let sink = MemorySink::new();
        let orchestrator = JobOrchestrator::new(
            limits,
            Arc::new(CorrelationEngine::new()),
            Arc::new(sink.clone()),
        );
        (orchestrator, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn running_job_exports_telemetry() {
        let (orchestrator, sink) = orchestrator(Limits::default());
        let id = orchestrator.start(request("alice")).unwrap();

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(sink.count(Signal::Traces) >= 2);
        assert_eq!(sink.count(Signal::Metrics), 1);

        let job = orchestrator.get(&id).unwrap();
        assert_eq!(job.id.len(), 8);
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.owner, "alice");
        assert_eq!(job.endpoint, "http://collector:4318");

        orchestrator.stop(&id).await.unwrap();
        let exported = sink.exports().len();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.exports().len(), exported);
        assert_eq!(orchestrator.get(&id).unwrap().status, JobStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn enforces_per_owner_limit() {
        let (orchestrator, _) = orchestrator(Limits::default().with_max_jobs_per_user(2));
        let first = orchestrator.start(request("alice")).unwrap();
        orchestrator.start(request("alice")).unwrap();

        assert!(matches!(
            orchestrator.start(request("alice")),
            Err(Error::OverLimit {
                scope: LimitScope::Owner,
                limit: 2
            })
        ));
        assert_eq!(orchestrator.list().len(), 2);
        orchestrator.start(request("bob")).unwrap();

        orchestrator.stop(&first).await.unwrap();
        orchestrator.start(request("alice")).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn enforces_system_limit() {
        let (orchestrator, _) = orchestrator(Limits::default().with_max_active_jobs(1));
        orchestrator.start(request("alice")).unwrap();
        assert!(matches!(
            orchestrator.start(request("bob")),
            Err(Error::OverLimit {
                scope: LimitScope::System,
                ..
            })
        ));

        let usage = orchestrator.usage();
        assert_eq!(usage.active_jobs, 1);
        assert_eq!(usage.remaining_slots, 0);
        assert_eq!(usage.user_breakdown["alice"].active, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_invalid_scenario_without_creating_job() {
        let (orchestrator, _) = orchestrator(Limits::default());
        let request = JobRequest::new(ScenarioConfig::new(Vec::new()), SinkTarget::new("http://c"));

        assert!(matches!(orchestrator.start(request), Err(Error::InvalidConfig(_))));
        assert!(orchestrator.list().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_and_delete_report_missing_jobs() {
        let (orchestrator, _) = orchestrator(Limits::default());
        assert!(matches!(orchestrator.stop("nope").await, Err(Error::NotFound(_))));
        assert!(matches!(orchestrator.delete("nope").await, Err(Error::NotFound(_))));

        let id = orchestrator.start(request("alice")).unwrap();
        orchestrator.stop(&id).await.unwrap();
        assert!(matches!(orchestrator.stop(&id).await, Err(Error::NotRunning(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_export_failures_fail_the_job() {
        let (orchestrator, sink) = orchestrator(Limits::default());
        sink.set_failing(true);
        let id = orchestrator.start(request("alice")).unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        let job = orchestrator.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure_count, 5);
        assert!(job.error_message.is_some());
        assert_eq!(orchestrator.usage().active_jobs, 0);

        sink.set_failing(false);
        orchestrator.restart(&id, RestartRequest::new()).await.unwrap();
        let job = orchestrator.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.restart_count, 1);
        assert_eq!(job.failure_count, 0);
        assert_eq!(job.error_message, None);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_failure_reports_are_ignored() {
        let (orchestrator, _) = orchestrator(Limits::default());
        let id = orchestrator.start(request("alice")).unwrap();
        let old_generation = orchestrator.inner.jobs()[&id].generation;

        orchestrator
            .restart(&id, RestartRequest::new().with_description("v2"))
            .await
            .unwrap();
        orchestrator.inner.report_failure(JobFailure {
            job_id: id.clone(),
            generation: old_generation,
            message: "late".to_string(),
            failures: 5,
        });

        let job = orchestrator.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.description, "v2");
    }

    #[tokio::test(start_paused = true)]
    async fn restart_of_running_job_keeps_its_slot() {
        let (orchestrator, _) = orchestrator(Limits::default().with_max_jobs_per_user(1));
        let id = orchestrator.start(request("alice")).unwrap();

        orchestrator.restart(&id, RestartRequest::new()).await.unwrap();
        assert_eq!(orchestrator.get(&id).unwrap().restart_count, 1);

        orchestrator.stop(&id).await.unwrap();
        orchestrator.start(request("alice")).unwrap();
        assert!(matches!(
            orchestrator.restart(&id, RestartRequest::new()).await,
            Err(Error::OverLimit { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_times_out_then_removes_jobs() {
        let (orchestrator, _) = orchestrator(Limits::default());
        let id = orchestrator
            .start(request("alice").with_duration(Duration::from_secs(60 * 60)))
            .unwrap();

        let report = orchestrator.sweep_at(Utc::now()).await;
        assert_eq!(report, SweepReport::default());

        let later = Utc::now() + chrono::Duration::hours(2);
        let report = orchestrator.sweep_at(later).await;
        assert_eq!(report.timed_out, 1);
        assert_eq!(orchestrator.get(&id).unwrap().status, JobStatus::Stopped);

        let much_later = Utc::now() + chrono::Duration::hours(25);
        let report = orchestrator.sweep_at(much_later).await;
        assert_eq!(report.removed, 1);
        assert!(orchestrator.list().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delete_removes_job_incidents() {
        let (orchestrator, _) = orchestrator(Limits::default());
        let id = orchestrator.start(request("alice")).unwrap();

        let incident = IncidentRequest::new(id.clone(), RootCauseType::Application, "api")
            .with_stages(vec![CascadeStage::new("api", "error_rate")]);
        let cascade = orchestrator.start_cascade(incident).unwrap();
        assert_eq!(cascade.join().await, 1);
        assert_eq!(orchestrator.correlation().list_active(Some(id.as_str())).len(), 1);

        orchestrator.delete(&id).await.unwrap();
        assert!(orchestrator.correlation().list_active(Some(id.as_str())).is_empty());
        assert!(matches!(orchestrator.get(&id), Err(Error::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn cascade_requires_known_job() {
        let (orchestrator, _) = orchestrator(Limits::default());
        let incident = IncidentRequest::new("ghost", RootCauseType::Application, "api");
        assert!(matches!(orchestrator.start_cascade(incident), Err(Error::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_everything() {
        let (orchestrator, _) = orchestrator(Limits::default());
        orchestrator.start(request("alice")).unwrap();
        orchestrator.start(request("bob")).unwrap();

        orchestrator.shutdown().await;
        assert!(orchestrator
            .list()
            .iter()
            .all(|job| job.status == JobStatus::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_restart_keeps_failure_state() {
        let (orchestrator, sink) = orchestrator(Limits::default());
        sink.set_failing(true);
        let id = orchestrator.start(request("alice")).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(orchestrator.get(&id).unwrap().status, JobStatus::Failed);

        let invalid = RestartRequest::new().with_config(ScenarioConfig::new(Vec::new()));
        assert!(matches!(
            orchestrator.restart(&id, invalid).await,
            Err(Error::InvalidConfig(_))
        ));

        let job = orchestrator.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure_count, 5);
        assert!(job.error_message.is_some());
        assert_eq!(job.restart_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_restart_of_running_job_leaves_it_stopped() {
        let (orchestrator, _) = orchestrator(Limits::default());
        let id = orchestrator.start(request("alice")).unwrap();

        let invalid = RestartRequest::new().with_config(ScenarioConfig::new(Vec::new()));
        assert!(orchestrator.restart(&id, invalid).await.is_err());
        assert_eq!(orchestrator.get(&id).unwrap().status, JobStatus::Stopped);
        assert!(orchestrator.inner.runners().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_gives_up_on_unresponsive_loops() {
        let limits = Limits::default();
        let grace = limits.stop_grace;
        let (orchestrator, _) = orchestrator(limits);
        let id = orchestrator.start(request("alice")).unwrap();
        let generation = orchestrator.inner.jobs()[&id].generation;
        orchestrator.inner.runners().insert(
            id.clone(),
            JobRunner::unresponsive(&id, generation, Duration::from_secs(600)),
        );

        let started = tokio::time::Instant::now();
        orchestrator.stop(&id).await.unwrap();
        let waited = started.elapsed();

        assert!(waited >= grace);
        assert!(waited < grace * 2);
        assert_eq!(orchestrator.get(&id).unwrap().status, JobStatus::Stopped);
        assert!(orchestrator.inner.runners().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_racing_timeout_sweep_shuts_down_once() {
        let (orchestrator, _) = orchestrator(Limits::default());
        let id = orchestrator
            .start(request("alice").with_duration(Duration::from_secs(60)))
            .unwrap();
        let expired = Utc::now() + chrono::Duration::hours(1);

        let (stopped, report) = tokio::join!(orchestrator.stop(&id), orchestrator.sweep_at(expired));

        match stopped {
            Ok(()) => assert_eq!(report.timed_out, 0),
            Err(err) => {
                assert!(matches!(err, Error::NotRunning(_)));
                assert_eq!(report.timed_out, 1);
            }
        }
        assert_eq!(orchestrator.get(&id).unwrap().status, JobStatus::Stopped);
        assert!(orchestrator.inner.runners().is_empty());
        assert_eq!(orchestrator.usage().active_jobs, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_loop_runs_on_interval() {
        let limits = Limits::default().with_cleanup_minutes(1).with_max_job_hours(1);
        let (orchestrator, _) = orchestrator(limits);
        let token = CancellationToken::new();
        let cleanup = orchestrator.spawn_cleanup(token.clone());

        tokio::time::sleep(Duration::from_secs(90)).await;
        token.cancel();
        cleanup.await.unwrap();
    }
}
