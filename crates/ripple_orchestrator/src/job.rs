//! Job requests, records and snapshots.

use chrono::{DateTime, Utc};
use ripple_model::ScenarioConfig;
use ripple_otlp::SinkTarget;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Owner recorded when the caller does not identify itself.
pub const DEFAULT_OWNER: &str = "Not logged in";

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Loops are producing telemetry.
    Running,
    /// Stopped explicitly or by timeout.
    Stopped,
    /// Stopped after a terminal export failure.
    Failed,
}

impl JobStatus {
    /// Returns the string representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a new job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Scenario to simulate.
    pub config: ScenarioConfig,
    /// Free-form description.
    pub description: String,
    /// Owner the per-user limit is counted against.
    pub owner: String,
    /// Where telemetry is sent.
    pub target: SinkTarget,
    /// Requested run time, capped by the configured maximum.
    pub duration: Option<Duration>,
}

impl JobRequest {
    /// Creates a request owned by [`DEFAULT_OWNER`].
    pub fn new(config: ScenarioConfig, target: SinkTarget) -> Self {
        Self {
            config,
            description: String::new(),
            owner: DEFAULT_OWNER.to_string(),
            target,
            duration: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the owner.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Sets the requested duration.
    #[must_use]
    pub const fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Optional replacements applied by a restart.
#[derive(Debug, Clone, Default)]
pub struct RestartRequest {
    /// New scenario.
    pub config: Option<ScenarioConfig>,
    /// New telemetry target.
    pub target: Option<SinkTarget>,
    /// New description.
    pub description: Option<String>,
    /// New owner.
    pub owner: Option<String>,
}

impl RestartRequest {
    /// Restart with the job's current settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the scenario.
    #[must_use]
    pub fn with_config(mut self, config: ScenarioConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replaces the telemetry target.
    #[must_use]
    pub fn with_target(mut self, target: SinkTarget) -> Self {
        self.target = Some(target);
        self
    }

    /// Replaces the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replaces the owner.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct JobRecord {
    pub id: String,
    pub description: String,
    pub owner: String,
    pub config: ScenarioConfig,
    pub target: SinkTarget,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub duration: Duration,
    pub timeout_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub failure_count: u32,
    pub restart_count: u32,
    /// Bumped on every start and restart; failure reports carry it.
    pub generation: u64,
}

impl JobRecord {
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            description: self.description.clone(),
            owner: self.owner.clone(),
            status: self.status,
            created_at: self.created_at,
            timeout_at: self.timeout_at,
            error_message: self.error_message.clone(),
            failure_count: self.failure_count,
            restart_count: self.restart_count,
            endpoint: self.target.endpoint.clone(),
            services: self.config.services.len(),
        }
    }
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    /// Job id.
    pub id: String,
    /// Free-form description.
    pub description: String,
    /// Owner.
    pub owner: String,
    /// Lifecycle state.
    pub status: JobStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// When the sweep stops the job.
    pub timeout_at: DateTime<Utc>,
    /// Reason for the last failure.
    pub error_message: Option<String>,
    /// Consecutive export failures at the time of failure.
    pub failure_count: u32,
    /// Number of restarts.
    pub restart_count: u32,
    /// Collector endpoint.
    pub endpoint: String,
    /// Services in the scenario.
    pub services: usize,
}

pub(crate) fn deadline(from: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| from.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub(crate) fn cutoff(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
