//! Concurrency ceilings and usage reporting.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

const HOUR: u64 = 60 * 60;

/// Process-wide job limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Running jobs allowed across all owners.
    pub max_active_jobs: usize,
    /// Running jobs allowed per owner.
    pub max_jobs_per_user: usize,
    /// Longest a job may run before the sweep stops it.
    pub max_job_duration: Duration,
    /// How long stopped and failed jobs are kept.
    pub job_retention: Duration,
    /// Period of the background cleanup sweep.
    pub cleanup_interval: Duration,
    /// How long a stop waits for a job's loops to exit.
    pub stop_grace: Duration,
    /// Consecutive export failures that fail a job.
    pub max_consecutive_failures: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_active_jobs: 50,
            max_jobs_per_user: 3,
            max_job_duration: Duration::from_secs(24 * HOUR),
            job_retention: Duration::from_secs(24 * HOUR),
            cleanup_interval: Duration::from_secs(15 * 60),
            stop_grace: Duration::from_secs(5),
            max_consecutive_failures: 5,
        }
    }
}

impl Limits {
    /// Sets the system-wide ceiling.
    #[must_use]
    pub const fn with_max_active_jobs(mut self, max: usize) -> Self {
        self.max_active_jobs = max;
        self
    }

    /// Sets the per-owner ceiling.
    #[must_use]
    pub const fn with_max_jobs_per_user(mut self, max: usize) -> Self {
        self.max_jobs_per_user = max;
        self
    }

    /// Sets the maximum job duration in hours.
    #[must_use]
    pub const fn with_max_job_hours(mut self, hours: u64) -> Self {
        self.max_job_duration = Duration::from_secs(hours * HOUR);
        self
    }

    /// Sets the retention window in hours.
    #[must_use]
    pub const fn with_retention_hours(mut self, hours: u64) -> Self {
        self.job_retention = Duration::from_secs(hours * HOUR);
        self
    }

    /// Sets the cleanup interval in minutes.
    #[must_use]
    pub const fn with_cleanup_minutes(mut self, minutes: u64) -> Self {
        self.cleanup_interval = Duration::from_secs(minutes * 60);
        self
    }

    /// Sets the stop grace period.
    #[must_use]
    pub const fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Sets the consecutive failure threshold.
    #[must_use]
    pub const fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max;
        self
    }

    /// Timeout applied to a job that asked for `requested`.
    pub fn effective_duration(&self, requested: Option<Duration>) -> Duration {
        requested.map_or(self.max_job_duration, |d| d.min(self.max_job_duration))
    }
}

/// Jobs held by one owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OwnerUsage {
    /// Running jobs.
    pub active: usize,
    /// Stopped or failed jobs.
    pub stopped: usize,
    /// All jobs.
    pub total: usize,
}

/// Current usage against the configured limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitsReport {
    /// Running jobs allowed across all owners.
    pub max_active_jobs: usize,
    /// Running jobs allowed per owner.
    pub max_jobs_per_user: usize,
    /// Maximum job duration in hours.
    pub max_job_duration_hours: u64,
    /// Retention window in hours.
    pub job_cleanup_hours: u64,
    /// Cleanup interval in minutes.
    pub cleanup_interval_minutes: u64,
    /// Running jobs.
    pub active_jobs: usize,
    /// Stopped or failed jobs.
    pub stopped_jobs: usize,
    /// All jobs.
    pub total_jobs: usize,
    /// Jobs that may still be started system-wide.
    pub remaining_slots: usize,
    /// Usage per owner.
    pub user_breakdown: BTreeMap<String, OwnerUsage>,
}

impl LimitsReport {
    pub(crate) fn new(limits: &Limits, user_breakdown: BTreeMap<String, OwnerUsage>) -> Self {
        let active_jobs = user_breakdown.values().map(|u| u.active).sum();
        let stopped_jobs = user_breakdown.values().map(|u| u.stopped).sum();
        let total_jobs = user_breakdown.values().map(|u| u.total).sum();
        Self {
            max_active_jobs: limits.max_active_jobs,
            max_jobs_per_user: limits.max_jobs_per_user,
            max_job_duration_hours: limits.max_job_duration.as_secs() / HOUR,
            job_cleanup_hours: limits.job_retention.as_secs() / HOUR,
            cleanup_interval_minutes: limits.cleanup_interval.as_secs() / 60,
            active_jobs,
            stopped_jobs,
            total_jobs,
            remaining_slots: limits.max_active_jobs.saturating_sub(active_jobs),
            user_breakdown,
        }
    }
}
