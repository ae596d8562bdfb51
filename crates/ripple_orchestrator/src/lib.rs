//! Job orchestration for Ripple.
//!
//! This crate provides:
//! - [`JobOrchestrator`]: start, stop, restart and delete simulation jobs
//! - System-wide and per-owner concurrency limits with usage reporting
//! - Per-job trace and metrics loops with cooperative cancellation
//! - A cleanup sweep for expired jobs and stale incidents
//! - [`CascadeDriver`] for timed incident cascades
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_orchestrator::{JobOrchestrator, JobRequest, Limits};
//! use ripple_otlp::{HttpSinkFactory, SinkTarget};
//!
//! let orchestrator = JobOrchestrator::new(Limits::default(), engine, Arc::new(HttpSinkFactory));
//! let id = orchestrator.start(JobRequest::new(config, SinkTarget::new("http://localhost:4318")))?;
//! orchestrator.stop(&id).await?;
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod cascade;
pub mod error;
pub mod job;
pub mod limits;
pub mod orchestrator;
mod runner;

pub use cascade::{CascadeDriver, CascadeHandle};
pub use error::{Error, LimitScope, Result};
pub use job::{JobRequest, JobSnapshot, JobStatus, RestartRequest, DEFAULT_OWNER};
pub use limits::{Limits, LimitsReport, OwnerUsage};
pub use orchestrator::{JobOrchestrator, SweepReport};
