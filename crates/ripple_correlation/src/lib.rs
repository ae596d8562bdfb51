//! Incident correlation for Ripple.
//!
//! The [`CorrelationEngine`] is a registry of active incidents shared by every
//! telemetry producer of every job. Producers ask it whether a component is
//! currently broken ([`CorrelationEngine::attributes_for`]) and how
//! ([`CorrelationEngine::effect_for`]); a scheduler outside the engine drives
//! cascades forward with [`CorrelationEngine::advance_cascade`].
//!
//! # Example
//!
//! ```rust
//! use ripple_correlation::{CascadeStage, CorrelationEngine, IncidentRequest, RootCauseType};
//!
//! let engine = CorrelationEngine::new();
//! let request = IncidentRequest::new("job-1", RootCauseType::Infrastructure, "switch")
//!     .with_stages(vec![
//!         CascadeStage::new("switch", "port_down"),
//!         CascadeStage::new("db", "timeout"),
//!     ]);
//! let id = engine.start_incident(request).unwrap();
//!
//! engine.advance_cascade(&id);
//! engine.advance_cascade(&id);
//! assert!(engine.is_affected("db"));
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod engine;
pub mod error;
pub mod incident;

pub use engine::CorrelationEngine;
pub use error::{Error, Result};
pub use incident::{
    CascadeStage, Effect, EffectKind, Incident, IncidentRequest, IncidentStatus, RootCauseType,
    Severity,
};
