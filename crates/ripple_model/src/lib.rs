//! Scenario configuration and data model for Ripple.
//!
//! This crate provides:
//! - Typed scenario configuration loaded from YAML or JSON
//! - The immutable service dependency graph built from a scenario
//! - The span and attribute model shared by every telemetry producer
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_model::{DependencyGraph, ScenarioConfig};
//!
//! let config = ScenarioConfig::from_yaml_str(input)?;
//! let graph = DependencyGraph::new(config);
//! assert!(!graph.entry_points().is_empty());
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod error;
pub mod graph;
pub mod scenario;
pub mod span;

pub use error::{Error, Result};
pub use graph::{DependencyGraph, UnresolvedDependency};
pub use scenario::{
    BusinessDataField, Dependency, FieldKind, LatencyProfile, MessageQueue, Operation, Protocol,
    ScenarioConfig, Service, StoreInstance, TelemetryConfig,
};
pub use span::{AttributeValue, Attributes, Span, SpanKind, SpanStatus, StatusCode};
