//! OTLP/JSON export for Ripple.
//!
//! This crate provides:
//! - Trace and log payloads built from generated traces
//! - Cumulative per-service metrics with incident context
//! - Resource attributes per service
//! - The `TelemetrySink` seam with an OTLP/HTTP and an in-memory sink
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_otlp::{trace_payload, HttpSinkFactory, ResourceCatalog, Signal, SinkFactory, SinkTarget};
//!
//! let catalog = ResourceCatalog::new(&graph);
//! let sink = HttpSinkFactory.create(&SinkTarget::new("http://localhost:4318"))?;
//! sink.export(Signal::Traces, &trace_payload(&trace, &catalog)).await?;
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod error;
pub mod metrics;
pub mod payload;
pub mod resource;
pub mod sink;

pub use error::{Error, Result};
pub use metrics::ServiceMetrics;
pub use payload::{encode_attributes, encode_value, log_payload, trace_payload, SCOPE_NAME};
pub use resource::{runtime_info, ResourceCatalog};
pub use sink::{
    HttpSinkFactory, MemorySink, OtlpHttpSink, Signal, SinkFactory, SinkTarget, TelemetrySink,
};
