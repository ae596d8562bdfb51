//! Span tree generation for Ripple.
//!
//! Turns a [`ripple_model::DependencyGraph`] into causally consistent traces:
//! - Entry point selection with a fallback for fully cyclic graphs
//! - Per-operation timing, latency profiles and business data
//! - Protocol-aware client, producer, consumer and store spans
//! - Upward error propagation from a designated error source
//! - Optional incident effects from a [`ripple_correlation::CorrelationEngine`]
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_spans::SpanTreeGenerator;
//! use std::sync::Arc;
//!
//! let mut generator = SpanTreeGenerator::new(Arc::new(graph)).with_seed(42);
//! let trace = generator.generate_trace();
//! assert!(trace.spans().all(|s| s.trace_id == trace.trace_id));
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod business;
pub mod generator;
pub mod naming;

#[cfg(test)]
mod strategies;

pub use generator::{GeneratedTrace, SpanTreeGenerator, MAX_DEPTH};
pub use naming::{StoreFamily, StoreRole};
