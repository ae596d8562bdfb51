//! CLI command implementations.

pub mod run;
pub mod trace;
pub mod validate;
