//! Trace command implementation.

use anyhow::{Context, Result};
use ripple_model::{DependencyGraph, ScenarioConfig};
use ripple_otlp::{log_payload, trace_payload, ResourceCatalog};
use ripple_spans::SpanTreeGenerator;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Runs the trace command.
pub fn run(
    scenario_path: &str,
    seed: Option<u64>,
    error_source: Option<&str>,
    include_logs: bool,
    pretty: bool,
    output_path: Option<&str>,
) -> Result<()> {
    let config = ScenarioConfig::load(Path::new(scenario_path))
        .with_context(|| format!("Failed to load scenario: {scenario_path}"))?;
    config
        .validate()
        .with_context(|| "Scenario is invalid")?;

    let graph = Arc::new(DependencyGraph::new(config));
    let catalog = ResourceCatalog::new(&graph);

    let mut generator = SpanTreeGenerator::new(Arc::clone(&graph));
    if let Some(seed) = seed {
        generator = generator.with_seed(seed);
    }
    if let Some(service) = error_source {
        generator = generator.with_error_source(service);
    }

    let trace = generator.generate_trace();
    info!(
        "Generated trace {} with {} spans from {}",
        trace.trace_id,
        trace.len(),
        trace.entry_point.as_deref().unwrap_or("<none>")
    );

    let payload = if include_logs {
        json!({
            "traces": trace_payload(&trace, &catalog),
            "logs": log_payload(&trace, &catalog),
        })
    } else {
        trace_payload(&trace, &catalog)
    };

    let rendered = if pretty {
        serde_json::to_string_pretty(&payload)?
    } else {
        serde_json::to_string(&payload)?
    };

    if let Some(path) = output_path {
        fs::write(path, &rendered).with_context(|| format!("Failed to write output file: {path}"))?;
        info!("Trace written to: {}", path);
    } else {
        println!("{rendered}");
    }
    Ok(())
}
