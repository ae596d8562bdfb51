//! Validate command implementation.

use anyhow::{Context, Result};
use ripple_model::{DependencyGraph, ScenarioConfig};
use std::path::Path;
use tracing::{info, warn};

/// Runs the validate command.
pub fn run(scenario_path: &str) -> Result<()> {
    info!("Validating scenario: {}", scenario_path);

    let config = ScenarioConfig::load(Path::new(scenario_path))
        .with_context(|| format!("Failed to load scenario: {scenario_path}"))?;
    config
        .validate()
        .with_context(|| "Scenario is invalid")?;

    let graph = DependencyGraph::new(config);
    let config = graph.config();
    info!(
        "{} services, {} databases, {} message queues",
        config.services.len(),
        config.databases.len(),
        config.message_queues.len()
    );
    info!("Entry points: {}", graph.entry_points().join(", "));

    let unresolved = graph.unresolved_dependencies();
    for missing in &unresolved {
        warn!(
            "{} depends on unknown {} '{}'",
            missing.service, missing.kind, missing.target
        );
    }

    if unresolved.is_empty() {
        info!("Scenario is valid");
    } else {
        info!(
            "Scenario is valid; {} dependencies will be skipped",
            unresolved.len()
        );
    }
    Ok(())
}
