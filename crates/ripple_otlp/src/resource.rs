//! Per-service resource attributes.

use rand::prelude::*;
use ripple_model::{AttributeValue, Attributes, DependencyGraph, Service};
use std::collections::HashMap;

const NAMESPACE: &str = "ripple";
const SERVICE_VERSION: &str = "1.2.3";
const SDK_VERSION: &str = "1.24.0";

/// Runtime name and version reported for a language tag.
#[must_use]
pub fn runtime_info(language: &str) -> (&str, &str) {
    match language.to_ascii_lowercase().as_str() {
        "python" => ("CPython", "3.11.5"),
        "java" => ("OpenJDK Runtime Environment", "17.0.5"),
        "nodejs" | "javascript" | "typescript" => ("node.js", "18.12.1"),
        "go" => ("go", "1.21.0"),
        "ruby" => ("ruby", "3.2.2"),
        "dotnet" => (".NET", "7.0.0"),
        _ => (language, "1.0.0"),
    }
}

/// Resource attributes for every service of a job, generated once.
#[derive(Debug, Clone, Default)]
pub struct ResourceCatalog {
    by_service: HashMap<String, Attributes>,
}

impl ResourceCatalog {
    /// Builds the catalog with random instance ids.
    #[must_use]
    pub fn new(graph: &DependencyGraph) -> Self {
        Self::with_rng(graph, &mut thread_rng())
    }

    /// Builds the catalog drawing instance ids from `rng`.
    pub fn with_rng<R: Rng + ?Sized>(graph: &DependencyGraph, rng: &mut R) -> Self {
        let by_service = graph
            .services()
            .iter()
            .map(|service| (service.name.clone(), Self::describe(service, rng)))
            .collect();
        Self { by_service }
    }

    fn describe<R: Rng + ?Sized>(service: &Service, rng: &mut R) -> Attributes {
        let (runtime, runtime_version) = runtime_info(&service.language);
        let instance = format!("{}-{:012x}", service.name, rng.gen::<u64>() & 0xffff_ffff_ffff);
        let host = format!("{}-{:04x}", service.name, rng.gen::<u16>());

        [
            ("service.name", service.name.as_str()),
            ("service.namespace", NAMESPACE),
            ("service.version", SERVICE_VERSION),
            ("service.instance.id", instance.as_str()),
            ("telemetry.sdk.language", service.language.as_str()),
            ("telemetry.sdk.name", "opentelemetry"),
            ("telemetry.sdk.version", SDK_VERSION),
            ("process.runtime.name", runtime),
            ("process.runtime.version", runtime_version),
            ("cloud.provider", "aws"),
            ("cloud.region", "us-west-2"),
            ("deployment.environment", "production"),
            ("host.name", host.as_str()),
            ("os.type", "linux"),
            ("os.description", "Linux 5.15.0-1042-aws"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), AttributeValue::from(value)))
        .collect()
    }

    /// Resource attributes of `service`, or just `service.name` if unknown.
    #[must_use]
    pub fn attributes(&self, service: &str) -> Attributes {
        self.by_service.get(service).cloned().unwrap_or_else(|| {
            let mut attrs = Attributes::new();
            attrs.insert("service.name".into(), service.into());
            attrs
        })
    }

    /// Returns true if `service` has catalogued attributes.
    #[must_use]
    pub fn contains(&self, service: &str) -> bool {
        self.by_service.contains_key(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;
    use ripple_model::ScenarioConfig;

    #[test]
    fn describes_each_service() {
        let config = ScenarioConfig::new(vec![
            Service::new("api").with_language("java"),
            Service::new("worker").with_language("elixir"),
        ]);
        let graph = DependencyGraph::new(config);
        let catalog = ResourceCatalog::with_rng(&graph, &mut ChaCha8Rng::seed_from_u64(1));

        let api = catalog.attributes("api");
        assert_eq!(
            api.get("process.runtime.name").and_then(AttributeValue::as_str),
            Some("OpenJDK Runtime Environment")
        );
        assert!(api
            .get("service.instance.id")
            .and_then(AttributeValue::as_str)
            .is_some_and(|id| id.starts_with("api-")));

        let worker = catalog.attributes("worker");
        assert_eq!(
            worker.get("process.runtime.version").and_then(AttributeValue::as_str),
            Some("1.0.0")
        );
    }

    #[test]
    fn unknown_service_gets_name_only() {
        let catalog = ResourceCatalog::default();
        let attrs = catalog.attributes("ghost");
        assert_eq!(attrs.len(), 1);
        assert!(!catalog.contains("ghost"));
    }
}
