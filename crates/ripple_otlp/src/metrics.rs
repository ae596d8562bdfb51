//! Per-service application metrics.

use crate::payload::{encode_attributes, SCOPE_NAME};
use crate::resource::ResourceCatalog;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use ripple_correlation::CorrelationEngine;
use ripple_model::{Attributes, DependencyGraph, Service};
use serde_json::{json, Value};
use std::collections::HashMap;

const CUMULATIVE: i32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counters {
    requests: u64,
    errors: u64,
    runtime: u64,
}

/// Cumulative metric state for the services of one job.
///
/// Counters are private to the owning job and only ever grow.
#[derive(Debug)]
pub struct ServiceMetrics {
    counters: HashMap<String, Counters>,
    rng: ChaCha8Rng,
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    /// Creates empty counters seeded from entropy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: HashMap::new(),
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Reseeds the generator.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    /// Total requests counted so far for `service`.
    #[must_use]
    pub fn requests(&self, service: &str) -> u64 {
        self.counters.get(service).map_or(0, |c| c.requests)
    }

    /// Total errors counted so far for `service`.
    #[must_use]
    pub fn errors(&self, service: &str) -> u64 {
        self.counters.get(service).map_or(0, |c| c.errors)
    }

    /// Advances the counters and builds an OTLP `MetricsData` payload.
    ///
    /// Services covered by a live incident report saturated CPU, extra
    /// errors, and carry the incident's correlation attributes on every data
    /// point.
    pub fn payload(
        &mut self,
        graph: &DependencyGraph,
        catalog: &ResourceCatalog,
        correlation: Option<&CorrelationEngine>,
        now_ns: u64,
    ) -> Value {
        let error_rate = graph.config().telemetry.error_rate;
        let resource_metrics: Vec<Value> = graph
            .services()
            .iter()
            .map(|service| {
                let incident = correlation
                    .map(|engine| engine.attributes_for(&service.name))
                    .unwrap_or_default();
                let metrics = self.service_metrics(service, error_rate, &incident, now_ns);
                json!({
                    "resource": { "attributes": encode_attributes(&catalog.attributes(&service.name)) },
                    "scopeMetrics": [{ "scope": { "name": SCOPE_NAME }, "metrics": metrics }],
                })
            })
            .collect();

        json!({ "resourceMetrics": resource_metrics })
    }

    fn service_metrics(
        &mut self,
        service: &Service,
        error_rate: f64,
        incident: &Attributes,
        now_ns: u64,
    ) -> Vec<Value> {
        let affected = !incident.is_empty();
        let time = now_ns.to_string();
        let attrs = encode_attributes(incident);
        let point = |value: Value| {
            let mut point = json!({ "timeUnixNano": time, "attributes": attrs });
            if let (Some(obj), Some(value)) = (point.as_object_mut(), value.as_object()) {
                obj.extend(value.clone());
            }
            point
        };

        let cpu = if affected {
            self.rng.gen_range(0.85..0.99)
        } else {
            self.rng.gen_range(0.1..0.9)
        };
        let memory: u64 = self.rng.gen_range(200_000_000..800_000_000);
        let new_requests = self.rng.gen_range(5..=20);
        let new_errors = if affected {
            self.rng.gen_range(1..=5)
        } else {
            u64::from(self.rng.gen::<f64>() < error_rate)
        };
        let runtime_step = self.rng.gen_range(0..=3);

        let counters = self.counters.entry(service.name.clone()).or_default();
        counters.requests += new_requests;
        counters.errors += new_errors;
        let snapshot = *counters;

        let mut metrics = vec![
            gauge("system.cpu.utilization", "%", point(json!({ "asDouble": cpu }))),
            gauge(
                "process.memory.usage",
                "By",
                point(json!({ "asInt": memory.to_string() })),
            ),
            sum(
                "http.server.request.count",
                "requests",
                point(json!({ "asInt": snapshot.requests.to_string() })),
            ),
            sum(
                "http.server.request.error.count",
                "errors",
                point(json!({ "asInt": snapshot.errors.to_string() })),
            ),
        ];

        match service.language.to_ascii_lowercase().as_str() {
            "java" => {
                let total = self.bump_runtime(&service.name, runtime_step.min(2));
                metrics.push(sum(
                    "jvm.gc.collection_count",
                    "collections",
                    point(json!({ "asInt": total.to_string() })),
                ));
            }
            "python" => {
                let total = self.bump_runtime(&service.name, runtime_step);
                metrics.push(sum(
                    "python.gc.collections",
                    "collections",
                    point(json!({ "asInt": total.to_string() })),
                ));
            }
            "go" => {
                let goroutines: u32 = self.rng.gen_range(20..=150);
                metrics.push(gauge(
                    "go.goroutines",
                    "goroutines",
                    point(json!({ "asInt": goroutines.to_string() })),
                ));
            }
            "nodejs" => {
                let delay: f64 = self.rng.gen_range(0.5..5.0);
                metrics.push(gauge(
                    "nodejs.eventloop.delay.avg",
                    "ms",
                    point(json!({ "asDouble": delay })),
                ));
            }
            _ => {}
        }

        metrics
    }

    fn bump_runtime(&mut self, service: &str, step: u64) -> u64 {
        let counters = self.counters.entry(service.to_string()).or_default();
        counters.runtime += step;
        counters.runtime
    }
}

fn gauge(name: &str, unit: &str, point: Value) -> Value {
    json!({ "name": name, "unit": unit, "gauge": { "dataPoints": [point] } })
}

fn sum(name: &str, unit: &str, point: Value) -> Value {
    json!({
        "name": name,
        "unit": unit,
        "sum": {
            "isMonotonic": true,
            "aggregationTemporality": CUMULATIVE,
            "dataPoints": [point],
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_correlation::{IncidentRequest, RootCauseType};
    use ripple_model::ScenarioConfig;

    fn graph() -> DependencyGraph {
        DependencyGraph::new(ScenarioConfig::new(vec![
            Service::new("api").with_language("java"),
            Service::new("worker").with_language("go"),
        ]))
    }

    fn metric_names(payload: &Value, index: usize) -> Vec<String> {
        payload["resourceMetrics"][index]["scopeMetrics"][0]["metrics"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn emits_runtime_metric_by_language() {
        let mut metrics = ServiceMetrics::new().with_seed(3);
        let payload = metrics.payload(&graph(), &ResourceCatalog::default(), None, 1);

        assert!(metric_names(&payload, 0).contains(&"jvm.gc.collection_count".to_string()));
        assert!(metric_names(&payload, 1).contains(&"go.goroutines".to_string()));
        assert_eq!(metric_names(&payload, 0).len(), 5);
    }

    #[test]
    fn counters_are_cumulative() {
        let graph = graph();
        let catalog = ResourceCatalog::default();
        let mut metrics = ServiceMetrics::new().with_seed(3);

        metrics.payload(&graph, &catalog, None, 1);
        let first = metrics.requests("api");
        metrics.payload(&graph, &catalog, None, 2);

        assert!(first >= 5);
        assert!(metrics.requests("api") >= first + 5);
    }

    #[test]
    fn affected_services_carry_incident_context() {
        let engine = CorrelationEngine::new();
        engine
            .start_incident(IncidentRequest::new("job", RootCauseType::Application, "api"))
            .unwrap();

        let mut metrics = ServiceMetrics::new().with_seed(3);
        let payload = metrics.payload(&graph(), &ResourceCatalog::default(), Some(&engine), 1);

        let cpu = &payload["resourceMetrics"][0]["scopeMetrics"][0]["metrics"][0];
        let point = &cpu["gauge"]["dataPoints"][0];
        assert!(point["asDouble"].as_f64().unwrap() >= 0.85);
        assert!(point["attributes"]
            .as_array()
            .unwrap()
            .iter()
            .any(|kv| kv["key"] == "incident.id"));
        assert!(metrics.errors("api") >= 1);

        let worker_point =
            &payload["resourceMetrics"][1]["scopeMetrics"][0]["metrics"][0]["gauge"]["dataPoints"][0];
        assert!(worker_point["attributes"].as_array().unwrap().is_empty());
    }
}
