//! Span tree generation.
//!
//! Walks the dependency graph from a randomly chosen entry point and emits
//! one causally consistent trace: every span ends no earlier than it starts
//! and no earlier than any of its children, and errors only travel from a
//! failing component up towards the entry point.

use crate::business;
use crate::naming::{self, StoreRole};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use ripple_correlation::{CorrelationEngine, EffectKind};
use ripple_model::{
    Dependency, DependencyGraph, LatencyProfile, Operation, Protocol, Service, Span, SpanKind,
    SpanStatus,
};
use std::collections::{BTreeMap, HashSet};
use std::ops::Range;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Recursion depth beyond which a branch is cut off.
pub const MAX_DEPTH: usize = 20;

const MS: u64 = 1_000_000;
const BASELINE_NS: Range<u64> = 5 * MS..25 * MS;
const CHILD_OFFSET_NS: Range<u64> = MS..4 * MS;
const PRODUCER_NS: Range<u64> = MS..6 * MS;
const QUEUE_DELAY_NS: Range<u64> = 5 * MS..15 * MS;
const NETWORK_HOP_NS: Range<u64> = MS / 2..5 * MS / 2;
const STORE_QUERY_NS: Range<u64> = 5 * MS..35 * MS;
const PARTITIONS: u32 = 12;

const DEFAULT_EFFECT_RATE: f64 = 1.0;
const DEFAULT_LATENCY_MULTIPLIER: f64 = 3.0;
const DEFAULT_TIMEOUT_MS: f64 = 5000.0;

/// One generated trace, grouped by owning service.
#[derive(Debug, Clone, Default)]
pub struct GeneratedTrace {
    /// Trace id shared by every span.
    pub trace_id: String,
    /// Entry point the trace started from.
    pub entry_point: Option<String>,
    /// Designated error source, if the error decision fired.
    pub error_source: Option<String>,
    /// Spans keyed by owning service. Services without spans are absent.
    pub spans_by_service: BTreeMap<String, Vec<Span>>,
}

impl GeneratedTrace {
    /// Iterates over every span.
    pub fn spans(&self) -> impl Iterator<Item = &Span> {
        self.spans_by_service.values().flatten()
    }

    /// Spans owned by one service.
    #[must_use]
    pub fn spans_for(&self, service: &str) -> &[Span] {
        self.spans_by_service.get(service).map_or(&[], Vec::as_slice)
    }

    /// Total number of spans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spans_by_service.values().map(Vec::len).sum()
    }

    /// Returns true if the trace has no spans.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The span without a parent.
    #[must_use]
    pub fn root(&self) -> Option<&Span> {
        self.spans().find(|s| s.is_root())
    }

    /// Returns true if any span is errored.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.spans().any(Span::is_error)
    }
}

/// How the correlation engine currently disturbs a component.
#[derive(Debug, Clone, Copy)]
struct Disruption {
    multiplier: f64,
    extra_ns: u64,
    fails: bool,
}

impl Disruption {
    const NONE: Self = Self {
        multiplier: 1.0,
        extra_ns: 0,
        fails: false,
    };

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn apply(self, duration_ns: u64) -> u64 {
        let scaled = (duration_ns as f64 * self.multiplier.max(0.0)) as u64;
        scaled.saturating_add(self.extra_ns)
    }
}

/// Per-branch traversal state.
struct Visit<'a> {
    service: &'a str,
    parent: Option<String>,
    start_ns: u64,
    kind: SpanKind,
    queue: Option<&'a str>,
    path: &'a HashSet<String>,
    depth: usize,
}

/// Outcome of one branch.
#[derive(Debug, Clone, Copy)]
struct Branch {
    end_ns: u64,
    error: bool,
}

impl Branch {
    const fn noop(start_ns: u64) -> Self {
        Self {
            end_ns: start_ns,
            error: false,
        }
    }
}

struct TraceState {
    trace_id: String,
    error_source: Option<String>,
    spans: BTreeMap<String, Vec<Span>>,
}

impl TraceState {
    fn push(&mut self, owner: &str, span: Span) {
        self.spans.entry(owner.to_string()).or_default().push(span);
    }
}

/// Generates traces from a dependency graph.
pub struct SpanTreeGenerator {
    graph: Arc<DependencyGraph>,
    rng: ChaCha8Rng,
    correlation: Option<Arc<CorrelationEngine>>,
    forced_error_source: Option<String>,
}

impl SpanTreeGenerator {
    /// Creates a generator seeded from entropy.
    #[must_use]
    pub fn new(graph: Arc<DependencyGraph>) -> Self {
        Self {
            graph,
            rng: ChaCha8Rng::from_entropy(),
            correlation: None,
            forced_error_source: None,
        }
    }

    /// Reseeds the generator for reproducible output.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    /// Consults `engine` for incident attributes and effects.
    #[must_use]
    pub fn with_correlation(mut self, engine: Arc<CorrelationEngine>) -> Self {
        self.correlation = Some(engine);
        self
    }

    /// Pins the designated error source used when the error decision fires.
    #[must_use]
    pub fn with_error_source(mut self, service: impl Into<String>) -> Self {
        self.forced_error_source = Some(service.into());
        self
    }

    /// The graph traces are generated from.
    #[must_use]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Generates one trace starting now.
    pub fn generate_trace(&mut self) -> GeneratedTrace {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
        self.generate_trace_at(now)
    }

    /// Generates one trace whose entry span starts at `start_ns`.
    pub fn generate_trace_at(&mut self, start_ns: u64) -> GeneratedTrace {
        let graph = Arc::clone(&self.graph);
        let trace_id = hex_id(&mut self.rng, 16);

        let Some(entry) = graph.entry_points().choose(&mut self.rng).cloned() else {
            return GeneratedTrace {
                trace_id,
                ..GeneratedTrace::default()
            };
        };

        let error_rate = graph.config().telemetry.error_rate;
        let error_source = if self.rng.gen::<f64>() < error_rate {
            self.forced_error_source.clone().or_else(|| {
                graph
                    .services()
                    .choose(&mut self.rng)
                    .map(|s| s.name.clone())
            })
        } else {
            None
        };

        let mut state = TraceState {
            trace_id,
            error_source,
            spans: BTreeMap::new(),
        };
        let path = HashSet::new();
        let branch = self.expand(
            &graph,
            &mut state,
            Visit {
                service: &entry,
                parent: None,
                start_ns,
                kind: SpanKind::Server,
                queue: None,
                path: &path,
                depth: 0,
            },
        );

        let trace = GeneratedTrace {
            trace_id: state.trace_id,
            entry_point: Some(entry),
            error_source: state.error_source,
            spans_by_service: state.spans,
        };
        debug!(
            "Generated trace {} from {:?}: {} spans, error={}",
            trace.trace_id,
            trace.entry_point,
            trace.len(),
            branch.error
        );
        trace
    }

    fn expand(
        &mut self,
        graph: &DependencyGraph,
        state: &mut TraceState,
        visit: Visit<'_>,
    ) -> Branch {
        if visit.depth > MAX_DEPTH || visit.path.contains(visit.service) {
            return Branch::noop(visit.start_ns);
        }
        let Some(service) = graph.service(visit.service) else {
            return Branch::noop(visit.start_ns);
        };

        let mut path = visit.path.clone();
        path.insert(service.name.clone());

        let span_id = hex_id(&mut self.rng, 8);
        let operation = service.operations.choose(&mut self.rng);
        let disruption = self.disruption(&service.name);

        let mut processing_ns = self.rng.gen_range(BASELINE_NS);
        if let Some(latency) = operation.and_then(|op| op.latency.as_ref()) {
            processing_ns = processing_ns.saturating_add(self.latency_ns(latency));
        }
        let processing_ns = disruption.apply(processing_ns);

        let child_start = visit.start_ns.saturating_add(self.rng.gen_range(CHILD_OFFSET_NS));
        let mut latest_end = child_start;
        let mut downstream_error = false;

        for dependency in &service.depends_on {
            let child = match dependency {
                Dependency::Service {
                    service: peer,
                    via: Some(queue),
                    ..
                } => self.publish_and_consume(
                    graph,
                    state,
                    service,
                    &span_id,
                    peer,
                    queue,
                    child_start,
                    &path,
                    visit.depth,
                ),
                Dependency::Service {
                    service: peer,
                    protocol,
                    via: None,
                    latency,
                } => self.call(
                    graph,
                    state,
                    service,
                    &span_id,
                    peer,
                    protocol,
                    latency.as_ref(),
                    child_start,
                    &path,
                    visit.depth,
                ),
                Dependency::Database {
                    db,
                    example_queries,
                    latency,
                } => self.query(
                    graph,
                    state,
                    service,
                    operation,
                    &span_id,
                    (db.as_str(), StoreRole::Database),
                    example_queries,
                    latency.as_ref(),
                    child_start,
                ),
                Dependency::Cache {
                    cache,
                    example_queries,
                    latency,
                } => self.query(
                    graph,
                    state,
                    service,
                    operation,
                    &span_id,
                    (cache.as_str(), StoreRole::Cache),
                    example_queries,
                    latency.as_ref(),
                    child_start,
                ),
                Dependency::Queue { queue } => {
                    self.publish(graph, state, service, &span_id, queue, child_start)
                }
            };
            downstream_error |= child.error;
            latest_end = latest_end.max(child.end_ns);
        }

        let is_source = state.error_source.as_deref() == Some(service.name.as_str());
        let error = is_source || disruption.fails || downstream_error;
        let end_ns = latest_end.max(visit.start_ns.saturating_add(processing_ns));

        let name = operation.map_or_else(
            || match (visit.kind, visit.queue) {
                (SpanKind::Consumer, Some(queue)) => format!("{queue} process"),
                (kind, _) => format!("{} {}", service.name, kind.label()),
            },
            |op| op.display_name().to_string(),
        );

        let mut span = Span::new(state.trace_id.as_str(), span_id, name)
            .with_optional_parent(visit.parent.as_deref())
            .with_service(service.name.as_str())
            .with_kind(visit.kind)
            .with_timing(visit.start_ns, end_ns)
            .with_status(status(error));

        if let Some(op) = operation {
            self.attach_business_data(&mut span, op);
        }
        if let (SpanKind::Consumer, Some(queue)) = (visit.kind, visit.queue) {
            let system = graph.queue(queue).map_or("unknown", |q| q.system.as_str());
            span.set_attribute("messaging.system", system);
            span.set_attribute("messaging.destination.name", queue);
            span.set_attribute("messaging.operation", "process");
            span.set_attribute(
                "messaging.destination.partition.id",
                self.rng.gen_range(0..PARTITIONS).to_string(),
            );
        }
        if visit.parent.is_none() {
            let (method, route) = naming::http_route(&span.name);
            span.set_attribute("http.request.method", method);
            span.set_attribute("url.path", route.as_str());
            span.set_attribute("http.route", route);
            span.set_attribute("http.response.status_code", if error { 500_i64 } else { 200 });
        }
        self.correlate(&mut span, &service.name);

        state.push(&service.name, span);
        Branch { end_ns, error }
    }

    #[allow(clippy::too_many_arguments)]
    fn publish_and_consume(
        &mut self,
        graph: &DependencyGraph,
        state: &mut TraceState,
        caller: &Service,
        parent_id: &str,
        peer: &str,
        queue: &str,
        start_ns: u64,
        path: &HashSet<String>,
        depth: usize,
    ) -> Branch {
        if graph.service(peer).is_none() {
            return Branch::noop(start_ns);
        }
        let producer = self.publish(graph, state, caller, parent_id, queue, start_ns);
        let consumer_start = producer.end_ns.saturating_add(self.rng.gen_range(QUEUE_DELAY_NS));

        // Consumers are parented to the publishing service span, not to the
        // producer span.
        let consumer = self.expand(
            graph,
            state,
            Visit {
                service: peer,
                parent: Some(parent_id.to_string()),
                start_ns: consumer_start,
                kind: SpanKind::Consumer,
                queue: Some(queue),
                path,
                depth: depth + 1,
            },
        );

        Branch {
            end_ns: producer.end_ns.max(consumer.end_ns),
            error: consumer.error,
        }
    }

    fn publish(
        &mut self,
        graph: &DependencyGraph,
        state: &mut TraceState,
        caller: &Service,
        parent_id: &str,
        queue: &str,
        start_ns: u64,
    ) -> Branch {
        let end_ns = start_ns.saturating_add(self.rng.gen_range(PRODUCER_NS));
        let instance = graph.queue(queue);

        let span_id = hex_id(&mut self.rng, 8);
        let mut span = Span::new(state.trace_id.as_str(), span_id, format!("PUBLISH {queue}"))
            .with_parent(parent_id)
            .with_service(caller.name.as_str())
            .with_kind(SpanKind::Producer)
            .with_timing(start_ns, end_ns)
            .with_status(SpanStatus::ok())
            .with_attribute(
                "messaging.system",
                instance.map_or("unknown", |q| q.system.as_str()),
            )
            .with_attribute("messaging.destination.name", queue)
            .with_attribute("messaging.operation", "publish");
        if instance.is_some() {
            span.set_attribute("net.peer.name", queue);
        }
        self.correlate(&mut span, &caller.name);

        state.push(&caller.name, span);
        Branch::noop(end_ns)
    }

    #[allow(clippy::too_many_arguments)]
    fn call(
        &mut self,
        graph: &DependencyGraph,
        state: &mut TraceState,
        caller: &Service,
        parent_id: &str,
        peer: &str,
        protocol: &Protocol,
        latency: Option<&LatencyProfile>,
        start_ns: u64,
        path: &HashSet<String>,
        depth: usize,
    ) -> Branch {
        if graph.service(peer).is_none() {
            return Branch::noop(start_ns);
        }
        let client_id = hex_id(&mut self.rng, 8);
        let mut hop_ns = self.rng.gen_range(NETWORK_HOP_NS);
        if let Some(latency) = latency {
            hop_ns = hop_ns.saturating_add(self.latency_ns(latency));
        }

        let downstream = self.expand(
            graph,
            state,
            Visit {
                service: peer,
                parent: Some(client_id.clone()),
                start_ns: start_ns.saturating_add(hop_ns),
                kind: SpanKind::Server,
                queue: None,
                path,
                depth: depth + 1,
            },
        );

        let mut span = Span::new(state.trace_id.as_str(), client_id, String::new())
            .with_parent(parent_id)
            .with_service(caller.name.as_str())
            .with_kind(SpanKind::Client)
            .with_timing(start_ns, downstream.end_ns.max(start_ns.saturating_add(hop_ns)))
            .with_status(status(downstream.error))
            .with_attribute("net.peer.name", peer)
            .with_attribute("user_agent.original", format!("ripple/{}", caller.language));

        let name = match protocol {
            Protocol::Http => {
                let method = *["GET", "POST", "PUT", "DELETE"]
                    .choose(&mut self.rng)
                    .unwrap_or(&"GET");
                span.set_attribute("http.request.method", method);
                span.set_attribute(
                    "http.response.status_code",
                    if downstream.error { 500_i64 } else { 200 },
                );
                span.set_attribute(
                    "url.full",
                    format!(
                        "http://{peer}/{}/{}",
                        caller.name.to_lowercase(),
                        hex_id(&mut self.rng, 4)
                    ),
                );
                span.set_attribute("server.address", peer);
                format!("HTTP {method}")
            }
            Protocol::Grpc => {
                let rpc_service = naming::rpc_service(peer);
                span.set_attribute("rpc.system", "grpc");
                span.set_attribute("rpc.service", rpc_service.as_str());
                span.set_attribute("rpc.method", "Process");
                span.set_attribute("rpc.grpc.status_code", if downstream.error { 13_i64 } else { 0 });
                format!("GRPC {rpc_service}/Process")
            }
            Protocol::Other(_) => format!("CALL {peer}"),
        };
        span.name = name;
        self.correlate(&mut span, &caller.name);

        let end_ns = span.end_time_ns;
        state.push(&caller.name, span);
        Branch {
            end_ns,
            error: downstream.error,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn query(
        &mut self,
        graph: &DependencyGraph,
        state: &mut TraceState,
        caller: &Service,
        operation: Option<&Operation>,
        parent_id: &str,
        (store, role): (&str, StoreRole),
        example_queries: &[String],
        latency: Option<&LatencyProfile>,
        start_ns: u64,
    ) -> Branch {
        let disruption = self.disruption(store);
        let mut duration_ns = self.rng.gen_range(STORE_QUERY_NS);
        if let Some(latency) = latency {
            duration_ns = duration_ns.saturating_add(self.latency_ns(latency));
        }
        let duration_ns = disruption.apply(duration_ns);

        let query = operation
            .map(|op| op.db_queries.as_slice())
            .filter(|queries| !queries.is_empty())
            .unwrap_or(example_queries)
            .choose(&mut self.rng)
            .cloned();
        let session_key = hex_id(&mut self.rng, 8);
        let (name, attributes) = naming::store_span(
            store,
            role,
            graph.database(store),
            &caller.name,
            query.as_deref(),
            &session_key,
        );

        let end_ns = start_ns.saturating_add(duration_ns);
        let mut span = Span::new(state.trace_id.as_str(), hex_id(&mut self.rng, 8), name)
            .with_parent(parent_id)
            .with_service(caller.name.as_str())
            .with_kind(SpanKind::Client)
            .with_timing(start_ns, end_ns)
            .with_status(status(disruption.fails));
        span.attributes.extend(attributes);
        self.correlate(&mut span, store);

        state.push(&caller.name, span);
        Branch {
            end_ns,
            error: disruption.fails,
        }
    }

    fn attach_business_data(&mut self, span: &mut Span, operation: &Operation) {
        for field in &operation.business_data {
            if let Some(value) = business::generate(field, &mut self.rng) {
                span.set_attribute(field.name.as_str(), value);
            }
        }
    }

    fn correlate(&self, span: &mut Span, component: &str) {
        if let Some(engine) = &self.correlation {
            span.attributes.extend(engine.attributes_for(component));
        }
    }

    fn disruption(&mut self, component: &str) -> Disruption {
        let Some(effect) = self
            .correlation
            .as_ref()
            .and_then(|engine| engine.effect_for(component))
        else {
            return Disruption::NONE;
        };

        match effect.kind() {
            EffectKind::Error => Disruption {
                fails: self.rng.gen::<f64>() < effect.number_or("rate", DEFAULT_EFFECT_RATE),
                ..Disruption::NONE
            },
            EffectKind::Latency => Disruption {
                multiplier: effect.number_or("multiplier", DEFAULT_LATENCY_MULTIPLIER),
                ..Disruption::NONE
            },
            EffectKind::Timeout => Disruption {
                extra_ns: millis_to_ns(effect.number_or("timeout_ms", DEFAULT_TIMEOUT_MS)),
                fails: true,
                ..Disruption::NONE
            },
            EffectKind::Other => Disruption::NONE,
        }
    }

    fn latency_ns(&mut self, latency: &LatencyProfile) -> u64 {
        if self.rng.gen::<f64>() >= latency.probability {
            return 0;
        }
        let ms = if latency.max_ms > latency.min_ms {
            self.rng.gen_range(latency.min_ms..=latency.max_ms)
        } else {
            latency.min_ms
        };
        ms.saturating_mul(MS)
    }
}

fn status(error: bool) -> SpanStatus {
    if error {
        SpanStatus::error()
    } else {
        SpanStatus::ok()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn millis_to_ns(ms: f64) -> u64 {
    (ms.max(0.0) * 1_000_000.0) as u64
}

/// Random lowercase hex id of `bytes` bytes.
fn hex_id<R: Rng + ?Sized>(rng: &mut R, bytes: usize) -> String {
    use std::fmt::Write;

    let mut id = String::with_capacity(bytes * 2);
    for _ in 0..bytes {
        let _ = write!(id, "{:02x}", rng.gen::<u8>());
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies;
    use proptest::prelude::*;
    use ripple_correlation::{CascadeStage, IncidentRequest, RootCauseType};
    use ripple_model::{AttributeValue, BusinessDataField, FieldKind, ScenarioConfig, TelemetryConfig};
    use std::collections::HashMap;

    const START: u64 = 1_700_000_000_000_000_000;

    fn generator(config: ScenarioConfig) -> SpanTreeGenerator {
        SpanTreeGenerator::new(Arc::new(DependencyGraph::new(config))).with_seed(42)
    }

    fn checkout() -> ScenarioConfig {
        ScenarioConfig::new(vec![
            Service::new("frontend").with_dependency(Dependency::service("api-gateway")),
            Service::new("api-gateway")
                .with_dependency(Dependency::service("user-service"))
                .with_dependency(Dependency::database("postgres")),
            Service::new("user-service"),
        ])
        .with_database("postgres", "postgres")
    }

    fn by_id(trace: &GeneratedTrace) -> HashMap<&str, &Span> {
        trace.spans().map(|s| (s.span_id.as_str(), s)).collect()
    }

    fn service_span<'a>(trace: &'a GeneratedTrace, service: &str) -> &'a Span {
        trace
            .spans_for(service)
            .iter()
            .find(|s| matches!(s.kind, SpanKind::Server | SpanKind::Consumer))
            .unwrap()
    }

    fn ancestors<'a>(index: &HashMap<&str, &'a Span>, span: &Span) -> Vec<&'a Span> {
        let mut out = Vec::new();
        let mut parent = span.parent_span_id.as_deref();
        while let Some(id) = parent {
            let Some(p) = index.get(id) else { break };
            out.push(*p);
            parent = p.parent_span_id.as_deref();
        }
        out
    }

    #[test]
    fn error_source_marks_path_to_entry() {
        let config = checkout().with_telemetry(TelemetryConfig::default().with_error_rate(1.0));
        let trace = generator(config)
            .with_error_source("user-service")
            .generate_trace_at(START);

        assert_eq!(trace.error_source.as_deref(), Some("user-service"));
        assert!(service_span(&trace, "user-service").is_error());
        assert!(service_span(&trace, "api-gateway").is_error());
        assert!(service_span(&trace, "frontend").is_error());

        let query = trace
            .spans_for("api-gateway")
            .iter()
            .find(|s| s.name == "SELECT postgres")
            .unwrap();
        assert!(!query.is_error());

        let root = trace.root().unwrap();
        assert_eq!(root.service, "frontend");
        assert_eq!(root.http_status_code(), Some(500));
    }

    #[test]
    fn sibling_branches_stay_ok() {
        let config = ScenarioConfig::new(vec![
            Service::new("api")
                .with_dependency(Dependency::service("users"))
                .with_dependency(Dependency::service("orders")),
            Service::new("users"),
            Service::new("orders"),
        ])
        .with_telemetry(TelemetryConfig::default().with_error_rate(1.0));
        let trace = generator(config).with_error_source("users").generate_trace_at(START);

        assert!(service_span(&trace, "users").is_error());
        assert!(!service_span(&trace, "orders").is_error());
        assert!(service_span(&trace, "api").is_error());
    }

    #[test]
    fn unreachable_error_source_leaves_trace_clean() {
        let config = ScenarioConfig::new(vec![Service::new("api"), Service::new("batch")])
            .with_telemetry(TelemetryConfig::default().with_error_rate(1.0));
        let mut traces = generator(config).with_error_source("batch");

        for _ in 0..50 {
            let trace = traces.generate_trace_at(START);
            if trace.entry_point.as_deref() == Some("api") {
                assert_eq!(trace.error_source.as_deref(), Some("batch"));
                assert!(!trace.has_error());
                return;
            }
        }
        panic!("entry point 'api' was never chosen");
    }

    #[test]
    fn zero_error_rate_never_errors() {
        let config = checkout().with_telemetry(TelemetryConfig::default().with_error_rate(0.0));
        let mut traces = generator(config);
        for _ in 0..20 {
            let trace = traces.generate_trace_at(START);
            assert!(trace.error_source.is_none());
            assert!(!trace.has_error());
        }
    }

    #[test]
    fn cycle_terminates() {
        let config = ScenarioConfig::new(vec![
            Service::new("a").with_dependency(Dependency::service("b")),
            Service::new("b").with_dependency(Dependency::service("a")),
        ]);
        let trace = generator(config).generate_trace_at(START);

        let servers = trace.spans().filter(|s| s.kind == SpanKind::Server).count();
        assert_eq!(servers, 2);
    }

    #[test]
    fn unknown_peer_is_skipped() {
        let config = ScenarioConfig::new(vec![Service::new("api")
            .with_dependency(Dependency::service("ghost"))
            .with_dependency(Dependency::service_via("phantom", "orders"))]);
        let trace = generator(config).generate_trace_at(START);

        assert_eq!(trace.len(), 1);
        assert!(trace.root().unwrap().is_root());
    }

    #[test]
    fn queue_routed_call_emits_producer_and_consumer() {
        let config = ScenarioConfig::new(vec![
            Service::new("orders").with_dependency(Dependency::service_via("billing", "jobs")),
            Service::new("billing"),
        ])
        .with_queue("jobs", "kafka");
        let trace = generator(config).generate_trace_at(START);

        let orders = service_span(&trace, "orders");
        let producer = trace
            .spans_for("orders")
            .iter()
            .find(|s| s.kind == SpanKind::Producer)
            .unwrap();
        assert_eq!(producer.name, "PUBLISH jobs");
        assert_eq!(producer.parent_span_id.as_deref(), Some(orders.span_id.as_str()));

        let consumer = service_span(&trace, "billing");
        assert_eq!(consumer.kind, SpanKind::Consumer);
        assert_eq!(consumer.name, "jobs process");
        assert_eq!(consumer.parent_span_id.as_deref(), Some(orders.span_id.as_str()));
        assert!(consumer.start_time_ns >= producer.end_time_ns + 5 * MS);
        assert_eq!(
            consumer.get_attribute("messaging.system").and_then(AttributeValue::as_str),
            Some("kafka")
        );
        assert!(consumer.get_attribute("messaging.destination.partition.id").is_some());
    }

    #[test]
    fn queue_publish_has_no_consumer() {
        let config = ScenarioConfig::new(vec![Service::new("audit-writer")
            .with_dependency(Dependency::queue("audit"))])
        .with_queue("audit", "rabbitmq");
        let trace = generator(config).generate_trace_at(START);

        assert_eq!(trace.len(), 2);
        assert!(trace.spans().all(|s| s.kind != SpanKind::Consumer));
        assert!(trace.spans().any(|s| s.kind == SpanKind::Producer));
    }

    #[test]
    fn grpc_failure_sets_status_code() {
        let config = ScenarioConfig::new(vec![
            Service::new("web")
                .with_dependency(Dependency::service_with_protocol("ledger", Protocol::Grpc)),
            Service::new("ledger"),
        ])
        .with_telemetry(TelemetryConfig::default().with_error_rate(1.0));
        let trace = generator(config).with_error_source("ledger").generate_trace_at(START);

        let client = trace
            .spans_for("web")
            .iter()
            .find(|s| s.kind == SpanKind::Client)
            .unwrap();
        assert_eq!(client.name, "GRPC LedgerService/Process");
        assert!(client.is_error());
        assert_eq!(
            client.get_attribute("rpc.grpc.status_code").and_then(AttributeValue::as_i64),
            Some(13)
        );
    }

    #[test]
    fn http_failure_sets_status_code() {
        let config = checkout().with_telemetry(TelemetryConfig::default().with_error_rate(1.0));
        let trace = generator(config)
            .with_error_source("api-gateway")
            .generate_trace_at(START);

        let client = trace
            .spans_for("frontend")
            .iter()
            .find(|s| s.kind == SpanKind::Client)
            .unwrap();
        assert!(client.is_error());
        assert_eq!(client.http_status_code(), Some(500));
        assert!(client.name.starts_with("HTTP "));
    }

    #[test]
    fn operation_drives_name_and_business_data() {
        let op = Operation::new("Pay")
            .with_span_name("POST /payments")
            .with_field(BusinessDataField::new("tier", FieldKind::Enum).with_values(["gold"]));
        let config = ScenarioConfig::new(vec![Service::new("payments").with_operation(op)])
            .with_telemetry(TelemetryConfig::default().with_error_rate(0.0));
        let trace = generator(config).generate_trace_at(START);

        let root = trace.root().unwrap();
        assert_eq!(root.name, "POST /payments");
        assert_eq!(
            root.get_attribute("http.route").and_then(AttributeValue::as_str),
            Some("/payments")
        );
        assert_eq!(
            root.get_attribute("http.request.method").and_then(AttributeValue::as_str),
            Some("POST")
        );
        assert_eq!(root.get_attribute("tier").and_then(AttributeValue::as_str), Some("gold"));
        assert_eq!(root.http_status_code(), Some(200));
    }

    #[test]
    fn same_seed_same_trace() {
        let a = generator(checkout()).generate_trace_at(START);
        let b = generator(checkout()).generate_trace_at(START);
        assert_eq!(a.trace_id, b.trace_id);
        assert_eq!(a.spans_by_service, b.spans_by_service);
    }

    #[test]
    fn ids_are_lowercase_hex() {
        let trace = generator(checkout()).generate_trace_at(START);
        assert_eq!(trace.trace_id.len(), 32);
        for span in trace.spans() {
            assert_eq!(span.span_id.len(), 16);
            assert!(span.span_id.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        }
    }

    #[test]
    fn store_timeout_fails_caller() {
        let engine = Arc::new(CorrelationEngine::new());
        engine
            .start_incident(
                IncidentRequest::new("job", RootCauseType::Infrastructure, "postgres")
                    .with_stages(vec![CascadeStage::new("postgres", "timeout")
                        .with_parameter("timeout_ms", 2000)]),
            )
            .unwrap();

        let config = checkout().with_telemetry(TelemetryConfig::default().with_error_rate(0.0));
        let trace = generator(config)
            .with_correlation(Arc::clone(&engine))
            .generate_trace_at(START);

        let query = trace
            .spans_for("api-gateway")
            .iter()
            .find(|s| s.name == "SELECT postgres")
            .unwrap();
        assert!(query.is_error());
        assert!(query.duration().as_millis() >= 2000);
        assert!(query.get_attribute("incident.id").is_some());
        assert!(service_span(&trace, "api-gateway").is_error());
        assert!(service_span(&trace, "frontend").is_error());
        assert!(!service_span(&trace, "user-service").is_error());
    }

    #[test]
    fn extreme_latencies_saturate_timestamps() {
        let huge = LatencyProfile::new(20_000_000_000_000, 20_000_000_000_000);
        let config = ScenarioConfig::new(vec![
            Service::new("frontend")
                .with_operation(Operation::new("checkout").with_latency(huge.clone()))
                .with_dependency(Dependency::service("api-gateway"))
                .with_dependency(Dependency::database("postgres")),
            Service::new("api-gateway").with_operation(Operation::new("route").with_latency(huge)),
        ])
        .with_database("postgres", "postgres");
        config.validate().unwrap();

        let engine = Arc::new(CorrelationEngine::new());
        engine
            .start_incident(
                IncidentRequest::new("job", RootCauseType::Infrastructure, "postgres")
                    .with_stages(vec![CascadeStage::new("postgres", "timeout")
                        .with_parameter("timeout_ms", 1e30)]),
            )
            .unwrap();
        engine
            .start_incident(
                IncidentRequest::new("job", RootCauseType::Application, "api-gateway")
                    .with_stages(vec![CascadeStage::new("api-gateway", "latency_spike")
                        .with_parameter("multiplier", 1e12)]),
            )
            .unwrap();

        let trace = generator(config)
            .with_correlation(engine)
            .generate_trace_at(START);

        assert!(!trace.is_empty());
        for span in trace.spans() {
            assert!(span.end_time_ns >= span.start_time_ns);
        }
        assert_eq!(service_span(&trace, "frontend").end_time_ns, u64::MAX);
    }

    #[test]
    fn latency_effect_slows_service_without_error() {
        let engine = Arc::new(CorrelationEngine::new());
        engine
            .start_incident(
                IncidentRequest::new("job", RootCauseType::Application, "user-service")
                    .with_stages(vec![CascadeStage::new("user-service", "latency_spike")
                        .with_parameter("multiplier", 100.0)]),
            )
            .unwrap();

        let config = checkout().with_telemetry(TelemetryConfig::default().with_error_rate(0.0));
        let trace = generator(config)
            .with_correlation(engine)
            .generate_trace_at(START);

        let users = service_span(&trace, "user-service");
        assert!(users.duration().as_millis() >= 500);
        assert!(!users.is_error());
        assert_eq!(
            users.get_attribute("incident.root_cause.component").and_then(AttributeValue::as_str),
            Some("user-service")
        );
        assert!(service_span(&trace, "frontend").get_attribute("incident.id").is_none());
    }

    proptest! {
        #[test]
        fn spans_are_causal(config in strategies::scenario(), seed in any::<u64>()) {
            let trace = generator(config).with_seed(seed).generate_trace_at(START);
            let index = by_id(&trace);

            for span in trace.spans() {
                prop_assert!(span.end_time_ns >= span.start_time_ns);
                if let Some(parent) = span.parent_span_id.as_deref() {
                    let parent = index.get(parent);
                    prop_assert!(parent.is_some());
                    prop_assert!(parent.unwrap().end_time_ns >= span.end_time_ns);
                }
            }
        }

        #[test]
        fn one_trace_id_and_unique_span_ids(config in strategies::scenario(), seed in any::<u64>()) {
            let trace = generator(config).with_seed(seed).generate_trace_at(START);

            prop_assert!(trace.spans().all(|s| s.trace_id == trace.trace_id));
            prop_assert_eq!(by_id(&trace).len(), trace.len());
            prop_assert_eq!(trace.spans().filter(|s| s.is_root()).count(), 1);
        }

        #[test]
        fn services_appear_once_per_path(config in strategies::scenario(), seed in any::<u64>()) {
            let trace = generator(config).with_seed(seed).generate_trace_at(START);
            let index = by_id(&trace);
            let is_service_span = |s: &Span| matches!(s.kind, SpanKind::Server | SpanKind::Consumer);

            for span in trace.spans().filter(|&s| is_service_span(s)) {
                let repeats = ancestors(&index, span)
                    .into_iter()
                    .filter(|&a| is_service_span(a) && a.service == span.service)
                    .count();
                prop_assert_eq!(repeats, 0);
            }
        }

        #[test]
        fn errors_only_flow_upward(config in strategies::scenario(), seed in any::<u64>()) {
            let trace = generator(config).with_seed(seed).generate_trace_at(START);
            let index = by_id(&trace);
            let source = trace.error_source.clone();

            for span in trace.spans().filter(|s| s.is_error()) {
                let own_fault = matches!(span.kind, SpanKind::Server | SpanKind::Consumer)
                    && source.as_deref() == Some(span.service.as_str());
                let child_fault = trace.spans().any(|c| {
                    c.is_error() && c.parent_span_id.as_deref() == Some(span.span_id.as_str())
                });
                prop_assert!(own_fault || child_fault, "unexplained error on {}", span.name);
            }

            for span in trace.spans().filter(|s| {
                matches!(s.kind, SpanKind::Server | SpanKind::Consumer)
                    && source.as_deref() == Some(s.service.as_str())
            }) {
                prop_assert!(span.is_error());
                for ancestor in ancestors(&index, span) {
                    prop_assert!(ancestor.is_error());
                }
            }
        }
    }
}
