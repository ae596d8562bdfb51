//! Scenario configuration model.
//!
//! A scenario describes the simulated system: its services and their typed
//! dependencies, the backing stores and queues, and how much telemetry to
//! emit. Scenarios are loaded from YAML or JSON and validated before use.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// A complete simulation scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Simulated services, in declaration order.
    pub services: Vec<Service>,
    /// Data stores referenced by `db`/`cache` dependencies.
    #[serde(default)]
    pub databases: Vec<StoreInstance>,
    /// Message queues referenced by `via`/`queue` dependencies.
    #[serde(default)]
    pub message_queues: Vec<MessageQueue>,
    /// Emission settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Telemetry emission settings for a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Traces generated per second. Zero disables the trace loop.
    pub trace_rate: u32,
    /// Probability that a trace contains an error (0.0 - 1.0).
    pub error_rate: f64,
    /// Seconds between metric emissions.
    pub metrics_interval: u64,
    /// Whether to derive log records from spans.
    pub include_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            trace_rate: 1,
            error_rate: 0.05,
            metrics_interval: 10,
            include_logs: true,
        }
    }
}

impl TelemetryConfig {
    /// Sets the error rate.
    #[must_use]
    pub const fn with_error_rate(mut self, rate: f64) -> Self {
        self.error_rate = rate;
        self
    }

    /// Sets the trace rate.
    #[must_use]
    pub const fn with_trace_rate(mut self, rate: u32) -> Self {
        self.trace_rate = rate;
        self
    }
}

/// A simulated service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// Unique service name.
    pub name: String,
    /// Implementation language tag (drives runtime metrics and resource attributes).
    #[serde(default = "default_language")]
    pub language: String,
    /// Optional free-form role (frontend, backend, worker, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Ordered dependency list.
    #[serde(default)]
    pub depends_on: Vec<Dependency>,
    /// Named business operations.
    #[serde(default)]
    pub operations: Vec<Operation>,
}

fn default_language() -> String {
    "python".to_string()
}

impl Service {
    /// Creates a service with no dependencies.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: default_language(),
            role: None,
            depends_on: Vec::new(),
            operations: Vec::new(),
        }
    }

    /// Sets the language tag.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Appends a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.depends_on.push(dependency);
        self
    }

    /// Appends an operation.
    #[must_use]
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }
}

/// A typed dependency of a service.
///
/// The variant is chosen by the key present in the source document:
/// `service`, `db`, `cache` or `queue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dependency {
    /// Synchronous call to, or queue-routed message for, a peer service.
    Service {
        /// Target service name.
        service: String,
        /// Call protocol.
        #[serde(default)]
        protocol: Protocol,
        /// Queue the call is routed through, if asynchronous.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        via: Option<String>,
        /// Extra latency applied to the network hop.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        latency: Option<LatencyProfile>,
    },
    /// Query against a data store.
    Database {
        /// Store name.
        db: String,
        /// Example statements used for `db.statement`.
        #[serde(default)]
        example_queries: Vec<String>,
        /// Extra query latency.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        latency: Option<LatencyProfile>,
    },
    /// Query against a cache.
    Cache {
        /// Cache name.
        cache: String,
        /// Example commands used for `db.statement`.
        #[serde(default)]
        example_queries: Vec<String>,
        /// Extra query latency.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        latency: Option<LatencyProfile>,
    },
    /// Fire-and-forget publish to a queue.
    Queue {
        /// Queue name.
        queue: String,
    },
}

impl Dependency {
    /// Creates a direct HTTP call to a peer service.
    #[must_use]
    pub fn service(name: impl Into<String>) -> Self {
        Self::Service {
            service: name.into(),
            protocol: Protocol::Http,
            via: None,
            latency: None,
        }
    }

    /// Creates a direct call with an explicit protocol.
    #[must_use]
    pub fn service_with_protocol(name: impl Into<String>, protocol: Protocol) -> Self {
        Self::Service {
            service: name.into(),
            protocol,
            via: None,
            latency: None,
        }
    }

    /// Creates a queue-routed call to a peer service.
    #[must_use]
    pub fn service_via(name: impl Into<String>, queue: impl Into<String>) -> Self {
        Self::Service {
            service: name.into(),
            protocol: Protocol::Http,
            via: Some(queue.into()),
            latency: None,
        }
    }

    /// Creates a data-store dependency.
    #[must_use]
    pub fn database(name: impl Into<String>) -> Self {
        Self::Database {
            db: name.into(),
            example_queries: Vec::new(),
            latency: None,
        }
    }

    /// Creates a cache dependency.
    #[must_use]
    pub fn cache(name: impl Into<String>) -> Self {
        Self::Cache {
            cache: name.into(),
            example_queries: Vec::new(),
            latency: None,
        }
    }

    /// Creates a queue-publish dependency.
    #[must_use]
    pub fn queue(name: impl Into<String>) -> Self {
        Self::Queue { queue: name.into() }
    }

    /// Name of the component this dependency points at.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::Service { service, .. } => service,
            Self::Database { db, .. } => db,
            Self::Cache { cache, .. } => cache,
            Self::Queue { queue } => queue,
        }
    }

    /// Returns the peer service name if this is a peer-service call.
    #[must_use]
    pub fn peer_service(&self) -> Option<&str> {
        match self {
            Self::Service { service, .. } => Some(service),
            _ => None,
        }
    }

    fn latency(&self) -> Option<&LatencyProfile> {
        match self {
            Self::Service { latency, .. }
            | Self::Database { latency, .. }
            | Self::Cache { latency, .. } => latency.as_ref(),
            Self::Queue { .. } => None,
        }
    }
}

/// Protocol used for a peer-service call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Protocol {
    /// HTTP request/response.
    #[default]
    Http,
    /// gRPC unary call.
    Grpc,
    /// Any other transport; emitted as a generic call span.
    Other(String),
}

impl From<String> for Protocol {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "http" | "https" => Self::Http,
            "grpc" => Self::Grpc,
            _ => Self::Other(value),
        }
    }
}

impl From<Protocol> for String {
    fn from(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Http => "http".to_string(),
            Protocol::Grpc => "grpc".to_string(),
            Protocol::Other(value) => value,
        }
    }
}

/// Latency characteristics for an operation or dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyProfile {
    /// Minimum added latency in milliseconds.
    pub min_ms: u64,
    /// Maximum added latency in milliseconds.
    pub max_ms: u64,
    /// Probability that the latency applies (0.0 - 1.0).
    #[serde(default = "default_probability")]
    pub probability: f64,
}

const fn default_probability() -> f64 {
    1.0
}

impl LatencyProfile {
    /// Creates a profile that always applies.
    #[must_use]
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms,
            max_ms,
            probability: 1.0,
        }
    }

    /// Sets the probability.
    #[must_use]
    pub const fn with_probability(mut self, probability: f64) -> Self {
        self.probability = probability;
        self
    }

    fn validate(&self, field: &str) -> Result<()> {
        if self.min_ms > self.max_ms {
            return Err(Error::invalid_value(
                field,
                format!("min_ms ({}) exceeds max_ms ({})", self.min_ms, self.max_ms),
            ));
        }
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(Error::invalid_value(
                field,
                format!("probability {} is outside 0.0..=1.0", self.probability),
            ));
        }
        Ok(())
    }
}

/// A named business operation within a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Friendly operation name.
    pub name: String,
    /// Span name override (e.g., `POST /payments`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_name: Option<String>,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Realistic statements for store spans issued by this operation.
    #[serde(default)]
    pub db_queries: Vec<String>,
    /// Extra processing latency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyProfile>,
    /// Business fields attached to the service span.
    #[serde(default)]
    pub business_data: Vec<BusinessDataField>,
}

impl Operation {
    /// Creates an operation with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            span_name: None,
            description: None,
            db_queries: Vec::new(),
            latency: None,
            business_data: Vec::new(),
        }
    }

    /// Sets the span name override.
    #[must_use]
    pub fn with_span_name(mut self, span_name: impl Into<String>) -> Self {
        self.span_name = Some(span_name.into());
        self
    }

    /// Sets the latency profile.
    #[must_use]
    pub const fn with_latency(mut self, latency: LatencyProfile) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Adds a business data field.
    #[must_use]
    pub fn with_field(mut self, field: BusinessDataField) -> Self {
        self.business_data.push(field);
        self
    }

    /// The name used for the span: the override when set, else the operation name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.span_name.as_deref().unwrap_or(&self.name)
    }
}

/// Value type of a business data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Pattern-driven string.
    String,
    /// Floating-point number.
    Number,
    /// Whole number.
    Integer,
    /// True or false.
    Boolean,
    /// One of a fixed set of values.
    Enum,
}

/// A business-relevant field added to operation spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessDataField {
    /// Attribute key.
    pub name: String,
    /// Value type.
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// String pattern with `{random}`, `{uuid}` or `{hex}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Lower bound for numeric fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    /// Upper bound for numeric fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    /// Candidates for enum fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BusinessDataField {
    /// Creates a field of the given kind with no generation rule.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            pattern: None,
            min_value: None,
            max_value: None,
            values: Vec::new(),
            description: None,
        }
    }

    /// Sets the string pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Sets the numeric range.
    #[must_use]
    pub const fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }

    /// Sets the enum candidates.
    #[must_use]
    pub fn with_values(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }
}

/// A data store or cache instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInstance {
    /// Store name referenced by dependencies.
    pub name: String,
    /// Store system (`postgres`, `redis`, `mongodb`, ...).
    #[serde(rename = "type")]
    pub system: String,
}

/// A message queue instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageQueue {
    /// Queue name referenced by dependencies.
    pub name: String,
    /// Messaging system (`kafka`, `rabbitmq`, ...).
    #[serde(rename = "type")]
    pub system: String,
}

impl ScenarioConfig {
    /// Creates a scenario from services with default telemetry settings.
    #[must_use]
    pub fn new(services: Vec<Service>) -> Self {
        Self {
            services,
            databases: Vec::new(),
            message_queues: Vec::new(),
            telemetry: TelemetryConfig::default(),
        }
    }

    /// Adds a data store.
    #[must_use]
    pub fn with_database(mut self, name: impl Into<String>, system: impl Into<String>) -> Self {
        self.databases.push(StoreInstance {
            name: name.into(),
            system: system.into(),
        });
        self
    }

    /// Adds a message queue.
    #[must_use]
    pub fn with_queue(mut self, name: impl Into<String>, system: impl Into<String>) -> Self {
        self.message_queues.push(MessageQueue {
            name: name.into(),
            system: system.into(),
        });
        self
    }

    /// Replaces the telemetry settings.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Parses and validates a YAML scenario.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or fails validation.
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a JSON scenario.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or fails validation.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Converts and validates an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not describe a valid scenario.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a scenario file, choosing the format from its extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, has an unknown
    /// extension, or does not describe a valid scenario.
    pub fn load(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let content = std::fs::read_to_string(path)?;
        debug!("Loading scenario from {} ({} bytes)", path.display(), content.len());

        match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&content),
            "json" => Self::from_json_str(&content),
            other => Err(Error::UnknownFormat(other.to_string())),
        }
    }

    /// Checks the semantic rules a deserialized scenario must satisfy.
    ///
    /// Dependencies on unknown components are allowed; they degrade to
    /// no-op branches during generation.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(Error::InvalidScenario(
                "at least one service is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(Error::InvalidScenario("service name must not be empty".to_string()));
            }
            if !seen.insert(service.name.as_str()) {
                return Err(Error::InvalidScenario(format!(
                    "duplicate service name: {}",
                    service.name
                )));
            }

            for (index, dependency) in service.depends_on.iter().enumerate() {
                if let Some(latency) = dependency.latency() {
                    latency.validate(&format!(
                        "services.{}.depends_on[{index}].latency",
                        service.name
                    ))?;
                }
            }

            for operation in &service.operations {
                let prefix = format!("services.{}.operations.{}", service.name, operation.name);
                if let Some(latency) = &operation.latency {
                    latency.validate(&format!("{prefix}.latency"))?;
                }
                for field in &operation.business_data {
                    if field.kind == FieldKind::Enum && field.values.is_empty() {
                        return Err(Error::invalid_value(
                            format!("{prefix}.business_data.{}", field.name),
                            "enum fields need at least one value",
                        ));
                    }
                }
            }
        }

        if !(0.0..=1.0).contains(&self.telemetry.error_rate) {
            return Err(Error::invalid_value(
                "telemetry.error_rate",
                format!("{} is outside 0.0..=1.0", self.telemetry.error_rate),
            ));
        }
        if self.telemetry.metrics_interval == 0 {
            return Err(Error::invalid_value(
                "telemetry.metrics_interval",
                "must be at least one second",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r"
services:
  - name: frontend
    language: typescript
    operations:
      - name: Checkout
        span_name: POST /checkout
        latency: { min_ms: 10, max_ms: 50, probability: 0.5 }
        business_data:
          - { name: cart_total, type: number, min_value: 5, max_value: 500 }
          - { name: tier, type: enum, values: [gold, silver] }
    depends_on:
      - service: api-gateway
        protocol: grpc
  - name: api-gateway
    depends_on:
      - service: billing
        via: orders
      - db: postgres-main
        example_queries: ['SELECT 1']
      - cache: redis-cache
      - queue: audit
  - name: billing
databases:
  - { name: postgres-main, type: postgres }
message_queues:
  - { name: orders, type: kafka }
";

    #[test]
    fn parses_all_dependency_variants() {
        let config = ScenarioConfig::from_yaml_str(SAMPLE).unwrap();

        assert_eq!(config.services.len(), 3);
        let gateway = &config.services[1];
        assert_eq!(gateway.language, "python");
        assert!(matches!(
            &gateway.depends_on[0],
            Dependency::Service { service, via: Some(queue), .. } if service == "billing" && queue == "orders"
        ));
        assert!(matches!(&gateway.depends_on[1], Dependency::Database { db, example_queries, .. }
            if db == "postgres-main" && example_queries.len() == 1));
        assert!(matches!(&gateway.depends_on[2], Dependency::Cache { cache, .. } if cache == "redis-cache"));
        assert!(matches!(&gateway.depends_on[3], Dependency::Queue { queue } if queue == "audit"));

        let frontend = &config.services[0];
        assert!(matches!(
            &frontend.depends_on[0],
            Dependency::Service { protocol: Protocol::Grpc, .. }
        ));
        assert_eq!(frontend.operations[0].display_name(), "POST /checkout");
        assert_eq!(frontend.operations[0].business_data[1].kind, FieldKind::Enum);
    }

    #[test]
    fn telemetry_defaults_apply_when_missing() {
        let config = ScenarioConfig::from_yaml_str("services: [{ name: solo }]").unwrap();
        assert_eq!(config.telemetry, TelemetryConfig::default());
        assert!(config.telemetry.include_logs);
    }

    #[test]
    fn unknown_protocol_is_preserved() {
        let protocol = Protocol::from("thrift".to_string());
        assert_eq!(protocol, Protocol::Other("thrift".to_string()));
        assert_eq!(String::from(protocol), "thrift");
    }

    #[test]
    fn rejects_empty_service_list() {
        let result = ScenarioConfig::from_yaml_str("services: []");
        assert!(matches!(result, Err(Error::InvalidScenario(_))));
    }

    #[test]
    fn rejects_duplicate_services() {
        let config = ScenarioConfig::new(vec![Service::new("a"), Service::new("a")]);
        assert!(matches!(config.validate(), Err(Error::InvalidScenario(_))));
    }

    #[test]
    fn rejects_out_of_range_error_rate() {
        let config = ScenarioConfig::new(vec![Service::new("a")])
            .with_telemetry(TelemetryConfig::default().with_error_rate(1.5));
        assert!(matches!(config.validate(), Err(Error::InvalidValue { .. })));
    }

    #[test]
    fn rejects_inverted_latency_range() {
        let op = Operation::new("slow").with_latency(LatencyProfile::new(50, 10));
        let config = ScenarioConfig::new(vec![Service::new("a").with_operation(op)]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_ms"));
    }

    #[test]
    fn rejects_enum_without_values() {
        let op = Operation::new("pick").with_field(BusinessDataField::new("tier", FieldKind::Enum));
        let config = ScenarioConfig::new(vec![Service::new("a").with_operation(op)]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_dependency_targets_are_allowed() {
        let config = ScenarioConfig::new(vec![
            Service::new("a").with_dependency(Dependency::service("ghost"))
        ]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_and_yaml_agree() {
        let yaml = ScenarioConfig::from_yaml_str(SAMPLE).unwrap();
        let json = serde_json::to_string(&yaml).unwrap();
        let reparsed = ScenarioConfig::from_json_str(&json).unwrap();
        assert_eq!(yaml, reparsed);
    }
}
