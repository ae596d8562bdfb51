//! Incident and cascade stage types.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use ripple_model::{AttributeValue, Attributes};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Where an incident originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootCauseType {
    /// Network, host, or storage failure.
    Infrastructure,
    /// Fault inside a service.
    Application,
}

impl RootCauseType {
    /// Lower-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Infrastructure => "infrastructure",
            Self::Application => "application",
        }
    }
}

impl FromStr for RootCauseType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "infrastructure" | "infra" => Ok(Self::Infrastructure),
            "application" | "app" => Ok(Self::Application),
            _ => Err(Error::UnknownRootCause(s.to_string())),
        }
    }
}

/// Incident severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Minor degradation.
    Low,
    /// Noticeable degradation.
    #[default]
    Medium,
    /// Major outage of a feature.
    High,
    /// System-wide outage.
    Critical,
}

impl Severity {
    /// Lower-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(Error::UnknownSeverity(s.to_string())),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    /// All configured stages are active.
    Active,
    /// Stages are still being activated.
    Cascading,
    /// Winding down; no longer reported to producers.
    Recovering,
    /// Stopped. Kept until the stale sweep removes it.
    Resolved,
}

impl IncidentStatus {
    /// Lower-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cascading => "cascading",
            Self::Recovering => "recovering",
            Self::Resolved => "resolved",
        }
    }

    /// Returns true while producers should apply the incident.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Active | Self::Cascading)
    }
}

/// One step of a cascading outage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeStage {
    /// Component affected by this stage.
    pub component: String,
    /// Effect label (`port_down`, `timeout`, `error_rate`, ...).
    pub effect: String,
    /// Delay before this stage activates, relative to the previous one.
    #[serde(default)]
    pub delay_ms: u64,
    /// Effect parameters (`rate`, `multiplier`, `timeout_ms`, ...).
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl CascadeStage {
    /// Creates a stage with no delay and no parameters.
    #[must_use]
    pub fn new(component: impl Into<String>, effect: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            effect: effect.into(),
            delay_ms: 0,
            parameters: BTreeMap::new(),
        }
    }

    /// Sets the activation delay.
    #[must_use]
    pub const fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Adds an effect parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// Behaviour family of a stage effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    /// The component fails requests.
    Error,
    /// The component slows down.
    Latency,
    /// The component stops answering in time.
    Timeout,
    /// Unknown to span producers; only correlation attributes apply.
    Other,
}

impl EffectKind {
    /// Classifies an effect label.
    #[must_use]
    pub fn classify(effect: &str) -> Self {
        match effect {
            "error_rate" | "errors" | "port_down" | "unavailable" | "crash" => Self::Error,
            "latency" | "latency_spike" | "slow" | "database_slow" | "high_latency" => Self::Latency,
            "timeout" | "connection_timeout" | "query_timeout" => Self::Timeout,
            _ => Self::Other,
        }
    }
}

/// The stage effect configured for a component, as seen by a producer.
#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    /// Effect label.
    pub effect: String,
    /// Effect parameters.
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Incident the effect belongs to.
    pub incident_id: String,
}

impl Effect {
    /// Behaviour family of this effect.
    #[must_use]
    pub fn kind(&self) -> EffectKind {
        EffectKind::classify(&self.effect)
    }

    /// Reads a numeric parameter.
    #[must_use]
    pub fn number(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).and_then(serde_json::Value::as_f64)
    }

    /// Reads a numeric parameter, falling back to `default`.
    #[must_use]
    pub fn number_or(&self, key: &str, default: f64) -> f64 {
        self.number(key).unwrap_or(default)
    }
}

/// Parameters for [`crate::CorrelationEngine::start_incident`].
#[derive(Debug, Clone)]
pub struct IncidentRequest {
    /// Job the incident belongs to.
    pub job_id: String,
    /// Origin of the incident.
    pub root_cause_type: RootCauseType,
    /// Component that fails first.
    pub root_cause_component: String,
    /// Ordered cascade stages.
    pub stages: Vec<CascadeStage>,
    /// Severity.
    pub severity: Severity,
    /// Human-readable description.
    pub description: String,
}

impl IncidentRequest {
    /// Creates a request with no cascade stages.
    #[must_use]
    pub fn new(
        job_id: impl Into<String>,
        root_cause_type: RootCauseType,
        root_cause_component: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            root_cause_type,
            root_cause_component: root_cause_component.into(),
            stages: Vec::new(),
            severity: Severity::default(),
            description: String::new(),
        }
    }

    /// Sets the cascade stages.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<CascadeStage>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the severity.
    #[must_use]
    pub const fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.root_cause_component.trim().is_empty() {
            return Err(Error::InvalidIncident(
                "root cause component must not be empty".to_string(),
            ));
        }
        if let Some(index) = self.stages.iter().position(|s| s.component.trim().is_empty()) {
            return Err(Error::InvalidIncident(format!(
                "cascade stage {index} has no component"
            )));
        }
        Ok(())
    }
}

/// A registered incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// `INC-YYYYMMDD-XXXXXX`.
    pub id: String,
    /// Owning job.
    pub job_id: String,
    /// Origin of the incident.
    pub root_cause_type: RootCauseType,
    /// Component that failed first.
    pub root_cause_component: String,
    /// Ordered cascade stages.
    pub stages: Vec<CascadeStage>,
    /// Number of stages activated so far.
    pub current_stage: usize,
    /// Severity.
    pub severity: Severity,
    /// Lifecycle state.
    pub status: IncidentStatus,
    /// Components affected so far, in activation order.
    pub affected_components: Vec<String>,
    /// Human-readable description.
    pub description: String,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl Incident {
    /// Components named by the cascade stages, in order.
    #[must_use]
    pub fn cascade_path(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.component.as_str()).collect()
    }

    /// Returns true if `component` is in the affected set.
    #[must_use]
    pub fn affects(&self, component: &str) -> bool {
        self.affected_components.iter().any(|c| c == component)
    }

    /// Correlation attributes injected into telemetry of affected components.
    #[must_use]
    pub fn correlation_attributes(&self) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("incident.id".into(), AttributeValue::from(self.id.as_str()));
        attrs.insert(
            "incident.root_cause.type".into(),
            AttributeValue::from(self.root_cause_type.as_str()),
        );
        attrs.insert(
            "incident.root_cause.component".into(),
            AttributeValue::from(self.root_cause_component.as_str()),
        );
        attrs.insert("incident.severity".into(), AttributeValue::from(self.severity.as_str()));
        attrs.insert(
            "incident.cascade_stage".into(),
            AttributeValue::Int(i64::try_from(self.current_stage).unwrap_or(i64::MAX)),
        );
        attrs.insert("incident.status".into(), AttributeValue::from(self.status.as_str()));
        attrs.insert(
            "incident.affected_components".into(),
            AttributeValue::from(self.affected_components.join(",")),
        );
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_effect_families() {
        assert_eq!(EffectKind::classify("port_down"), EffectKind::Error);
        assert_eq!(EffectKind::classify("error_rate"), EffectKind::Error);
        assert_eq!(EffectKind::classify("database_slow"), EffectKind::Latency);
        assert_eq!(EffectKind::classify("query_timeout"), EffectKind::Timeout);
        assert_eq!(EffectKind::classify("cpu_spike"), EffectKind::Other);
    }

    #[test]
    fn effect_parameters_fall_back_to_default() {
        let stage = CascadeStage::new("db", "latency").with_parameter("multiplier", 5.0);
        let effect = Effect {
            effect: stage.effect,
            parameters: stage.parameters,
            incident_id: "INC-1".into(),
        };
        assert!((effect.number_or("multiplier", 3.0) - 5.0).abs() < f64::EPSILON);
        assert!((effect.number_or("rate", 1.0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_labels() {
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!(
            "infrastructure".parse::<RootCauseType>().unwrap(),
            RootCauseType::Infrastructure
        );
        assert!("catastrophic".parse::<Severity>().is_err());
    }

    #[test]
    fn stage_deserializes_with_defaults() {
        let stage: CascadeStage =
            serde_json::from_str(r#"{"component": "switch-1", "effect": "port_down"}"#).unwrap();
        assert_eq!(stage.delay_ms, 0);
        assert!(stage.parameters.is_empty());
    }

    #[test]
    fn rejects_request_without_component() {
        let request = IncidentRequest::new("job", RootCauseType::Application, " ");
        assert!(request.validate().is_err());
    }
}
