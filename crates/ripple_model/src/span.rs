//! Span data model.
//!
//! Spans are the trace-scoped records produced by the span-tree generator.
//! Timestamps are nanoseconds since the Unix epoch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// The kind of span (client, server, internal, etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// Unspecified span kind.
    #[default]
    Unspecified,
    /// An internal operation within an application.
    Internal,
    /// Handling a synchronous request from a client.
    Server,
    /// Making a synchronous request to a server.
    Client,
    /// Initiating an asynchronous request.
    Producer,
    /// Handling an asynchronous request.
    Consumer,
}

impl SpanKind {
    /// Returns the OTLP integer for this kind.
    #[must_use]
    pub const fn to_otlp(self) -> i32 {
        match self {
            Self::Unspecified => 0,
            Self::Internal => 1,
            Self::Server => 2,
            Self::Client => 3,
            Self::Producer => 4,
            Self::Consumer => 5,
        }
    }

    /// Lower-case label used when synthesizing span names.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Internal => "internal",
            Self::Server => "server",
            Self::Client => "client",
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }
}

/// Status code indicating span success or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    /// Status not set.
    #[default]
    Unset,
    /// The operation completed successfully.
    Ok,
    /// The operation resulted in an error.
    Error,
}

impl StatusCode {
    /// Returns the OTLP integer for this status code.
    #[must_use]
    pub const fn to_otlp(self) -> i32 {
        match self {
            Self::Unset => 0,
            Self::Ok => 1,
            Self::Error => 2,
        }
    }

    /// Returns true if this status represents an error.
    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }
}

/// Status of a span operation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpanStatus {
    /// The status code.
    pub code: StatusCode,
}

impl SpanStatus {
    /// Creates a new span status with the given code.
    #[must_use]
    pub const fn new(code: StatusCode) -> Self {
        Self { code }
    }

    /// Creates an error status.
    #[must_use]
    pub const fn error() -> Self {
        Self::new(StatusCode::Error)
    }

    /// Creates an OK status.
    #[must_use]
    pub const fn ok() -> Self {
        Self::new(StatusCode::Ok)
    }

    /// Returns true if this status represents an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.code.is_error()
    }
}

/// A value that can be stored as a span attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// A 64-bit integer value.
    Int(i64),
    /// A 64-bit floating-point value.
    Float(f64),
    /// A boolean value.
    Bool(bool),
    /// An array of string values.
    StringArray(Vec<String>),
}

impl AttributeValue {
    /// Returns the value as an i64 if it is an integer.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a string reference if it is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u32> for AttributeValue {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(values: Vec<String>) -> Self {
        Self::StringArray(values)
    }
}

/// Ordered attribute map; ordering keeps payloads stable across runs.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A span representing a unit of work within a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Trace identifier shared by every span of one trace.
    pub trace_id: String,
    /// Unique identifier for this span.
    pub span_id: String,
    /// Parent span ID, if this span has a parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    /// The operation name.
    pub name: String,
    /// The service that owns this span.
    pub service: String,
    /// Start time in nanoseconds since Unix epoch.
    pub start_time_ns: u64,
    /// End time in nanoseconds since Unix epoch.
    pub end_time_ns: u64,
    /// The kind of span.
    #[serde(default)]
    pub kind: SpanKind,
    /// The span status.
    #[serde(default)]
    pub status: SpanStatus,
    /// Span attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
}

impl Span {
    /// Creates a new span with the given IDs and name.
    #[must_use]
    pub fn new(
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            parent_span_id: None,
            name: name.into(),
            service: String::new(),
            start_time_ns: 0,
            end_time_ns: 0,
            kind: SpanKind::default(),
            status: SpanStatus::default(),
            attributes: Attributes::new(),
        }
    }

    /// Sets the parent span ID.
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_span_id = Some(parent_id.into());
        self
    }

    /// Sets the parent span ID when one is given.
    #[must_use]
    pub fn with_optional_parent(mut self, parent_id: Option<&str>) -> Self {
        self.parent_span_id = parent_id.map(str::to_string);
        self
    }

    /// Sets the owning service name.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Sets start and end time; `end` is clamped so it never precedes `start`.
    #[must_use]
    pub fn with_timing(mut self, start_time_ns: u64, end_time_ns: u64) -> Self {
        self.start_time_ns = start_time_ns;
        self.end_time_ns = end_time_ns.max(start_time_ns);
        self
    }

    /// Sets the span kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the span status.
    #[must_use]
    pub fn with_status(mut self, status: SpanStatus) -> Self {
        self.status = status;
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Adds or replaces an attribute in place.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Returns the span duration.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        Duration::from_nanos(self.end_time_ns.saturating_sub(self.start_time_ns))
    }

    /// Returns true if this is a root span (no parent).
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    /// Returns true if this span represents an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status.is_error()
    }

    /// Gets an attribute value by key.
    #[must_use]
    pub fn get_attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Gets the HTTP status code from attributes if present.
    #[must_use]
    pub fn http_status_code(&self) -> Option<u16> {
        self.attributes
            .get("http.response.status_code")
            .and_then(AttributeValue::as_i64)
            .and_then(|code| u16::try_from(code).ok())
    }
}
