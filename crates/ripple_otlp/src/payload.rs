//! OTLP/JSON trace and log payloads.

use crate::resource::ResourceCatalog;
use ripple_model::{AttributeValue, Attributes, Span};
use ripple_spans::GeneratedTrace;
use serde_json::{json, Value};

/// Instrumentation scope name on every payload.
pub const SCOPE_NAME: &str = "ripple";

const SEVERITY_INFO: i32 = 9;
const SEVERITY_ERROR: i32 = 17;

/// Encodes one attribute value as an OTLP `AnyValue`.
#[must_use]
pub fn encode_value(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::String(s) => json!({ "stringValue": s }),
        // OTLP/JSON carries 64-bit integers as strings.
        AttributeValue::Int(i) => json!({ "intValue": i.to_string() }),
        AttributeValue::Float(f) => json!({ "doubleValue": f }),
        AttributeValue::Bool(b) => json!({ "boolValue": b }),
        AttributeValue::StringArray(values) => json!({
            "arrayValue": {
                "values": values.iter().map(|v| json!({ "stringValue": v })).collect::<Vec<_>>()
            }
        }),
    }
}

/// Encodes an attribute map as an OTLP `KeyValue` list.
#[must_use]
pub fn encode_attributes(attributes: &Attributes) -> Value {
    Value::Array(
        attributes
            .iter()
            .map(|(key, value)| json!({ "key": key, "value": encode_value(value) }))
            .collect(),
    )
}

fn resource(catalog: &ResourceCatalog, service: &str) -> Value {
    json!({ "attributes": encode_attributes(&catalog.attributes(service)) })
}

fn encode_span(span: &Span) -> Value {
    json!({
        "traceId": span.trace_id,
        "spanId": span.span_id,
        "parentSpanId": span.parent_span_id.as_deref().unwrap_or_default(),
        "name": span.name,
        "kind": span.kind.to_otlp(),
        "startTimeUnixNano": span.start_time_ns.to_string(),
        "endTimeUnixNano": span.end_time_ns.to_string(),
        "attributes": encode_attributes(&span.attributes),
        "status": { "code": span.status.code.to_otlp() },
    })
}

/// Builds an OTLP `TracesData` payload with one resource per service.
#[must_use]
pub fn trace_payload(trace: &GeneratedTrace, catalog: &ResourceCatalog) -> Value {
    let resource_spans: Vec<Value> = trace
        .spans_by_service
        .iter()
        .filter(|(_, spans)| !spans.is_empty())
        .map(|(service, spans)| {
            json!({
                "resource": resource(catalog, service),
                "scopeSpans": [{
                    "scope": { "name": SCOPE_NAME },
                    "spans": spans.iter().map(encode_span).collect::<Vec<_>>(),
                }],
            })
        })
        .collect();

    json!({ "resourceSpans": resource_spans })
}

fn log_records(span: &Span) -> Vec<Value> {
    let time = span.end_time_ns.to_string();
    let mut records = vec![json!({
        "timeUnixNano": time,
        "severityText": "INFO",
        "severityNumber": SEVERITY_INFO,
        "body": { "stringValue": format!("Operation '{}' handled.", span.name) },
        "traceId": span.trace_id,
        "spanId": span.span_id,
    })];

    if span.is_error() {
        let mut attrs = Attributes::new();
        attrs.insert("exception.type".into(), "RuntimeException".into());
        attrs.insert("exception.message".into(), "An artificial error occurred".into());
        records.push(json!({
            "timeUnixNano": time,
            "severityText": "ERROR",
            "severityNumber": SEVERITY_ERROR,
            "body": { "stringValue": format!("Operation '{}' failed unexpectedly.", span.name) },
            "traceId": span.trace_id,
            "spanId": span.span_id,
            "attributes": encode_attributes(&attrs),
        }));
    }
    records
}

/// Builds an OTLP `LogsData` payload: one INFO record per span plus an ERROR
/// record for each errored span.
#[must_use]
pub fn log_payload(trace: &GeneratedTrace, catalog: &ResourceCatalog) -> Value {
    let resource_logs: Vec<Value> = trace
        .spans_by_service
        .iter()
        .filter(|(_, spans)| !spans.is_empty())
        .map(|(service, spans)| {
            json!({
                "resource": resource(catalog, service),
                "scopeLogs": [{
                    "scope": { "name": SCOPE_NAME },
                    "logRecords": spans.iter().flat_map(log_records).collect::<Vec<_>>(),
                }],
            })
        })
        .collect();

    json!({ "resourceLogs": resource_logs })
}
