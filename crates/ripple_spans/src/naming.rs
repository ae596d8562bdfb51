//! Span naming and attribute inference for client, store and entry spans.

use ripple_model::{Attributes, AttributeValue, StoreInstance};

/// HTTP methods recognised at the start of a span name.
const HTTP_METHODS: [&str; 7] = ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

/// Query dialect family of a data store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFamily {
    /// Relational stores speaking SQL.
    Sql,
    /// Key-value stores.
    KeyValue,
    /// Document stores.
    Document,
    /// Declared store of an unrecognised system.
    Unknown,
}

impl StoreFamily {
    /// Maps a store system label to its family.
    #[must_use]
    pub fn of(system: &str) -> Self {
        match system.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "mysql" | "mariadb" | "mssql" => Self::Sql,
            "redis" | "memcached" | "valkey" => Self::KeyValue,
            "mongodb" | "mongo" => Self::Document,
            _ => Self::Unknown,
        }
    }

    const fn operation(self) -> Option<&'static str> {
        match self {
            Self::Sql => Some("SELECT"),
            Self::KeyValue => Some("GET"),
            Self::Document => Some("find"),
            Self::Unknown => None,
        }
    }

    const fn verb(self) -> Option<&'static str> {
        match self {
            Self::Sql => Some("SELECT"),
            Self::KeyValue => Some("GET"),
            Self::Document => Some("FIND"),
            Self::Unknown => None,
        }
    }
}

/// Whether a store dependency was declared as a database or a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreRole {
    /// `db` dependency.
    Database,
    /// `cache` dependency.
    Cache,
}

/// Table name synthesized from the calling service (`user-service` → `users`).
#[must_use]
pub fn table_name(service: &str) -> String {
    format!("{}s", service.replace("-service", "").to_lowercase())
}

/// Name and attributes of a store query span.
///
/// `query` is the configured statement, if any; `session_key` fills the
/// synthesized key-value statement.
#[must_use]
pub fn store_span(
    store: &str,
    role: StoreRole,
    instance: Option<&StoreInstance>,
    caller: &str,
    query: Option<&str>,
    session_key: &str,
) -> (String, Attributes) {
    let mut attrs = Attributes::new();
    let fallback_name = match role {
        StoreRole::Database => format!("QUERY {store}"),
        StoreRole::Cache => format!("GET {store}"),
    };

    let Some(instance) = instance else {
        if let Some(query) = query {
            attrs.insert("db.statement".into(), query.into());
        }
        return (fallback_name, attrs);
    };

    attrs.insert("db.system".into(), instance.system.as_str().into());
    attrs.insert("db.name".into(), instance.name.as_str().into());
    attrs.insert("net.peer.name".into(), store.into());

    let family = StoreFamily::of(&instance.system);
    let table = table_name(caller);
    let statement = query.map_or_else(
        || match family {
            StoreFamily::Sql => Some(format!("SELECT * FROM {table} WHERE id = ?")),
            StoreFamily::KeyValue => Some(format!("GET user_session:{session_key}")),
            StoreFamily::Document => {
                Some(format!("db.{table}.findOne({{ \"_id\": ObjectId(\"...\") }})"))
            }
            StoreFamily::Unknown => None,
        },
        |q| Some(q.to_string()),
    );

    if let Some(statement) = statement {
        attrs.insert("db.statement".into(), AttributeValue::String(statement));
    }
    if let Some(operation) = family.operation() {
        attrs.insert("db.operation".into(), operation.into());
    }

    let name = family
        .verb()
        .map_or(fallback_name, |verb| format!("{verb} {store}"));
    (name, attrs)
}

/// gRPC service name derived from a peer (`user-service` → `UserserviceService`).
#[must_use]
pub fn rpc_service(peer: &str) -> String {
    let mut chars = peer.chars();
    let capitalized: String = chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
    });
    format!("{}Service", capitalized.replace('-', ""))
}

/// HTTP method and route inferred from an entry span name.
///
/// `POST /payments` yields `("POST", "/payments")`; names without a leading
/// method default to `GET` with a route derived from the name.
#[must_use]
pub fn http_route(span_name: &str) -> (&'static str, String) {
    let mut parts = span_name.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or_default();
    let rest = parts.next().map(str::trim).unwrap_or_default();

    if let Some(method) = HTTP_METHODS
        .iter()
        .find(|m| m.eq_ignore_ascii_case(first))
    {
        let route = if rest.starts_with('/') {
            rest.to_string()
        } else if rest.is_empty() {
            "/".to_string()
        } else {
            format!("/{rest}")
        };
        return (*method, route);
    }

    if first.starts_with('/') {
        return ("GET", first.to_string());
    }

    let slug: String = span_name
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    ("GET", format!("/{slug}"))
}
