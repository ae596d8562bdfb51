//! Telemetry sinks.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

const EXPORT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_ERROR_BODY: usize = 512;

/// Kind of telemetry carried by a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Trace spans.
    Traces,
    /// Log records.
    Logs,
    /// Metric data points.
    Metrics,
}

impl Signal {
    /// Collector path for this signal.
    pub const fn path(self) -> &'static str {
        match self {
            Self::Traces => "v1/traces",
            Self::Logs => "v1/logs",
            Self::Metrics => "v1/metrics",
        }
    }

    /// Returns the string representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Traces => "traces",
            Self::Logs => "logs",
            Self::Metrics => "metrics",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for exported payloads.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Delivers one payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload could not be delivered.
    async fn export(&self, signal: Signal, payload: &Value) -> Result<()>;
}

fn default_auth_type() -> String {
    "ApiKey".to_string()
}

/// Where a job sends its telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkTarget {
    /// Collector base URL.
    pub endpoint: String,
    /// Credential sent in the `Authorization` header.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Scheme placed before the credential.
    #[serde(default = "default_auth_type")]
    pub auth_type: String,
}

impl SinkTarget {
    /// Creates an unauthenticated target.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            auth_type: default_auth_type(),
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the authorization scheme.
    #[must_use]
    pub fn with_auth_type(mut self, auth_type: impl Into<String>) -> Self {
        self.auth_type = auth_type.into();
        self
    }

    /// URL for `signal` under this endpoint.
    pub fn url(&self, signal: Signal) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), signal.path())
    }

    fn authorization(&self) -> Option<String> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .map(|key| format!("{} {key}", self.auth_type))
    }
}

/// OTLP/HTTP JSON exporter.
pub struct OtlpHttpSink {
    target: SinkTarget,
    http: reqwest::Client,
}

impl OtlpHttpSink {
    /// Creates an exporter for `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not an http(s) URL or the HTTP
    /// client cannot be built.
    pub fn new(target: &SinkTarget) -> Result<Self> {
        let endpoint = target.endpoint.trim();
        let has_host = endpoint
            .split_once("://")
            .is_some_and(|(scheme, rest)| matches!(scheme, "http" | "https") && !rest.is_empty());
        if !has_host {
            return Err(Error::InvalidEndpoint(target.endpoint.clone()));
        }

        let http = reqwest::Client::builder().timeout(EXPORT_TIMEOUT).build()?;

        Ok(Self {
            target: SinkTarget {
                endpoint: endpoint.to_string(),
                ..target.clone()
            },
            http,
        })
    }

    /// The target this sink posts to.
    pub const fn target(&self) -> &SinkTarget {
        &self.target
    }
}

#[async_trait]
impl TelemetrySink for OtlpHttpSink {
    async fn export(&self, signal: Signal, payload: &Value) -> Result<()> {
        let url = self.target.url(signal);
        let mut request = self.http.post(&url).json(payload);
        if let Some(auth) = self.target.authorization() {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!("Exported {} to {} with status {}", signal, url, status);

        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            warn!("Collector rejected {}: {}", signal, status);
            return Err(Error::Status {
                signal: signal.as_str(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Builds one sink per job target.
pub trait SinkFactory: Send + Sync {
    /// Creates the sink for `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the target is unusable.
    fn create(&self, target: &SinkTarget) -> Result<Arc<dyn TelemetrySink>>;
}

/// Factory producing [`OtlpHttpSink`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpSinkFactory;

impl SinkFactory for HttpSinkFactory {
    fn create(&self, target: &SinkTarget) -> Result<Arc<dyn TelemetrySink>> {
        Ok(Arc::new(OtlpHttpSink::new(target)?))
    }
}

#[derive(Debug, Default)]
struct Recorded {
    exports: Mutex<Vec<(Signal, Value)>>,
    failing: AtomicBool,
}

/// In-memory sink that records every export.
///
/// Clones share the same recording, so the sink can also serve as its own
/// [`SinkFactory`].
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Recorded>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent exports fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of recorded exports of `signal`.
    pub fn count(&self, signal: Signal) -> usize {
        self.lock().iter().filter(|(s, _)| *s == signal).count()
    }

    /// All recorded exports in order.
    pub fn exports(&self) -> Vec<(Signal, Value)> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Signal, Value)>> {
        self.inner
            .exports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TelemetrySink for MemorySink {
    async fn export(&self, signal: Signal, payload: &Value) -> Result<()> {
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(Error::Status {
                signal: signal.as_str(),
                status: 503,
                body: "memory sink failing".to_string(),
            });
        }
        self.lock().push((signal, payload.clone()));
        Ok(())
    }
}

impl SinkFactory for MemorySink {
    fn create(&self, _target: &SinkTarget) -> Result<Arc<dyn TelemetrySink>> {
        Ok(Arc::new(self.clone()))
    }
}
