//! Timed cascade progression.

use crate::error::Result;
use ripple_correlation::{CorrelationEngine, IncidentRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Starts incidents and advances their cascades on each stage's delay.
#[derive(Debug, Clone)]
pub struct CascadeDriver {
    engine: Arc<CorrelationEngine>,
    token: CancellationToken,
}

/// A running cascade.
#[derive(Debug)]
pub struct CascadeHandle {
    engine: Arc<CorrelationEngine>,
    incident_id: String,
    token: CancellationToken,
    task: JoinHandle<usize>,
}

impl CascadeHandle {
    /// Id of the driven incident.
    pub fn incident_id(&self) -> &str {
        &self.incident_id
    }

    /// Stops advancing; stages already activated stay active.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Stops advancing and moves the incident to recovering, so producers
    /// stop applying it. Returns false if the incident was no longer live.
    pub fn recover(&self) -> bool {
        self.token.cancel();
        self.engine.begin_recovery(&self.incident_id)
    }

    /// Waits for the cascade to finish and returns the stages activated.
    pub async fn join(self) -> usize {
        self.task.await.unwrap_or_default()
    }
}

impl CascadeDriver {
    /// Creates a driver whose cascades stop when `token` is cancelled.
    pub const fn new(engine: Arc<CorrelationEngine>, token: CancellationToken) -> Self {
        Self { engine, token }
    }

    /// Starts the incident and spawns the task that walks its stages.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the request.
    pub fn start(&self, request: IncidentRequest) -> Result<CascadeHandle> {
        let delays: Vec<Duration> = request
            .stages
            .iter()
            .map(|stage| Duration::from_millis(stage.delay_ms))
            .collect();
        let incident_id = self.engine.start_incident(request)?;
        let token = self.token.child_token();

        let task = tokio::spawn(advance(
            Arc::clone(&self.engine),
            incident_id.clone(),
            delays,
            token.clone(),
        ));

        Ok(CascadeHandle {
            engine: Arc::clone(&self.engine),
            incident_id,
            token,
            task,
        })
    }
}

async fn advance(
    engine: Arc<CorrelationEngine>,
    incident_id: String,
    delays: Vec<Duration>,
    token: CancellationToken,
) -> usize {
    let mut activated = 0;
    for delay in delays {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!("Cascade for {incident_id} cancelled after {activated} stages");
                return activated;
            }
            () = tokio::time::sleep(delay) => {}
        }

        if engine.advance_cascade(&incident_id).is_none() {
            debug!("Cascade for {incident_id} ended early");
            return activated;
        }
        activated += 1;
    }

    // Demotes a cascading incident to active once every stage is live.
    engine.advance_cascade(&incident_id);
    info!("Cascade for {incident_id} complete ({activated} stages)");
    activated
}
