//! Thread-safe incident registry.

use crate::error::Result;
use crate::incident::{CascadeStage, Effect, Incident, IncidentRequest, IncidentStatus};
use chrono::{DateTime, Utc};
use ripple_model::Attributes;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Registry {
    incidents: HashMap<String, Incident>,
    /// component -> incident ids, in registration order.
    by_component: HashMap<String, Vec<String>>,
}

impl Registry {
    fn index(&mut self, component: &str, incident_id: &str) {
        let ids = self.by_component.entry(component.to_string()).or_default();
        if !ids.iter().any(|id| id == incident_id) {
            ids.push(incident_id.to_string());
        }
    }

    fn unindex(&mut self, incident: &Incident) {
        for component in &incident.affected_components {
            if let Some(ids) = self.by_component.get_mut(component) {
                ids.retain(|id| id != &incident.id);
                if ids.is_empty() {
                    self.by_component.remove(component);
                }
            }
        }
    }

    fn live_for(&self, component: &str) -> impl Iterator<Item = &Incident> {
        self.by_component
            .get(component)
            .into_iter()
            .flatten()
            .filter_map(|id| self.incidents.get(id))
            .filter(|incident| incident.status.is_live())
    }

    fn remove(&mut self, incident_id: &str) -> Option<Incident> {
        let incident = self.incidents.remove(incident_id)?;
        self.unindex(&incident);
        Some(incident)
    }

    fn next_id(&self, now: DateTime<Utc>) -> String {
        loop {
            let suffix = Uuid::new_v4().simple().to_string()[..6].to_ascii_uppercase();
            let id = format!("INC-{}-{suffix}", now.format("%Y%m%d"));
            if !self.incidents.contains_key(&id) {
                return id;
            }
        }
    }
}

/// Registry of active incidents shared by every telemetry producer.
///
/// All operations lock a single mutex, so concurrent readers always observe
/// the latest mutation.
#[derive(Debug, Default)]
pub struct CorrelationEngine {
    registry: Mutex<Registry>,
}

impl CorrelationEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Registers a new incident and marks its root-cause component affected.
    ///
    /// # Errors
    ///
    /// Returns an error if the request names no root-cause component or has
    /// a stage without a component.
    pub fn start_incident(&self, request: IncidentRequest) -> Result<String> {
        request.validate()?;
        let now = Utc::now();

        let mut registry = self.lock();
        let id = registry.next_id(now);
        let status = if request.stages.len() > 1 {
            IncidentStatus::Cascading
        } else {
            IncidentStatus::Active
        };

        let incident = Incident {
            id: id.clone(),
            job_id: request.job_id,
            root_cause_type: request.root_cause_type,
            root_cause_component: request.root_cause_component.clone(),
            stages: request.stages,
            current_stage: 0,
            severity: request.severity,
            status,
            affected_components: vec![request.root_cause_component.clone()],
            description: request.description,
            created_at: now,
        };

        info!(
            "Started incident {id} for job {}: {}/{} ({} stages)",
            incident.job_id,
            incident.root_cause_type.as_str(),
            incident.root_cause_component,
            incident.stages.len()
        );
        debug!("Cascade path: {}", incident.cascade_path().join(" -> "));

        registry.index(&request.root_cause_component, &id);
        registry.incidents.insert(id.clone(), incident);
        Ok(id)
    }

    /// Correlation attributes of the first live incident covering `component`,
    /// or an empty map.
    #[must_use]
    pub fn attributes_for(&self, component: &str) -> Attributes {
        self.lock()
            .live_for(component)
            .next()
            .map(Incident::correlation_attributes)
            .unwrap_or_default()
    }

    /// The stage effect configured for `component` in the first live incident
    /// covering it that has one.
    #[must_use]
    pub fn effect_for(&self, component: &str) -> Option<Effect> {
        self.lock().live_for(component).find_map(|incident| {
            incident
                .stages
                .iter()
                .find(|stage| stage.component == component)
                .map(|stage| Effect {
                    effect: stage.effect.clone(),
                    parameters: stage.parameters.clone(),
                    incident_id: incident.id.clone(),
                })
        })
    }

    /// Returns true if any live incident covers `component`.
    #[must_use]
    pub fn is_affected(&self, component: &str) -> bool {
        self.lock().live_for(component).next().is_some()
    }

    /// Activates the next cascade stage.
    ///
    /// Returns the activated stage, or `None` when the incident is unknown,
    /// no longer live, or has no stages left. Exhausting the stages demotes a
    /// cascading incident to active.
    pub fn advance_cascade(&self, incident_id: &str) -> Option<CascadeStage> {
        let mut registry = self.lock();
        let incident = registry.incidents.get_mut(incident_id)?;
        if !incident.status.is_live() {
            return None;
        }

        let Some(stage) = incident.stages.get(incident.current_stage).cloned() else {
            incident.status = IncidentStatus::Active;
            return None;
        };

        if !incident.affects(&stage.component) {
            incident.affected_components.push(stage.component.clone());
        }
        incident.current_stage += 1;

        info!(
            "Incident {incident_id} cascade stage {}: {} ({})",
            incident.current_stage, stage.component, stage.effect
        );

        registry.index(&stage.component, incident_id);
        Some(stage)
    }

    /// Moves a live incident to recovering. Producers stop seeing it.
    pub fn begin_recovery(&self, incident_id: &str) -> bool {
        let mut registry = self.lock();
        match registry.incidents.get_mut(incident_id) {
            Some(incident) if incident.status.is_live() => {
                incident.status = IncidentStatus::Recovering;
                info!("Incident {incident_id} recovering");
                true
            }
            _ => false,
        }
    }

    /// Resolves an incident and drops its index entries; the record is kept.
    pub fn stop_incident(&self, incident_id: &str) -> bool {
        let mut registry = self.lock();
        let Some(incident) = registry.incidents.get_mut(incident_id) else {
            return false;
        };
        incident.status = IncidentStatus::Resolved;
        let snapshot = incident.clone();
        registry.unindex(&snapshot);

        info!("Incident {incident_id} resolved");
        true
    }

    /// Deletes an incident and its index entries.
    pub fn remove_incident(&self, incident_id: &str) -> bool {
        self.lock().remove(incident_id).is_some()
    }

    /// Deletes every incident of a job. Returns how many were removed.
    pub fn remove_for_job(&self, job_id: &str) -> usize {
        let mut registry = self.lock();
        let ids: Vec<String> = registry
            .incidents
            .values()
            .filter(|incident| incident.job_id == job_id)
            .map(|incident| incident.id.clone())
            .collect();
        for id in &ids {
            registry.remove(id);
        }
        if !ids.is_empty() {
            debug!("Removed {} incidents of job {job_id}", ids.len());
        }
        ids.len()
    }

    /// Snapshot of one incident in any state.
    #[must_use]
    pub fn incident(&self, incident_id: &str) -> Option<Incident> {
        self.lock().incidents.get(incident_id).cloned()
    }

    /// Snapshot of live incidents, oldest first, optionally for one job.
    #[must_use]
    pub fn list_active(&self, job_id: Option<&str>) -> Vec<Incident> {
        let registry = self.lock();
        let mut incidents: Vec<Incident> = registry
            .incidents
            .values()
            .filter(|incident| incident.status.is_live())
            .filter(|incident| job_id.map_or(true, |job| incident.job_id == job))
            .cloned()
            .collect();
        incidents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        incidents
    }

    /// Removes resolved incidents older than `max_resolved_age` and
    /// force-removes unresolved ones older than `max_active_age`.
    pub fn sweep_stale(&self, max_resolved_age: Duration, max_active_age: Duration) -> usize {
        self.sweep_stale_at(Utc::now(), max_resolved_age, max_active_age)
    }

    /// [`Self::sweep_stale`] against an explicit clock reading.
    pub fn sweep_stale_at(
        &self,
        now: DateTime<Utc>,
        max_resolved_age: Duration,
        max_active_age: Duration,
    ) -> usize {
        let mut registry = self.lock();
        let stale: Vec<String> = registry
            .incidents
            .values()
            .filter(|incident| {
                let age = (now - incident.created_at).to_std().unwrap_or_default();
                match incident.status {
                    IncidentStatus::Resolved => age > max_resolved_age,
                    IncidentStatus::Active
                    | IncidentStatus::Cascading
                    | IncidentStatus::Recovering => {
                        if age > max_active_age {
                            warn!(
                                "Removing stale incident {} (age {}s, status {})",
                                incident.id,
                                age.as_secs(),
                                incident.status.as_str()
                            );
                            true
                        } else {
                            false
                        }
                    }
                }
            })
            .map(|incident| incident.id.clone())
            .collect();

        for id in &stale {
            registry.remove(id);
        }
        if !stale.is_empty() {
            info!("Swept {} stale incidents", stale.len());
        }
        stale.len()
    }

    /// Number of registered incidents in any state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().incidents.len()
    }

    /// Returns true if no incidents are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().incidents.is_empty()
    }

    #[cfg(test)]
    fn indexed(&self, component: &str) -> Vec<String> {
        self.lock()
            .by_component
            .get(component)
            .cloned()
            .unwrap_or_default()
    }
}
