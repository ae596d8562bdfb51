//! Dependency graph over the services of a scenario.

use crate::scenario::{Dependency, MessageQueue, ScenarioConfig, Service, StoreInstance};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// A dependency that names a component the scenario does not declare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedDependency {
    /// Service declaring the dependency.
    pub service: String,
    /// Missing component name.
    pub target: String,
    /// Dependency kind label (`service`, `db`, `cache`, `queue`, `via`).
    pub kind: &'static str,
}

/// Immutable view of a scenario's services and their dependencies.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    config: ScenarioConfig,
    services: HashMap<String, usize>,
    stores: HashMap<String, usize>,
    queues: HashMap<String, usize>,
    entry_points: Vec<String>,
}

impl DependencyGraph {
    /// Builds the graph from a scenario.
    ///
    /// Dependencies on undeclared components are kept and logged; they are
    /// skipped during generation.
    #[must_use]
    pub fn new(config: ScenarioConfig) -> Self {
        let services = index_by_name(config.services.iter().map(|s| s.name.as_str()));
        let stores = index_by_name(config.databases.iter().map(|s| s.name.as_str()));
        let queues = index_by_name(config.message_queues.iter().map(|q| q.name.as_str()));

        let called: HashSet<&str> = config
            .services
            .iter()
            .flat_map(|s| s.depends_on.iter())
            .filter_map(Dependency::peer_service)
            .collect();

        let mut entry_points: Vec<String> = config
            .services
            .iter()
            .filter(|s| !called.contains(s.name.as_str()))
            .map(|s| s.name.clone())
            .collect();

        // Fully cyclic graph: any service may start a trace.
        if entry_points.is_empty() {
            entry_points = config.services.iter().map(|s| s.name.clone()).collect();
        }

        let graph = Self {
            config,
            services,
            stores,
            queues,
            entry_points,
        };

        for missing in graph.unresolved_dependencies() {
            warn!(
                "Service '{}' depends on unknown {} '{}'; branch will be skipped",
                missing.service, missing.kind, missing.target
            );
        }

        graph
    }

    /// The scenario this graph was built from.
    #[must_use]
    pub const fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Looks up a service by name.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name).map(|&i| &self.config.services[i])
    }

    /// All services in declaration order.
    #[must_use]
    pub fn services(&self) -> &[Service] {
        &self.config.services
    }

    /// Looks up a data store or cache by name.
    #[must_use]
    pub fn database(&self, name: &str) -> Option<&StoreInstance> {
        self.stores.get(name).map(|&i| &self.config.databases[i])
    }

    /// Looks up a message queue by name.
    #[must_use]
    pub fn queue(&self, name: &str) -> Option<&MessageQueue> {
        self.queues.get(name).map(|&i| &self.config.message_queues[i])
    }

    /// Services that no other service calls, or every service when the graph
    /// is fully cyclic.
    #[must_use]
    pub fn entry_points(&self) -> &[String] {
        &self.entry_points
    }

    /// Lists dependencies whose target is not declared in the scenario.
    ///
    /// Stores and caches are only checked when the scenario declares
    /// `databases` at all; queues likewise with `message_queues`.
    #[must_use]
    pub fn unresolved_dependencies(&self) -> Vec<UnresolvedDependency> {
        let mut missing = Vec::new();
        let check_stores = !self.stores.is_empty();
        let check_queues = !self.queues.is_empty();

        for service in &self.config.services {
            let mut push = |target: &str, kind: &'static str| {
                missing.push(UnresolvedDependency {
                    service: service.name.clone(),
                    target: target.to_string(),
                    kind,
                });
            };

            for dependency in &service.depends_on {
                match dependency {
                    Dependency::Service { service: peer, via, .. } => {
                        if !self.services.contains_key(peer) {
                            push(peer, "service");
                        }
                        if let Some(queue) = via {
                            if check_queues && !self.queues.contains_key(queue) {
                                push(queue, "via");
                            }
                        }
                    }
                    Dependency::Database { db, .. } => {
                        if check_stores && !self.stores.contains_key(db) {
                            push(db, "db");
                        }
                    }
                    Dependency::Cache { cache, .. } => {
                        if check_stores && !self.stores.contains_key(cache) {
                            push(cache, "cache");
                        }
                    }
                    Dependency::Queue { queue } => {
                        if check_queues && !self.queues.contains_key(queue) {
                            push(queue, "queue");
                        }
                    }
                }
            }
        }

        missing
    }
}

fn index_by_name<'a>(names: impl Iterator<Item = &'a str>) -> HashMap<String, usize> {
    let mut index = HashMap::new();
    for (i, name) in names.enumerate() {
        index.entry(name.to_string()).or_insert(i);
    }
    index
}
