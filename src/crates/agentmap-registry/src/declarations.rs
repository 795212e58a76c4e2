//! Service declaration registry
//!
//! The canonical list of known services: their class path, the services they
//! depend on, and the capability protocols they implement. Declarations are
//! metadata only; nothing is instantiated here. Cross-references stay by
//! name and are resolved to providers at injection time.
//!
//! The registry answers three questions for the bundle pipeline:
//! which names are real services, what is the transitive dependency closure
//! of a service set, and in what order must those services load. Load order
//! uses iterative Kahn's algorithm with lexicographic tie-breaking so equal
//! inputs always produce equal bundles; a cycle fails with the participating
//! services listed.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use crate::error::{RegistryError, Result};

/// Metadata about one service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDeclaration {
    pub service_name: String,
    pub class_path: String,
    #[serde(default)]
    pub required_dependencies: BTreeSet<String>,
    /// Capability protocol names this service implements
    #[serde(default)]
    pub implements: BTreeSet<String>,
}

impl ServiceDeclaration {
    pub fn new(service_name: impl Into<String>, class_path: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            class_path: class_path.into(),
            required_dependencies: BTreeSet::new(),
            implements: BTreeSet::new(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_implements<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.implements = protocols.into_iter().map(Into::into).collect();
        self
    }
}

/// Registry of service declarations
#[derive(Default)]
pub struct DeclarationRegistry {
    declarations: RwLock<BTreeMap<String, ServiceDeclaration>>,
}

impl DeclarationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a declaration; later registrations overwrite
    pub fn register(&self, declaration: ServiceDeclaration) {
        debug!(service = %declaration.service_name, "registered service declaration");
        self.declarations
            .write()
            .insert(declaration.service_name.clone(), declaration);
    }

    pub fn get_service_declaration(&self, name: &str) -> Option<ServiceDeclaration> {
        self.declarations.read().get(name).cloned()
    }

    /// Names with a declaration, sorted
    pub fn declared_services(&self) -> Vec<String> {
        self.declarations.read().keys().cloned().collect()
    }

    /// Transitive closure of a seed set over declared dependencies
    ///
    /// Dependencies without a declaration of their own are still included in
    /// the closure; the bundle pipeline filters separately. The closed
    /// subgraph is verified acyclic.
    pub fn resolve_service_dependencies(
        &self,
        seed: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>> {
        let declarations = self.declarations.read();
        let mut closure: BTreeSet<String> = BTreeSet::new();
        let mut frontier: Vec<String> = seed.iter().cloned().collect();

        while let Some(service) = frontier.pop() {
            if !closure.insert(service.clone()) {
                continue;
            }
            if let Some(declaration) = declarations.get(&service) {
                for dependency in &declaration.required_dependencies {
                    if !closure.contains(dependency) {
                        frontier.push(dependency.clone());
                    }
                }
            }
        }
        drop(declarations);

        // A cyclic closure is invalid configuration, not just unsortable
        self.check_acyclic(&closure)?;
        Ok(closure)
    }

    /// Topological load order over the given services
    ///
    /// Iterative Kahn's algorithm; among ready services the lexicographically
    /// smallest loads first. Fails with the cycle participants when the
    /// subgraph cannot be ordered.
    pub fn calculate_load_order(&self, services: &BTreeSet<String>) -> Result<Vec<String>> {
        let declarations = self.declarations.read();

        // in-degree restricted to edges inside the requested set
        let mut in_degree: BTreeMap<&str, usize> =
            services.iter().map(|s| (s.as_str(), 0)).collect();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for service in services {
            if let Some(declaration) = declarations.get(service) {
                for dependency in &declaration.required_dependencies {
                    if services.contains(dependency) {
                        *in_degree.get_mut(service.as_str()).unwrap() += 1;
                        dependents
                            .entry(dependency.as_str())
                            .or_default()
                            .push(service.as_str());
                    }
                }
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(service, _)| *service)
            .collect();
        let mut order = Vec::with_capacity(services.len());

        while let Some(service) = ready.iter().next().copied() {
            ready.remove(service);
            order.push(service.to_string());
            if let Some(children) = dependents.get(service) {
                for child in children {
                    let degree = in_degree.get_mut(child).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(child);
                    }
                }
            }
        }

        if order.len() != services.len() {
            let cycle: Vec<String> = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(service, _)| service.to_string())
                .collect();
            return Err(RegistryError::DependencyCycle(cycle));
        }
        Ok(order)
    }

    fn check_acyclic(&self, services: &BTreeSet<String>) -> Result<()> {
        self.calculate_load_order(services).map(|_| ())
    }

    /// Map of protocol name to implementing service, from declarations
    ///
    /// When several declarations claim a protocol, the lexicographically
    /// first service wins, keeping the mapping deterministic.
    pub fn get_protocol_implementations(&self) -> HashMap<String, String> {
        let declarations = self.declarations.read();
        let mut mappings = HashMap::new();
        for (service, declaration) in declarations.iter() {
            for protocol in &declaration.implements {
                mappings
                    .entry(protocol.clone())
                    .or_insert_with(|| service.clone());
            }
        }
        mappings
    }
}
