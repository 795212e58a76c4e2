//! Host-service registry
//!
//! Registry for host-provided service instances, indexed two ways: by
//! service name and by implemented capability-protocol name. A protocol can
//! resolve to at most one service; re-registering a protocol moves the
//! mapping but leaves earlier services' capability lists intact. Both
//! indexes sit behind a single mutex so unregistering a service purges its
//! protocol mappings in one critical section.
//!
//! Invalid registrations (empty names, unknown protocols, protocols for
//! unregistered services) are logged as warnings and rejected without
//! raising; bootstrap must never abort over a bad host extension.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use agentmap_core::{Capability, ServiceHandle};

/// One registered service provider
#[derive(Debug, Clone)]
pub struct ServiceEntry {
    pub provider: ServiceHandle,
    /// Protocol names this service implements
    pub protocols: HashSet<String>,
    pub metadata: HashMap<String, Value>,
}

#[derive(Default)]
struct Indexes {
    services: HashMap<String, ServiceEntry>,
    protocols: HashMap<String, String>,
}

/// Dual-index host-service registry
#[derive(Default)]
pub struct HostServiceRegistry {
    inner: Mutex<Indexes>,
}

impl HostServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under a service name, optionally claiming
    /// protocol implementations
    ///
    /// Returns `false` (after logging a warning) on invalid input instead of
    /// raising.
    pub fn register_service_provider(
        &self,
        name: &str,
        provider: ServiceHandle,
        protocols: &[&str],
        metadata: HashMap<String, Value>,
    ) -> bool {
        if name.is_empty() {
            warn!("rejected service registration with an empty name");
            return false;
        }
        let mut valid_protocols = HashSet::new();
        for protocol in protocols {
            if Capability::from_protocol_name(protocol).is_none() {
                warn!(service = %name, protocol = %protocol, "rejected registration: unknown capability protocol");
                return false;
            }
            valid_protocols.insert(protocol.to_string());
        }

        let mut inner = self.inner.lock();
        for protocol in &valid_protocols {
            inner.protocols.insert(protocol.clone(), name.to_string());
        }
        inner.services.insert(
            name.to_string(),
            ServiceEntry {
                provider,
                protocols: valid_protocols,
                metadata,
            },
        );
        debug!(service = %name, "registered host service");
        true
    }

    /// Point a protocol at an already-registered service
    pub fn register_protocol_implementation(&self, protocol: &str, service_name: &str) -> bool {
        if protocol.is_empty() || service_name.is_empty() {
            warn!("rejected protocol registration with an empty name");
            return false;
        }
        if Capability::from_protocol_name(protocol).is_none() {
            warn!(protocol = %protocol, "rejected registration: unknown capability protocol");
            return false;
        }

        let mut inner = self.inner.lock();
        if !inner.services.contains_key(service_name) {
            warn!(
                protocol = %protocol,
                service = %service_name,
                "rejected protocol registration for an unregistered service"
            );
            return false;
        }
        inner
            .protocols
            .insert(protocol.to_string(), service_name.to_string());
        if let Some(entry) = inner.services.get_mut(service_name) {
            entry.protocols.insert(protocol.to_string());
        }
        true
    }

    pub fn get_service_provider(&self, name: &str) -> Option<ServiceHandle> {
        self.inner
            .lock()
            .services
            .get(name)
            .map(|entry| entry.provider.clone())
    }

    /// Service name currently implementing a protocol
    pub fn get_protocol_implementation(&self, protocol: &str) -> Option<String> {
        self.inner.lock().protocols.get(protocol).cloned()
    }

    /// Resolve a protocol straight to its provider handle
    pub fn get_protocol_provider(&self, protocol: &str) -> Option<ServiceHandle> {
        let inner = self.inner.lock();
        let service = inner.protocols.get(protocol)?;
        inner
            .services
            .get(service)
            .map(|entry| entry.provider.clone())
    }

    /// All services claiming a protocol in their capability list, sorted
    pub fn discover_services_by_protocol(&self, protocol: &str) -> Vec<String> {
        let inner = self.inner.lock();
        let mut names: Vec<String> = inner
            .services
            .iter()
            .filter(|(_, entry)| entry.protocols.contains(protocol))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Remove a service and every protocol mapping that resolves to it
    pub fn unregister_service(&self, name: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.services.remove(name).is_none() {
            return false;
        }
        inner.protocols.retain(|_, service| service != name);
        debug!(service = %name, "unregistered host service");
        true
    }

    pub fn clear_registry(&self) {
        let mut inner = self.inner.lock();
        inner.services.clear();
        inner.protocols.clear();
    }

    /// Check a registered provider, returning the reason it is unusable
    pub fn validate_service_provider(&self, name: &str) -> std::result::Result<(), String> {
        let inner = self.inner.lock();
        match inner.services.get(name) {
            Some(entry) => {
                for protocol in &entry.protocols {
                    if Capability::from_protocol_name(protocol).is_none() {
                        return Err(format!(
                            "service '{name}' claims unknown protocol '{protocol}'"
                        ));
                    }
                }
                Ok(())
            }
            None => Err(format!("service '{name}' is not registered")),
        }
    }

    /// Counts and per-service protocol lists, for diagnostics
    pub fn get_registry_summary(&self) -> Value {
        let inner = self.inner.lock();
        let mut services: Vec<Value> = inner
            .services
            .iter()
            .map(|(name, entry)| {
                let mut protocols: Vec<&str> =
                    entry.protocols.iter().map(String::as_str).collect();
                protocols.sort();
                json!({
                    "name": name,
                    "protocols": protocols,
                    "metadata": entry.metadata,
                })
            })
            .collect();
        services.sort_by_key(|s| s["name"].as_str().unwrap_or("").to_string());

        json!({
            "service_count": inner.services.len(),
            "protocol_count": inner.protocols.len(),
            "services": services,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(name: &str) -> ServiceHandle {
        ServiceHandle::new(name, name.to_string())
    }

    #[test]
    fn test_register_and_lookup_by_both_indexes() {
        let registry = HostServiceRegistry::new();
        assert!(registry.register_service_provider(
            "llm_service",
            handle("llm_service"),
            &["LLMCapable"],
            HashMap::new(),
        ));

        assert!(registry.get_service_provider("llm_service").is_some());
        assert_eq!(
            registry.get_protocol_implementation("LLMCapable").as_deref(),
            Some("llm_service")
        );
        assert!(registry.get_protocol_provider("LLMCapable").is_some());
    }

    #[test]
    fn test_unregister_purges_all_protocol_mappings() {
        let registry = HostServiceRegistry::new();
        registry.register_service_provider(
            "storage",
            handle("storage"),
            &["CSVCapable", "JSONCapable"],
            HashMap::new(),
        );

        assert!(registry.unregister_service("storage"));
        assert_eq!(registry.get_protocol_implementation("CSVCapable"), None);
        assert_eq!(registry.get_protocol_implementation("JSONCapable"), None);
        assert!(registry.get_service_provider("storage").is_none());
        assert!(!registry.unregister_service("storage"));
    }

    #[test]
    fn test_protocol_reregistration_moves_mapping_only() {
        let registry = HostServiceRegistry::new();
        registry.register_service_provider("a", handle("a"), &["LLMCapable"], HashMap::new());
        registry.register_service_provider("b", handle("b"), &[], HashMap::new());
        assert!(registry.register_protocol_implementation("LLMCapable", "b"));

        assert_eq!(
            registry.get_protocol_implementation("LLMCapable").as_deref(),
            Some("b")
        );
        // Both services still claim the protocol until unregistered
        assert_eq!(
            registry.discover_services_by_protocol("LLMCapable"),
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_unregister_does_not_steal_moved_protocol() {
        let registry = HostServiceRegistry::new();
        registry.register_service_provider("a", handle("a"), &["LLMCapable"], HashMap::new());
        registry.register_service_provider("b", handle("b"), &["LLMCapable"], HashMap::new());
        // "b" registered last, owns the mapping
        assert!(registry.unregister_service("a"));
        assert_eq!(
            registry.get_protocol_implementation("LLMCapable").as_deref(),
            Some("b")
        );
    }

    #[test]
    fn test_invalid_registrations_are_rejected_without_raising() {
        let registry = HostServiceRegistry::new();
        assert!(!registry.register_service_provider("", handle("x"), &[], HashMap::new()));
        assert!(!registry.register_service_provider(
            "svc",
            handle("svc"),
            &["NotAProtocol"],
            HashMap::new(),
        ));
        assert!(!registry.register_protocol_implementation("LLMCapable", "ghost"));
        assert!(registry.validate_service_provider("ghost").is_err());
    }

    #[test]
    fn test_summary_counts() {
        let registry = HostServiceRegistry::new();
        registry.register_service_provider(
            "storage",
            handle("storage"),
            &["CSVCapable", "FileCapable"],
            HashMap::new(),
        );
        let summary = registry.get_registry_summary();
        assert_eq!(summary["service_count"], 1);
        assert_eq!(summary["protocol_count"], 2);

        registry.clear_registry();
        let summary = registry.get_registry_summary();
        assert_eq!(summary["service_count"], 0);
    }
}
