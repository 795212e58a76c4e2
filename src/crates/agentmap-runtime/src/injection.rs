//! Service-injection engine
//!
//! Wires registered service providers into agents through the capability
//! interfaces they implement. The catalog is fixed:
//!
//! | Interface             | Configuration operation          |
//! |-----------------------|----------------------------------|
//! | `LLMCapable`          | `configure_llm_service`          |
//! | `StorageCapable`      | `configure_storage_service`      |
//! | `CSVCapable`          | `configure_csv_service`          |
//! | `JSONCapable`         | `configure_json_service`         |
//! | `FileCapable`         | `configure_file_service`         |
//! | `VectorCapable`       | `configure_vector_service`       |
//! | `MemoryCapable`       | `configure_memory_service`       |
//! | `PromptCapable`       | `configure_prompt_service`       |
//! | `OrchestrationCapable`| `configure_orchestrator_service` |
//! | `BlobStorageCapable`  | `configure_blob_storage_service` |
//!
//! Providers resolve through the host-service registry by protocol name;
//! the storage-specific interfaces fall back to the generic
//! `StorageCapable` provider when no dedicated one is registered.
//!
//! In strict mode (the default) an agent that implements an interface with
//! no available provider fails the whole configuration pass: a partially
//! wired agent must never reach execution. Exceptions thrown by an agent's
//! own configure hook are re-raised with the agent and interface named.

use std::sync::Arc;
use tracing::{debug, warn};

use agentmap_core::{Agent, Capability, ServiceHandle};
use agentmap_registry::HostServiceRegistry;

use crate::error::{Result, RuntimeError};

/// Counts from one full configuration pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InjectionSummary {
    pub total_services_configured: usize,
    /// Protocol names configured, in catalog order
    pub configured: Vec<String>,
}

/// Configures agents against the host-service registry
pub struct ServiceInjector {
    host: Arc<HostServiceRegistry>,
    strict: bool,
}

impl ServiceInjector {
    pub fn new(host: Arc<HostServiceRegistry>) -> Self {
        Self { host, strict: true }
    }

    /// Disable strict mode: missing providers are skipped with a warning
    pub fn lenient(host: Arc<HostServiceRegistry>) -> Self {
        Self {
            host,
            strict: false,
        }
    }

    /// Configure the five core interfaces; returns how many were wired
    pub fn configure_core_services(&self, agent: &mut dyn Agent) -> Result<usize> {
        let mut configured = 0;
        for capability in Capability::CORE {
            if self.configure_capability(agent, capability)? {
                configured += 1;
            }
        }
        Ok(configured)
    }

    /// Configure the storage-specific interfaces
    ///
    /// Each falls back to the generic `StorageCapable` provider when no
    /// dedicated provider is registered.
    pub fn configure_storage_services(&self, agent: &mut dyn Agent) -> Result<usize> {
        let mut configured = 0;
        for capability in Capability::STORAGE {
            if self.configure_capability(agent, capability)? {
                configured += 1;
            }
        }
        Ok(configured)
    }

    /// Configure everything the agent implements
    pub fn configure_all_services(&self, agent: &mut dyn Agent) -> Result<InjectionSummary> {
        let mut summary = InjectionSummary::default();
        for capability in Capability::all() {
            if self.configure_capability(agent, capability)? {
                summary.total_services_configured += 1;
                summary
                    .configured
                    .push(capability.protocol_name().to_string());
            }
        }
        Ok(summary)
    }

    /// Configure one interface; `Ok(false)` when the agent does not
    /// implement it
    fn configure_capability(&self, agent: &mut dyn Agent, capability: Capability) -> Result<bool> {
        if !agent_implements(agent, capability) {
            return Ok(false);
        }

        let agent_name = agent.name().to_string();
        let Some(provider) = self.resolve_provider(capability) else {
            if self.strict {
                return Err(RuntimeError::UnavailableProvider {
                    agent: agent_name,
                    capability: capability.protocol_name().to_string(),
                });
            }
            warn!(
                agent = %agent_name,
                capability = %capability,
                "no provider available, skipping (lenient mode)"
            );
            return Ok(false);
        };

        let outcome = match capability {
            Capability::Llm => agent
                .as_llm_capable()
                .map(|c| c.configure_llm_service(provider)),
            Capability::Storage => agent
                .as_storage_capable()
                .map(|c| c.configure_storage_service(provider)),
            Capability::Csv => agent
                .as_csv_capable()
                .map(|c| c.configure_csv_service(provider)),
            Capability::Json => agent
                .as_json_capable()
                .map(|c| c.configure_json_service(provider)),
            Capability::File => agent
                .as_file_capable()
                .map(|c| c.configure_file_service(provider)),
            Capability::Vector => agent
                .as_vector_capable()
                .map(|c| c.configure_vector_service(provider)),
            Capability::Memory => agent
                .as_memory_capable()
                .map(|c| c.configure_memory_service(provider)),
            Capability::Prompt => agent
                .as_prompt_capable()
                .map(|c| c.configure_prompt_service(provider)),
            Capability::Orchestration => agent
                .as_orchestration_capable()
                .map(|c| c.configure_orchestrator_service(provider)),
            Capability::BlobStorage => agent
                .as_blob_storage_capable()
                .map(|c| c.configure_blob_storage_service(provider)),
        };

        match outcome {
            Some(Ok(())) => {
                debug!(agent = %agent_name, capability = %capability, "configured service");
                Ok(true)
            }
            Some(Err(e)) => Err(RuntimeError::Capability {
                agent: agent_name,
                capability: capability.protocol_name().to_string(),
                message: e.to_string(),
            }),
            // Accessor went away between the implements check and the call;
            // treat as not implemented
            None => Ok(false),
        }
    }

    fn resolve_provider(&self, capability: Capability) -> Option<ServiceHandle> {
        if let Some(provider) = self.host.get_protocol_provider(capability.protocol_name()) {
            return Some(provider);
        }
        if Capability::STORAGE.contains(&capability) {
            return self
                .host
                .get_protocol_provider(Capability::Storage.protocol_name());
        }
        None
    }
}

fn agent_implements(agent: &mut dyn Agent, capability: Capability) -> bool {
    match capability {
        Capability::Llm => agent.as_llm_capable().is_some(),
        Capability::Storage => agent.as_storage_capable().is_some(),
        Capability::Csv => agent.as_csv_capable().is_some(),
        Capability::Json => agent.as_json_capable().is_some(),
        Capability::File => agent.as_file_capable().is_some(),
        Capability::Vector => agent.as_vector_capable().is_some(),
        Capability::Memory => agent.as_memory_capable().is_some(),
        Capability::Prompt => agent.as_prompt_capable().is_some(),
        Capability::Orchestration => agent.as_orchestration_capable().is_some(),
        Capability::BlobStorage => agent.as_blob_storage_capable().is_some(),
    }
}
