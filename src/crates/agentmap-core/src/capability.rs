//! Capability interfaces and service handles
//!
//! A capability interface is a small trait with a single `configure_*_service`
//! operation. Agents opt into services by implementing the traits they need;
//! the injection engine discovers which interfaces an agent implements
//! through the `as_*_capable` accessors on [`Agent`](crate::agent::Agent) and
//! calls the matching configuration operation with the registered provider.
//!
//! Providers are passed as [`ServiceHandle`]s: a provider name plus a type-
//! erased `Arc`. Agents downcast to the concrete service type they expect;
//! cross-references between services stay by-name and are resolved to
//! providers only at injection time.

use std::any::Any;
use std::sync::Arc;

use crate::error::Result;
use crate::node::NodeRegistryMap;

/// Named, type-erased handle to a registered service provider
#[derive(Clone)]
pub struct ServiceHandle {
    name: String,
    instance: Arc<dyn Any + Send + Sync>,
}

impl ServiceHandle {
    /// Wrap a concrete service value
    pub fn new<T: Send + Sync + 'static>(name: impl Into<String>, service: T) -> Self {
        Self {
            name: name.into(),
            instance: Arc::new(service),
        }
    }

    /// Wrap an already-shared service
    pub fn from_arc<T: Send + Sync + 'static>(name: impl Into<String>, service: Arc<T>) -> Self {
        Self {
            name: name.into(),
            instance: service,
        }
    }

    /// Registered provider name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Downcast to the concrete service type
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.instance).downcast::<T>().ok()
    }

    /// Identity of the underlying provider, for summaries and tests
    pub fn provider_ptr(&self) -> *const () {
        Arc::as_ptr(&self.instance) as *const ()
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("name", &self.name)
            .field("instance", &"<provider>")
            .finish()
    }
}

/// The fixed catalog of capability interfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Llm,
    Storage,
    Csv,
    Json,
    File,
    Vector,
    Memory,
    Prompt,
    Orchestration,
    BlobStorage,
}

impl Capability {
    /// The protocol name used as the registry key for this interface
    pub fn protocol_name(&self) -> &'static str {
        match self {
            Capability::Llm => "LLMCapable",
            Capability::Storage => "StorageCapable",
            Capability::Csv => "CSVCapable",
            Capability::Json => "JSONCapable",
            Capability::File => "FileCapable",
            Capability::Vector => "VectorCapable",
            Capability::Memory => "MemoryCapable",
            Capability::Prompt => "PromptCapable",
            Capability::Orchestration => "OrchestrationCapable",
            Capability::BlobStorage => "BlobStorageCapable",
        }
    }

    /// Core interfaces configured for every agent
    pub const CORE: [Capability; 5] = [
        Capability::Llm,
        Capability::Storage,
        Capability::Prompt,
        Capability::Orchestration,
        Capability::BlobStorage,
    ];

    /// Storage-specific interfaces; generic `Storage` acts as their fallback
    pub const STORAGE: [Capability; 5] = [
        Capability::Csv,
        Capability::Json,
        Capability::File,
        Capability::Vector,
        Capability::Memory,
    ];

    /// Every interface in the catalog
    pub fn all() -> [Capability; 10] {
        [
            Capability::Llm,
            Capability::Storage,
            Capability::Csv,
            Capability::Json,
            Capability::File,
            Capability::Vector,
            Capability::Memory,
            Capability::Prompt,
            Capability::Orchestration,
            Capability::BlobStorage,
        ]
    }

    /// Resolve a protocol name back to its capability
    pub fn from_protocol_name(name: &str) -> Option<Capability> {
        Capability::all()
            .into_iter()
            .find(|c| c.protocol_name() == name)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.protocol_name())
    }
}

/// Agent consumes an LLM service
pub trait LlmCapable {
    fn configure_llm_service(&mut self, service: ServiceHandle) -> Result<()>;
}

/// Agent consumes the generic storage manager
pub trait StorageCapable {
    fn configure_storage_service(&mut self, service: ServiceHandle) -> Result<()>;
}

/// Agent consumes CSV storage
pub trait CsvCapable {
    fn configure_csv_service(&mut self, service: ServiceHandle) -> Result<()>;
}

/// Agent consumes JSON storage
pub trait JsonCapable {
    fn configure_json_service(&mut self, service: ServiceHandle) -> Result<()>;
}

/// Agent consumes file storage
pub trait FileCapable {
    fn configure_file_service(&mut self, service: ServiceHandle) -> Result<()>;
}

/// Agent consumes a vector store
pub trait VectorCapable {
    fn configure_vector_service(&mut self, service: ServiceHandle) -> Result<()>;
}

/// Agent consumes memory storage
pub trait MemoryCapable {
    fn configure_memory_service(&mut self, service: ServiceHandle) -> Result<()>;
}

/// Agent consumes the prompt manager
pub trait PromptCapable {
    fn configure_prompt_service(&mut self, service: ServiceHandle) -> Result<()>;
}

/// Agent routes work to other nodes and needs the node catalog
pub trait OrchestrationCapable {
    fn configure_orchestrator_service(&mut self, service: ServiceHandle) -> Result<()>;

    /// Receive the per-graph node catalog before assembly
    fn set_node_registry(&mut self, registry: NodeRegistryMap);
}

/// Agent consumes blob storage
pub trait BlobStorageCapable {
    fn configure_blob_storage_service(&mut self, service: ServiceHandle) -> Result<()>;
}
