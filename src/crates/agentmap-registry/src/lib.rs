//! # agentmap-registry - Registry Substrate
//!
//! The process-wide registries AgentMap resolves against:
//!
//! - [`availability`] - unified, categorized, file-backed cache of
//!   "is X available?" answers
//! - [`features`] - which optional provider families (LLM, storage) are
//!   enabled and validated, delegating to the availability cache
//! - [`agents`] - agent-type name to class path + construction factory
//! - [`host`] - host-provided service instances, indexed by service name
//!   and by capability protocol
//! - [`declarations`] - the canonical list of known services, their
//!   dependencies, and implemented protocols, with topological load-order
//!   calculation
//!
//! All registries are in effect process-wide singletons, but are always
//! passed by construction (the runtime's container owns them) so tests can
//! build isolated instances.

pub mod agents;
pub mod availability;
pub mod declarations;
pub mod error;
pub mod features;
pub mod host;

pub use agents::{AgentFactory, AgentRegistration, AgentRegistry};
pub use availability::{
    source_mtime_secs, AvailabilityCache, CACHE_SCHEMA_VERSION, MTIME_TOLERANCE_SECS,
};
pub use declarations::{DeclarationRegistry, ServiceDeclaration};
pub use error::{RegistryError, Result};
pub use features::{FeatureRegistry, ProviderValidator};
pub use host::{HostServiceRegistry, ServiceEntry};
