//! Error types for the execution runtime

use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur while assembling or executing graphs
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Graph, node, agent type or thread record does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed configuration or graph input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An agent needs a capability whose provider is not registered
    #[error("no provider available for {capability} required by agent '{agent}'")]
    UnavailableProvider { agent: String, capability: String },

    /// An agent's configuration hook failed
    #[error("configuring {capability} on agent '{agent}' failed: {message}")]
    Capability {
        agent: String,
        capability: String,
        message: String,
    },

    /// Failure while executing a compiled graph
    #[error("execution error: {0}")]
    Execution(String),

    /// Persistence failure (interaction records, thread records)
    #[error("storage error in {step}: {message}")]
    Storage { step: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file parse error
    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// Error from the core data model
    #[error(transparent)]
    Core(#[from] agentmap_core::CoreError),

    /// Error from the registry substrate
    #[error(transparent)]
    Registry(#[from] agentmap_registry::RegistryError),

    /// Error from the bundle pipeline
    #[error(transparent)]
    Bundle(#[from] agentmap_bundle::BundleError),
}
