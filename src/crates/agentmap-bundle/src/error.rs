//! Error types for the bundle pipeline

use thiserror::Error;

/// Result type for bundle operations
pub type Result<T> = std::result::Result<T, BundleError>;

/// Errors that can occur while parsing, analyzing or persisting bundles
#[derive(Error, Debug)]
pub enum BundleError {
    /// Spec file, bundle file or graph does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed spec, hash or bundle content
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Persistence failure on a bundle or registry file
    #[error("storage error: {0}")]
    Storage(String),

    /// Tabular spec parse failure
    #[error("spec parse error: {0}")]
    Parse(#[from] csv::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error from the registry substrate
    #[error(transparent)]
    Registry(#[from] agentmap_registry::RegistryError),

    /// Error from the core data model
    #[error(transparent)]
    Core(#[from] agentmap_core::CoreError),
}
