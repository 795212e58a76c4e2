//! Error types for registry operations

use thiserror::Error;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur across the registry substrate
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A registration or declaration does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid registration input (empty name, unknown protocol, bad hash)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Service declarations form a dependency cycle
    #[error("service dependency cycle involving: {0:?}")]
    DependencyCycle(Vec<String>),

    /// Persistence failure on a registry's backing file
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
