//! Error types for core graph and agent operations

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in the core data model and execution types
#[derive(Error, Debug)]
pub enum CoreError {
    /// A named entity (node, graph, thread) does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Structurally invalid input (empty names, dangling edges, bad config)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An agent's capability configuration hook failed
    #[error("capability {capability} failed for agent '{agent}': {message}")]
    Capability {
        agent: String,
        capability: String,
        message: String,
    },

    /// Failure while executing a graph
    #[error("execution error: {0}")]
    Execution(String),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
