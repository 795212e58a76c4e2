//! # agentmap-core - Graph Model and Agent Contract
//!
//! Core data model and execution types for AgentMap, a declarative
//! graph-execution runtime: workflows of agents described in a tabular file,
//! compiled into content-addressed bundles, and executed as a state machine.
//!
//! This crate holds everything the other AgentMap crates agree on:
//!
//! - **Graph model** ([`node`]) - nodes, edge labels, and the ordered
//!   [`GraphSpec`] a tabular spec parses into
//! - **Agent contract** ([`agent`]) - the async [`Agent`] trait and the
//!   [`AgentOutcome`] sum type (`Completed` / `Interrupted` / `Failed`)
//! - **Capability interfaces** ([`capability`]) - the fixed catalog of
//!   `configure_*_service` traits plus the type-erased [`ServiceHandle`]
//! - **Interruptions** ([`interaction`]) - human-interaction requests and
//!   resume checkpoints
//! - **Tracking & policy** ([`tracker`], [`policy`]) - per-run node outcome
//!   records and the success policies evaluated over them
//! - **Results** ([`result`]) - the typed [`ExecutionResult`]
//!
//! Higher layers build on these types: `agentmap-registry` resolves agent
//! types and services, `agentmap-bundle` compiles and caches execution
//! plans, and `agentmap-runtime` assembles and runs them.

pub mod agent;
pub mod capability;
pub mod error;
pub mod interaction;
pub mod node;
pub mod policy;
pub mod result;
pub mod state;
pub mod tracker;

// Re-export main types
pub use agent::{implemented_capabilities, Agent, AgentBlueprint, AgentContext, AgentOutcome};
pub use capability::{
    BlobStorageCapable, Capability, CsvCapable, FileCapable, JsonCapable, LlmCapable,
    MemoryCapable, OrchestrationCapable, PromptCapable, ServiceHandle, StorageCapable,
    VectorCapable,
};
pub use error::{CoreError, Result};
pub use interaction::{
    HumanInteractionRequest, InteractionType, Interruption, InterruptionCheckpoint,
};
pub use node::{EdgeLabel, GraphSpec, Node, NodeMetadata, NodeRegistryMap};
pub use policy::{CustomPolicyFn, ExecutionPolicy, PolicyConfig, PolicyEvaluator};
pub use result::{ExecutionResult, SourceInfo};
pub use state::{extract_inputs, last_action_success, merge_state, LAST_ACTION_SUCCESS};
pub use tracker::{
    shared_tracker, ExecutionSummary, ExecutionTracker, NodeExecution, SharedTracker,
    SubExecution,
};
