//! # agentmap-runtime - Assembly and Execution
//!
//! The execution half of AgentMap: everything between a resolved
//! [`GraphBundle`](agentmap_bundle::GraphBundle) and a typed
//! [`ExecutionResult`](agentmap_core::ExecutionResult).
//!
//! ```text
//!                 bundle
//!                   │
//!        ┌──────────▼──────────┐
//!        │  GraphRunner        │  instantiate agents (agent registry)
//!        │                     │  inject services   (ServiceInjector)
//!        │                     │  build node catalog (NodeRegistryService)
//!        │                     │  assemble machine  (GraphAssembler)
//!        └──────────┬──────────┘
//!                   │ invoke
//!        ┌──────────▼──────────┐
//!        │  AssembledGraph      │  sequential node visits
//!        │                      │  conditional + func edge routing
//!        └───┬──────────────┬───┘
//!            │              │ ExecutionInterrupted
//!            ▼              ▼
//!     ExecutionResult   InteractionHandler (persist request + thread)
//! ```
//!
//! - [`injection`] - capability-interface service wiring (strict by default)
//! - [`assembly`] - the assembler and the compiled state machine
//! - [`node_registry`] - per-graph node catalogs for orchestrators
//! - [`runner`] - end-to-end bundle execution
//! - [`interaction`] - interruption persistence and thread lifecycle
//! - [`agents`] - the built-in agent roster
//! - [`bootstrap`] - container construction and registration
//! - [`facade`] - the adapter-facing boundary
//! - [`config`], [`storage`], [`routing`] - supporting pieces

pub mod agents;
pub mod assembly;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod facade;
pub mod injection;
pub mod interaction;
pub mod node_registry;
pub mod routing;
pub mod runner;
pub mod storage;

pub use assembly::{AssembledGraph, AssemblyOutput, GraphAssembler, InjectionStats, MachineOutcome};
pub use bootstrap::{
    bootstrap, register_availability_gated_agents, register_host_service, AgentMapContainer,
};
pub use config::{RuntimeConfig, CACHE_DIR_ENV};
pub use error::{Result, RuntimeError};
pub use facade::{AgentMapFacade, FacadeError, FacadeResult, ValidationReport};
pub use injection::{InjectionSummary, ServiceInjector};
pub use interaction::{
    BundleInfo, DisplayCallback, InteractionHandler, ThreadRecord, ThreadStatus,
    INTERACTIONS_COLLECTION, THREADS_COLLECTION,
};
pub use node_registry::{InjectionVerdict, NodeRegistryService};
pub use routing::{RoutingFn, RoutingFunctionRegistry};
pub use runner::{GraphRunner, RunOptions};
pub use storage::JsonCollectionStore;
