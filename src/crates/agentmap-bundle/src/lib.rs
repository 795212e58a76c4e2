//! # agentmap-bundle - Content-Addressed Bundle Pipeline
//!
//! Turns a tabular workflow spec into a persisted, reusable execution plan:
//!
//! ```text
//! spec.csv ──hash──► csv_hash ──registry lookup──► hit? load bundle
//!     │                                              │
//!     ▼ miss                                         ▼
//!   parse ──► GraphSpec ──analyze──► GraphAnalysis ──► GraphBundle
//!                                                      │
//!                                    save JSON ◄───────┘
//!                                    register (csv_hash, graph_name)
//! ```
//!
//! - [`hash`] - streamed Sha256 identity of the spec file
//! - [`parser`] - tabular spec to [`GraphSpec`](agentmap_core::GraphSpec)
//! - [`analyzer`] - entry point, requirements, load order, structure metrics
//! - [`bundle`] - the [`GraphBundle`] artifact and its JSON format
//! - [`service`] - the `get_or_create_bundle` orchestration
//! - [`registry`] - the persistent `(csv_hash, graph_name)` index

pub mod analyzer;
pub mod bundle;
pub mod error;
pub mod hash;
pub mod parser;
pub mod registry;
pub mod service;

pub use analyzer::{GraphAnalysis, MetadataAnalyzer, BUILTIN_AGENT_NAMESPACE};
pub use bundle::{
    GraphBundle, GraphStructure, ValidationMetadata, BUNDLE_FORMAT, COMPATIBILITY_VERSION,
    FRAMEWORK_VERSION,
};
pub use error::{BundleError, Result};
pub use hash::{hash_file, is_valid_hash, short_node_hash};
pub use parser::{parse_context, parse_spec_file, FUNC_EDGE_PREFIX};
pub use registry::{BundleRegistry, RegistryEntry, RegistryMetadata, REGISTRY_VERSION};
pub use service::BundleService;
