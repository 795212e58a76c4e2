//! Node-registry service
//!
//! Builds the per-graph catalog of node metadata that orchestration-capable
//! agents consult at runtime to route work. Each entry carries a
//! description (node context `description`, else the node description, else
//! the first ~100 chars of the prompt), the agent type, and the declared
//! input/output fields. Catalogs are memoized per graph name; `force`
//! rebuilds and overwrites.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use agentmap_core::{Node, NodeMetadata, NodeRegistryMap};
use agentmap_bundle::GraphBundle;

use crate::assembly::InjectionStats;

/// Longest description taken from a prompt
const PROMPT_DESCRIPTION_LIMIT: usize = 100;

/// Classification of an assembly pass's node-registry injection
#[derive(Debug, Clone, PartialEq)]
pub struct InjectionVerdict {
    pub has_orchestrators: bool,
    pub all_injected: bool,
    pub success_rate: f64,
    pub stats: InjectionStats,
}

/// Builds and memoizes per-graph node catalogs
#[derive(Default)]
pub struct NodeRegistryService {
    cache: Mutex<HashMap<String, NodeRegistryMap>>,
}

impl NodeRegistryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the catalog for a bundle's graph
    ///
    /// `graph_name` overrides the bundle's name as the memoization key;
    /// `force` bypasses and overwrites the memoized catalog.
    pub fn build_registry(
        &self,
        bundle: &GraphBundle,
        graph_name: Option<&str>,
        force: bool,
    ) -> NodeRegistryMap {
        let key = graph_name.unwrap_or(&bundle.graph_name).to_string();

        if !force {
            if let Some(cached) = self.cache.lock().get(&key) {
                debug!(graph = %key, "node registry cache hit");
                return cached.clone();
            }
        }

        let registry: NodeRegistryMap = bundle
            .nodes
            .values()
            .map(|node| (node.name.clone(), node_metadata(node)))
            .collect();

        debug!(graph = %key, nodes = registry.len(), "built node registry");
        self.cache.lock().insert(key, registry.clone());
        registry
    }

    /// Entry point used by the runner right before assembly
    pub fn prepare_for_assembly(
        &self,
        bundle: &GraphBundle,
        graph_name: Option<&str>,
    ) -> NodeRegistryMap {
        self.build_registry(bundle, graph_name, false)
    }

    /// Classify an assembly pass's injection stats, logging the outcome
    pub fn verify_pre_compilation_injection(&self, stats: &InjectionStats) -> InjectionVerdict {
        let has_orchestrators = stats.orchestrators_found > 0;
        let all_injected = stats.orchestrators_injected == stats.orchestrators_found;
        let success_rate = if stats.orchestrators_found == 0 {
            1.0
        } else {
            stats.orchestrators_injected as f64 / stats.orchestrators_found as f64
        };

        if !has_orchestrators {
            debug!("no orchestration-capable agents in this graph");
        } else if all_injected {
            info!(
                orchestrators = stats.orchestrators_found,
                "node registry injected into every orchestrator"
            );
        } else {
            warn!(
                found = stats.orchestrators_found,
                injected = stats.orchestrators_injected,
                "node registry injection was partial"
            );
        }

        InjectionVerdict {
            has_orchestrators,
            all_injected,
            success_rate,
            stats: stats.clone(),
        }
    }
}

fn node_metadata(node: &Node) -> NodeMetadata {
    let description = node
        .context
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.is_empty())
        .or_else(|| (!node.description.is_empty()).then(|| node.description.clone()))
        .unwrap_or_else(|| truncate(&node.prompt, PROMPT_DESCRIPTION_LIMIT));

    NodeMetadata {
        description,
        prompt: node.prompt.clone(),
        node_type: if node.agent_type.is_empty() {
            "default".to_string()
        } else {
            node.agent_type.clone()
        },
        input_fields: node.inputs.clone(),
        output_field: (!node.output.is_empty()).then(|| node.output.clone()),
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        text.chars().take(limit).collect()
    }
}
