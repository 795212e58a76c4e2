//! Execution success policies
//!
//! A policy decides overall run success from the per-node outcomes in an
//! [`ExecutionSummary`]. Four policy types are supported: `all_nodes`,
//! `final_node`, `critical_nodes`, and `custom` (a named evaluator resolved
//! through a process-local registry). Unknown configured types fall back to
//! `all_nodes` with a warning; evaluator failures yield `false` and a log,
//! never a panic.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};

use crate::tracker::ExecutionSummary;

/// Custom policy evaluator: returns the success verdict or a failure message
pub type CustomPolicyFn =
    Arc<dyn Fn(&ExecutionSummary) -> std::result::Result<bool, String> + Send + Sync>;

/// Resolved execution policy
#[derive(Clone, Default)]
pub enum ExecutionPolicy {
    /// Every executed node must have succeeded
    #[default]
    AllNodes,
    /// Only the last executed node decides; empty run is a failure
    FinalNode,
    /// Every named node must have executed and succeeded
    CriticalNodes(Vec<String>),
    /// Named evaluator from the custom-policy registry
    Custom(String),
}

impl std::fmt::Debug for ExecutionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionPolicy::AllNodes => write!(f, "AllNodes"),
            ExecutionPolicy::FinalNode => write!(f, "FinalNode"),
            ExecutionPolicy::CriticalNodes(nodes) => {
                f.debug_tuple("CriticalNodes").field(nodes).finish()
            }
            ExecutionPolicy::Custom(name) => f.debug_tuple("Custom").field(name).finish(),
        }
    }
}

/// Raw policy configuration as read from the runtime config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// One of `all_nodes`, `final_node`, `critical_nodes`, `custom`
    #[serde(default = "default_policy_type")]
    pub policy_type: String,
    #[serde(default)]
    pub critical_nodes: Vec<String>,
    /// Dotted evaluator reference, e.g. `myapp.policies.weighted`
    #[serde(default)]
    pub custom_function: Option<String>,
}

fn default_policy_type() -> String {
    "all_nodes".to_string()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            policy_type: default_policy_type(),
            critical_nodes: Vec::new(),
            custom_function: None,
        }
    }
}

impl PolicyConfig {
    /// Validate the configuration, returning every problem found
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        match self.policy_type.as_str() {
            "all_nodes" | "final_node" => {}
            "critical_nodes" => {
                if self.critical_nodes.is_empty() {
                    errors.push("critical_nodes policy requires a non-empty node list".into());
                }
            }
            "custom" => match &self.custom_function {
                None => errors.push("custom policy requires a custom_function reference".into()),
                Some(name) if name.is_empty() || !name.contains('.') => errors.push(format!(
                    "custom_function '{name}' is not a dotted function reference"
                )),
                Some(_) => {}
            },
            other => errors.push(format!("unknown policy type '{other}'")),
        }
        errors
    }

    /// Resolve into an [`ExecutionPolicy`], warning and falling back to
    /// `all_nodes` on an unknown type
    pub fn resolve(&self) -> ExecutionPolicy {
        match self.policy_type.as_str() {
            "all_nodes" => ExecutionPolicy::AllNodes,
            "final_node" => ExecutionPolicy::FinalNode,
            "critical_nodes" => ExecutionPolicy::CriticalNodes(self.critical_nodes.clone()),
            "custom" => match &self.custom_function {
                Some(name) => ExecutionPolicy::Custom(name.clone()),
                None => {
                    warn!("custom policy configured without a function, using all_nodes");
                    ExecutionPolicy::AllNodes
                }
            },
            other => {
                warn!(policy_type = %other, "unknown policy type, falling back to all_nodes");
                ExecutionPolicy::AllNodes
            }
        }
    }
}

/// Evaluates policies, holding the registry of named custom evaluators
#[derive(Default)]
pub struct PolicyEvaluator {
    custom: RwLock<HashMap<String, CustomPolicyFn>>,
}

impl PolicyEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named custom evaluator; later registrations win
    pub fn register_custom(&self, name: impl Into<String>, evaluator: CustomPolicyFn) {
        self.custom.write().insert(name.into(), evaluator);
    }

    /// Decide overall success for a run
    pub fn evaluate(&self, policy: &ExecutionPolicy, summary: &ExecutionSummary) -> bool {
        match policy {
            ExecutionPolicy::AllNodes => summary.all_succeeded(),
            ExecutionPolicy::FinalNode => summary.final_succeeded().unwrap_or(false),
            ExecutionPolicy::CriticalNodes(nodes) => {
                nodes.iter().all(|node| summary.node_succeeded(node))
            }
            ExecutionPolicy::Custom(name) => {
                let evaluator = self.custom.read().get(name).cloned();
                match evaluator {
                    Some(evaluator) => match evaluator(summary) {
                        Ok(success) => success,
                        Err(e) => {
                            error!(policy = %name, error = %e, "custom policy evaluation failed");
                            false
                        }
                    },
                    None => {
                        error!(policy = %name, "custom policy is not registered");
                        false
                    }
                }
            }
        }
    }
}
