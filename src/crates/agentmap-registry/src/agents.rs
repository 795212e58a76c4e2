//! Agent-type registry
//!
//! Maps agent-type names to their class path and construction factory.
//! Lookups are case-insensitive and the empty type resolves to `"default"`.
//! The registry is populated once by the application bootstrap: built-ins
//! first, then provider-gated agents, then anything discovered under the
//! custom-agents path.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use agentmap_core::{Agent, AgentBlueprint};

/// Constructs an agent instance for one node
pub type AgentFactory = Arc<dyn Fn(AgentBlueprint) -> Box<dyn Agent> + Send + Sync>;

/// One registered agent type
#[derive(Clone)]
pub struct AgentRegistration {
    /// Fully-qualified class reference, e.g. `agentmap_runtime::agents::DefaultAgent`
    pub class_path: String,
    pub factory: AgentFactory,
}

impl std::fmt::Debug for AgentRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistration")
            .field("class_path", &self.class_path)
            .field("factory", &"<factory>")
            .finish()
    }
}

/// Case-insensitive map of agent-type name to registration
#[derive(Default)]
pub struct AgentRegistry {
    entries: RwLock<HashMap<String, AgentRegistration>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(agent_type: &str) -> String {
        if agent_type.is_empty() {
            "default".to_string()
        } else {
            agent_type.to_lowercase()
        }
    }

    /// Register an agent type; later registrations overwrite
    pub fn register(
        &self,
        agent_type: &str,
        class_path: impl Into<String>,
        factory: AgentFactory,
    ) {
        let key = Self::normalize(agent_type);
        let class_path = class_path.into();
        debug!(agent_type = %key, class_path = %class_path, "registered agent type");
        self.entries
            .write()
            .insert(key, AgentRegistration { class_path, factory });
    }

    /// Whether a registration exists for this type
    pub fn has_agent(&self, agent_type: &str) -> bool {
        self.entries
            .read()
            .contains_key(&Self::normalize(agent_type))
    }

    /// Look up a registration
    pub fn get(&self, agent_type: &str) -> Option<AgentRegistration> {
        self.entries
            .read()
            .get(&Self::normalize(agent_type))
            .cloned()
    }

    /// Class path for a type, if registered
    pub fn get_class_path(&self, agent_type: &str) -> Option<String> {
        self.get(agent_type).map(|r| r.class_path)
    }

    /// All registered type names, sorted
    pub fn list_agent_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.entries.read().keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
