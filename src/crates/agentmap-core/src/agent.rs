//! The agent contract
//!
//! An agent is the unit of work bound to one graph node. The runtime drives
//! it through [`Agent::run`], which takes the current execution state and
//! returns an [`AgentOutcome`]:
//!
//! - `Completed(state)` — the node finished; the returned value is merged
//!   into the running state
//! - `Interrupted(interruption)` — the node paused for human input; the
//!   interruption carries the request and a resume checkpoint
//! - `Failed(message)` — the node failed; conditional edges may route on it
//!
//! Interruption is a result variant rather than an error: pausing is control
//! flow, not failure.
//!
//! Agents declare their service needs by implementing capability interfaces
//! ([`crate::capability`]) and exposing them through the `as_*_capable`
//! accessors, which default to `None`. The injection engine only wires what
//! an agent exposes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::capability::{
    BlobStorageCapable, CsvCapable, FileCapable, JsonCapable, LlmCapable, MemoryCapable,
    OrchestrationCapable, PromptCapable, StorageCapable, VectorCapable,
};
use crate::interaction::Interruption;
use crate::tracker::SharedTracker;

/// Construction-time context handed to an agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentContext {
    /// State fields the node reads
    #[serde(default)]
    pub input_fields: Vec<String>,
    /// State field the node writes
    #[serde(default)]
    pub output_field: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Per-instance identifier assigned by the runner
    #[serde(default)]
    pub instance_id: String,
    /// Free-form node context (may include a `services` list)
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

/// Result of one agent invocation
#[derive(Debug)]
pub enum AgentOutcome {
    /// Node finished; value is merged into the running state
    Completed(Value),
    /// Node paused for human input
    Interrupted(Interruption),
    /// Node failed with a message
    Failed(String),
}

impl AgentOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, AgentOutcome::Completed(_))
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, AgentOutcome::Interrupted(_))
    }

    /// The state update, when the outcome carries one
    pub fn state_update(&self) -> Option<&Value> {
        match self {
            AgentOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// Unit of work bound to one graph node
///
/// Implementations must be `Send + Sync`; one instance is constructed per
/// node per execution and never shared across executions.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Node name this agent instance is bound to
    fn name(&self) -> &str;

    /// Prompt declared on the node
    fn prompt(&self) -> &str {
        ""
    }

    fn context(&self) -> &AgentContext;

    /// Execute against the current state
    async fn run(&self, state: Value) -> AgentOutcome;

    /// Receive the shared execution tracker; default ignores it
    fn attach_tracker(&mut self, tracker: SharedTracker) {
        let _ = tracker;
    }

    // Capability discovery. Each accessor returns `Some` only when the agent
    // implements the corresponding interface.

    fn as_llm_capable(&mut self) -> Option<&mut dyn LlmCapable> {
        None
    }

    fn as_storage_capable(&mut self) -> Option<&mut dyn StorageCapable> {
        None
    }

    fn as_csv_capable(&mut self) -> Option<&mut dyn CsvCapable> {
        None
    }

    fn as_json_capable(&mut self) -> Option<&mut dyn JsonCapable> {
        None
    }

    fn as_file_capable(&mut self) -> Option<&mut dyn FileCapable> {
        None
    }

    fn as_vector_capable(&mut self) -> Option<&mut dyn VectorCapable> {
        None
    }

    fn as_memory_capable(&mut self) -> Option<&mut dyn MemoryCapable> {
        None
    }

    fn as_prompt_capable(&mut self) -> Option<&mut dyn PromptCapable> {
        None
    }

    fn as_orchestration_capable(&mut self) -> Option<&mut dyn OrchestrationCapable> {
        None
    }

    fn as_blob_storage_capable(&mut self) -> Option<&mut dyn BlobStorageCapable> {
        None
    }
}

/// Which capability interfaces an agent implements
///
/// Probes every `as_*_capable` accessor; the result is the set the
/// injection engine will try to configure.
pub fn implemented_capabilities(agent: &mut dyn Agent) -> Vec<crate::capability::Capability> {
    use crate::capability::Capability;

    let mut capabilities = Vec::new();
    if agent.as_llm_capable().is_some() {
        capabilities.push(Capability::Llm);
    }
    if agent.as_storage_capable().is_some() {
        capabilities.push(Capability::Storage);
    }
    if agent.as_csv_capable().is_some() {
        capabilities.push(Capability::Csv);
    }
    if agent.as_json_capable().is_some() {
        capabilities.push(Capability::Json);
    }
    if agent.as_file_capable().is_some() {
        capabilities.push(Capability::File);
    }
    if agent.as_vector_capable().is_some() {
        capabilities.push(Capability::Vector);
    }
    if agent.as_memory_capable().is_some() {
        capabilities.push(Capability::Memory);
    }
    if agent.as_prompt_capable().is_some() {
        capabilities.push(Capability::Prompt);
    }
    if agent.as_orchestration_capable().is_some() {
        capabilities.push(Capability::Orchestration);
    }
    if agent.as_blob_storage_capable().is_some() {
        capabilities.push(Capability::BlobStorage);
    }
    capabilities
}

/// Everything needed to construct an agent for one node
#[derive(Debug, Clone, Default)]
pub struct AgentBlueprint {
    pub name: String,
    pub prompt: String,
    pub context: AgentContext,
}

impl AgentBlueprint {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>, context: AgentContext) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            context,
        }
    }
}
