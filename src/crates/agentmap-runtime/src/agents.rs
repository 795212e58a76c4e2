//! Built-in agents
//!
//! The eight-agent core roster registered unconditionally at bootstrap:
//! pass-through and echo nodes, success/failure probes for conditional
//! routing, the two human-in-the-loop agents (`input` for plain text,
//! `human` for configurable interactions), and the graph agent that
//! executes a nested bundle.
//!
//! [`LlmAgent`] and [`OrchestratorAgent`] are defined here but are NOT
//! built-ins: their agent types are registered only when the feature
//! registry reports a validated LLM provider
//! ([`register_availability_gated_agents`](crate::bootstrap::register_availability_gated_agents)).
//!
//! All of these classes live under the `agentmap_runtime::agents`
//! class-path namespace, which is what classifies an agent type as
//! "builtin" during bundle analysis.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use agentmap_core::{
    extract_inputs, Agent, AgentContext, AgentOutcome, HumanInteractionRequest, InteractionType,
    Interruption, InterruptionCheckpoint, LlmCapable, NodeRegistryMap, OrchestrationCapable,
    Result as CoreResult, ServiceHandle, SharedTracker, SourceInfo,
};
use agentmap_bundle::BundleService;

use crate::runner::{GraphRunner, RunOptions};

fn output_update(context: &AgentContext, value: Value) -> Value {
    match &context.output_field {
        Some(field) => json!({ field.clone(): value }),
        None => json!({}),
    }
}

/// Pass-through agent bound to unconfigured nodes
///
/// Writes its prompt (or a placeholder) to the output field and succeeds.
pub struct DefaultAgent {
    name: String,
    prompt: String,
    context: AgentContext,
}

impl DefaultAgent {
    pub fn new(name: String, prompt: String, context: AgentContext) -> Self {
        Self {
            name,
            prompt,
            context,
        }
    }
}

#[async_trait]
impl Agent for DefaultAgent {
    fn name(&self) -> &str {
        &self.name
    }
    fn prompt(&self) -> &str {
        &self.prompt
    }
    fn context(&self) -> &AgentContext {
        &self.context
    }

    async fn run(&self, _state: Value) -> AgentOutcome {
        let message = if self.prompt.is_empty() {
            format!("{} executed", self.name)
        } else {
            self.prompt.clone()
        };
        AgentOutcome::Completed(output_update(&self.context, json!(message)))
    }
}

/// Copies its first input field to its output field
pub struct EchoAgent {
    name: String,
    context: AgentContext,
}

impl EchoAgent {
    pub fn new(name: String, context: AgentContext) -> Self {
        Self { name, context }
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn name(&self) -> &str {
        &self.name
    }
    fn context(&self) -> &AgentContext {
        &self.context
    }

    async fn run(&self, state: Value) -> AgentOutcome {
        let inputs = extract_inputs(&state, &self.context.input_fields);
        let echoed = self
            .context
            .input_fields
            .first()
            .and_then(|field| inputs.get(field).cloned())
            .unwrap_or(Value::Null);
        AgentOutcome::Completed(output_update(&self.context, echoed))
    }
}

/// Drives the `last_action_success` flag from its first input field
///
/// Truthy input (`true`, `"true"`, `"yes"`, `1`) routes success; anything
/// else routes failure.
pub struct BranchingAgent {
    name: String,
    context: AgentContext,
}

impl BranchingAgent {
    pub fn new(name: String, context: AgentContext) -> Self {
        Self { name, context }
    }

    fn is_truthy(value: &Value) -> bool {
        match value {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Value::String(s) => matches!(s.to_lowercase().as_str(), "true" | "yes" | "1"),
            _ => false,
        }
    }
}

#[async_trait]
impl Agent for BranchingAgent {
    fn name(&self) -> &str {
        &self.name
    }
    fn context(&self) -> &AgentContext {
        &self.context
    }

    async fn run(&self, state: Value) -> AgentOutcome {
        let decision = self
            .context
            .input_fields
            .first()
            .and_then(|field| state.get(field))
            .map(Self::is_truthy)
            .unwrap_or(true);

        let mut update = agentmap_core::state::as_object(&output_update(&self.context, json!(decision)));
        update.insert("last_action_success".to_string(), json!(decision));
        AgentOutcome::Completed(Value::Object(update))
    }
}

/// Always completes
pub struct SuccessAgent {
    name: String,
    context: AgentContext,
}

impl SuccessAgent {
    pub fn new(name: String, context: AgentContext) -> Self {
        Self { name, context }
    }
}

#[async_trait]
impl Agent for SuccessAgent {
    fn name(&self) -> &str {
        &self.name
    }
    fn context(&self) -> &AgentContext {
        &self.context
    }

    async fn run(&self, _state: Value) -> AgentOutcome {
        AgentOutcome::Completed(output_update(&self.context, json!("success")))
    }
}

/// Always fails
pub struct FailureAgent {
    name: String,
    context: AgentContext,
}

impl FailureAgent {
    pub fn new(name: String, context: AgentContext) -> Self {
        Self { name, context }
    }
}

#[async_trait]
impl Agent for FailureAgent {
    fn name(&self) -> &str {
        &self.name
    }
    fn context(&self) -> &AgentContext {
        &self.context
    }

    async fn run(&self, _state: Value) -> AgentOutcome {
        AgentOutcome::Failed(format!("{} always fails", self.name))
    }
}

/// Pauses the run with a text-input interaction
///
/// The thread id comes from the `thread_id` state field when present so
/// adapters can correlate resumes; otherwise one is generated.
pub struct InputAgent {
    name: String,
    prompt: String,
    context: AgentContext,
}

impl InputAgent {
    pub fn new(name: String, prompt: String, context: AgentContext) -> Self {
        Self {
            name,
            prompt,
            context,
        }
    }
}

#[async_trait]
impl Agent for InputAgent {
    fn name(&self) -> &str {
        &self.name
    }
    fn prompt(&self) -> &str {
        &self.prompt
    }
    fn context(&self) -> &AgentContext {
        &self.context
    }

    async fn run(&self, state: Value) -> AgentOutcome {
        let thread_id = state
            .get("thread_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("thread-{}", uuid::Uuid::new_v4()));

        let request = HumanInteractionRequest::new(
            thread_id.clone(),
            self.name.clone(),
            InteractionType::TextInput,
            if self.prompt.is_empty() {
                "input required".to_string()
            } else {
                self.prompt.clone()
            },
        );
        let checkpoint = InterruptionCheckpoint {
            inputs: extract_inputs(&state, &self.context.input_fields),
            agent_context: self.context.extra.clone(),
            execution_tracker: None,
            node_name: self.name.clone(),
        };
        AgentOutcome::Interrupted(Interruption::new(thread_id, request, checkpoint))
    }
}

/// Pauses for a configurable human interaction
///
/// Where [`InputAgent`] always asks for free text, this agent reads the
/// interaction shape from its node context: `interaction_type`
/// (`text_input`, `choice`, `approval`, `custom`; default `approval`),
/// an `options` list for choices, and an advisory `timeout_seconds`.
pub struct HumanAgent {
    name: String,
    prompt: String,
    context: AgentContext,
}

impl HumanAgent {
    pub fn new(name: String, prompt: String, context: AgentContext) -> Self {
        Self {
            name,
            prompt,
            context,
        }
    }

    fn interaction_type(&self) -> InteractionType {
        match self
            .context
            .extra
            .get("interaction_type")
            .and_then(Value::as_str)
        {
            Some("text_input") => InteractionType::TextInput,
            Some("choice") => InteractionType::Choice,
            Some("custom") => InteractionType::Custom,
            _ => InteractionType::Approval,
        }
    }

    fn options(&self) -> Vec<String> {
        self.context
            .extra
            .get("options")
            .and_then(Value::as_array)
            .map(|options| {
                options
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Agent for HumanAgent {
    fn name(&self) -> &str {
        &self.name
    }
    fn prompt(&self) -> &str {
        &self.prompt
    }
    fn context(&self) -> &AgentContext {
        &self.context
    }

    async fn run(&self, state: Value) -> AgentOutcome {
        let thread_id = state
            .get("thread_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("thread-{}", uuid::Uuid::new_v4()));

        let mut request = HumanInteractionRequest::new(
            thread_id.clone(),
            self.name.clone(),
            self.interaction_type(),
            if self.prompt.is_empty() {
                "human response required".to_string()
            } else {
                self.prompt.clone()
            },
        )
        .with_options(self.options());
        if let Some(timeout) = self
            .context
            .extra
            .get("timeout_seconds")
            .and_then(Value::as_u64)
        {
            request = request.with_timeout(timeout);
        }

        let checkpoint = InterruptionCheckpoint {
            inputs: extract_inputs(&state, &self.context.input_fields),
            agent_context: self.context.extra.clone(),
            execution_tracker: None,
            node_name: self.name.clone(),
        };
        AgentOutcome::Interrupted(Interruption::new(thread_id, request, checkpoint))
    }
}

/// LLM-backed prompt agent
///
/// Not part of the built-in roster: bootstrap registers the `llm` agent
/// type only when a validated LLM provider is available. Requires an
/// `LLMCapable` provider; strict injection guarantees the service is
/// present before the first `run`.
pub struct LlmAgent {
    name: String,
    prompt: String,
    context: AgentContext,
    llm: Option<ServiceHandle>,
}

impl LlmAgent {
    pub fn new(name: String, prompt: String, context: AgentContext) -> Self {
        Self {
            name,
            prompt,
            context,
            llm: None,
        }
    }

    /// The configured provider, for tests and diagnostics
    pub fn llm_service(&self) -> Option<&ServiceHandle> {
        self.llm.as_ref()
    }
}

impl LlmCapable for LlmAgent {
    fn configure_llm_service(&mut self, service: ServiceHandle) -> CoreResult<()> {
        debug!(agent = %self.name, provider = %service.name(), "LLM service configured");
        self.llm = Some(service);
        Ok(())
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn name(&self) -> &str {
        &self.name
    }
    fn prompt(&self) -> &str {
        &self.prompt
    }
    fn context(&self) -> &AgentContext {
        &self.context
    }
    fn as_llm_capable(&mut self) -> Option<&mut dyn LlmCapable> {
        Some(self)
    }

    async fn run(&self, state: Value) -> AgentOutcome {
        let Some(llm) = &self.llm else {
            return AgentOutcome::Failed(format!("agent '{}' has no LLM service", self.name));
        };
        let inputs = extract_inputs(&state, &self.context.input_fields);
        // The provider boundary: a real backend renders the prompt against
        // the inputs; the built-in records what would be sent.
        let rendered = json!({
            "provider": llm.name(),
            "prompt": self.prompt,
            "inputs": inputs,
        });
        AgentOutcome::Completed(output_update(&self.context, rendered))
    }
}

/// Routes work by matching input text against the node catalog
///
/// Availability-gated like [`LlmAgent`]: registered only when a validated
/// LLM provider is available, never as an unconditional built-in.
pub struct OrchestratorAgent {
    name: String,
    context: AgentContext,
    orchestrator: Option<ServiceHandle>,
    node_registry: Option<NodeRegistryMap>,
}

impl OrchestratorAgent {
    pub fn new(name: String, context: AgentContext) -> Self {
        Self {
            name,
            context,
            orchestrator: None,
            node_registry: None,
        }
    }

    /// The configured orchestrator service, for diagnostics
    pub fn orchestrator_service(&self) -> Option<&ServiceHandle> {
        self.orchestrator.as_ref()
    }
}

impl OrchestrationCapable for OrchestratorAgent {
    fn configure_orchestrator_service(&mut self, service: ServiceHandle) -> CoreResult<()> {
        self.orchestrator = Some(service);
        Ok(())
    }

    fn set_node_registry(&mut self, registry: NodeRegistryMap) {
        self.node_registry = Some(registry);
    }
}

#[async_trait]
impl Agent for OrchestratorAgent {
    fn name(&self) -> &str {
        &self.name
    }
    fn context(&self) -> &AgentContext {
        &self.context
    }
    fn as_orchestration_capable(&mut self) -> Option<&mut dyn OrchestrationCapable> {
        Some(self)
    }

    async fn run(&self, state: Value) -> AgentOutcome {
        let Some(registry) = &self.node_registry else {
            return AgentOutcome::Failed(format!(
                "orchestrator '{}' has no node registry",
                self.name
            ));
        };

        let query = self
            .context
            .input_fields
            .first()
            .and_then(|field| state.get(field))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_lowercase();

        let mut entries: Vec<(&String, &agentmap_core::NodeMetadata)> = registry.iter().collect();
        entries.sort_by_key(|(name, _)| name.as_str());
        let chosen = entries
            .iter()
            .find(|(name, metadata)| {
                name.to_lowercase().contains(&query)
                    || metadata.description.to_lowercase().contains(&query)
            })
            .map(|(name, _)| name.as_str());

        match chosen {
            Some(node) => AgentOutcome::Completed(output_update(&self.context, json!(node))),
            None => AgentOutcome::Failed(format!(
                "orchestrator '{}' found no node matching '{query}'",
                self.name
            )),
        }
    }
}

/// Executes another graph as a single node
///
/// The node context names the inner spec (`csv_path`) and graph
/// (`graph_name`, defaulting to the prompt). The inner run's final state is
/// this agent's output unless an `output_mapping` object in the context
/// selects and renames fields.
pub struct GraphAgent {
    name: String,
    prompt: String,
    context: AgentContext,
    bundles: Arc<BundleService>,
    runner: Arc<GraphRunner>,
    tracker: Option<SharedTracker>,
}

impl GraphAgent {
    pub fn new(
        name: String,
        prompt: String,
        context: AgentContext,
        bundles: Arc<BundleService>,
        runner: Arc<GraphRunner>,
    ) -> Self {
        Self {
            name,
            prompt,
            context,
            bundles,
            runner,
            tracker: None,
        }
    }

    fn inner_graph_name(&self) -> Option<String> {
        self.context
            .extra
            .get("graph_name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| (!self.prompt.is_empty()).then(|| self.prompt.clone()))
    }

    fn map_output(&self, final_state: Value) -> Value {
        let Some(mapping) = self.context.extra.get("output_mapping").and_then(Value::as_object)
        else {
            return final_state;
        };
        let mut mapped = Map::new();
        for (inner_field, outer_field) in mapping {
            if let (Some(value), Some(outer)) =
                (final_state.get(inner_field), outer_field.as_str())
            {
                mapped.insert(outer.to_string(), value.clone());
            }
        }
        Value::Object(mapped)
    }
}

#[async_trait]
impl Agent for GraphAgent {
    fn name(&self) -> &str {
        &self.name
    }
    fn prompt(&self) -> &str {
        &self.prompt
    }
    fn context(&self) -> &AgentContext {
        &self.context
    }

    fn attach_tracker(&mut self, tracker: SharedTracker) {
        self.tracker = Some(tracker);
    }

    async fn run(&self, state: Value) -> AgentOutcome {
        let Some(csv_path) = self.context.extra.get("csv_path").and_then(Value::as_str) else {
            return AgentOutcome::Failed(format!(
                "graph agent '{}' has no csv_path in its context",
                self.name
            ));
        };
        let graph_name = self.inner_graph_name();

        let (bundle, _) = match self
            .bundles
            .get_or_create_bundle(csv_path, graph_name.as_deref())
        {
            Ok(resolved) => resolved,
            Err(e) => {
                return AgentOutcome::Failed(format!(
                    "graph agent '{}' failed to resolve its bundle: {e}",
                    self.name
                ))
            }
        };

        let options = RunOptions {
            initial_state: state,
            is_subgraph: true,
            source_info: SourceInfo::Autocompiled,
        };
        let result = match self.runner.run(&bundle, options).await {
            Ok(result) => result,
            Err(e) => {
                return AgentOutcome::Failed(format!(
                    "subgraph '{}' failed to start: {e}",
                    bundle.graph_name
                ))
            }
        };

        if let Some(tracker) = &self.tracker {
            tracker.lock().record_sub_execution(
                &result.graph_name,
                result.success,
                (result.execution_time * 1000.0) as u64,
            );
        }

        if !result.success {
            warn!(
                subgraph = %result.graph_name,
                error = result.error.as_deref().unwrap_or("unsuccessful"),
                "subgraph execution did not succeed"
            );
            return AgentOutcome::Failed(
                result
                    .error
                    .unwrap_or_else(|| format!("subgraph '{}' did not succeed", result.graph_name)),
            );
        }
        AgentOutcome::Completed(self.map_output(result.final_state))
    }
}
