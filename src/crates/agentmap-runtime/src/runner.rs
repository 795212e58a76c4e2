//! Graph runner
//!
//! Drives one bundle through a full execution: instantiate an agent per
//! node from the agent registry, inject services, assemble the state
//! machine, invoke it, and fold the tracker's per-node outcomes through the
//! execution policy into a typed [`ExecutionResult`].
//!
//! Instantiation and injection are strict: the first missing agent type or
//! unavailable provider aborts the run with an error. Failures *during*
//! graph invocation instead produce a failed result carrying the error
//! message. A raised interruption is neither: it is persisted through the
//! interaction handler and the result simply carries no success flag.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use agentmap_core::{
    shared_tracker, Agent, AgentBlueprint, AgentContext, ExecutionPolicy, ExecutionResult,
    PolicyEvaluator, SourceInfo,
};
use agentmap_bundle::{BundleRegistry, GraphBundle};
use agentmap_registry::AgentRegistry;

use crate::assembly::{GraphAssembler, MachineOutcome};
use crate::error::{Result, RuntimeError};
use crate::injection::ServiceInjector;
use crate::interaction::{BundleInfo, InteractionHandler};
use crate::node_registry::NodeRegistryService;

/// Per-run options
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub initial_state: Value,
    /// Set when this run is a nested graph execution
    pub is_subgraph: bool,
    pub source_info: SourceInfo,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            initial_state: Value::Null,
            is_subgraph: false,
            source_info: SourceInfo::Precompiled,
        }
    }
}

/// Executes bundles end to end
pub struct GraphRunner {
    agents: Arc<AgentRegistry>,
    injector: Arc<ServiceInjector>,
    assembler: Arc<GraphAssembler>,
    node_registry: Arc<NodeRegistryService>,
    interactions: Arc<InteractionHandler>,
    bundle_registry: Arc<BundleRegistry>,
    policy_evaluator: Arc<PolicyEvaluator>,
    policy: ExecutionPolicy,
}

impl GraphRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agents: Arc<AgentRegistry>,
        injector: Arc<ServiceInjector>,
        assembler: Arc<GraphAssembler>,
        node_registry: Arc<NodeRegistryService>,
        interactions: Arc<InteractionHandler>,
        bundle_registry: Arc<BundleRegistry>,
        policy_evaluator: Arc<PolicyEvaluator>,
        policy: ExecutionPolicy,
    ) -> Self {
        Self {
            agents,
            injector,
            assembler,
            node_registry,
            interactions,
            bundle_registry,
            policy_evaluator,
            policy,
        }
    }

    /// Execute a bundle and return the typed result
    pub async fn run(&self, bundle: &GraphBundle, options: RunOptions) -> Result<ExecutionResult> {
        info!(
            graph = %bundle.graph_name,
            nodes = bundle.nodes.len(),
            subgraph = options.is_subgraph,
            "starting graph execution"
        );
        let tracker = shared_tracker();

        let agents = self.instantiate_agents(bundle, &tracker)?;
        let registry_map = self.node_registry.prepare_for_assembly(bundle, None);
        let output = self
            .assembler
            .assemble(bundle, agents, Some(&registry_map))?;
        self.node_registry
            .verify_pre_compilation_injection(&output.stats);

        let invocation = output
            .machine
            .invoke(options.initial_state.clone(), &tracker)
            .await;

        tracker.lock().complete();
        let (execution_time, summary) = {
            let tracker = tracker.lock();
            (tracker.elapsed_secs(), tracker.summary())
        };

        match invocation {
            Ok(MachineOutcome::Completed(final_state)) => {
                let success = self.policy_evaluator.evaluate(&self.policy, &summary);
                debug!(graph = %bundle.graph_name, success, "graph execution finished");
                Ok(ExecutionResult {
                    graph_name: bundle.graph_name.clone(),
                    final_state,
                    success,
                    error: None,
                    execution_time,
                    source_info: options.source_info,
                    summary,
                })
            }
            Ok(MachineOutcome::Interrupted(interruption)) => {
                self.interactions.handle_interruption(
                    &interruption,
                    &bundle.graph_name,
                    self.bundle_info_for(bundle),
                )?;
                Ok(ExecutionResult {
                    graph_name: bundle.graph_name.clone(),
                    final_state: Value::Null,
                    success: false,
                    error: None,
                    execution_time,
                    source_info: options.source_info,
                    summary,
                })
            }
            Err(e) => {
                debug!(graph = %bundle.graph_name, error = %e, "graph execution failed");
                Ok(ExecutionResult::failure(
                    bundle.graph_name.clone(),
                    e.to_string(),
                    execution_time,
                    options.source_info,
                    summary,
                ))
            }
        }
    }

    /// Construct, track and inject one agent per node
    fn instantiate_agents(
        &self,
        bundle: &GraphBundle,
        tracker: &agentmap_core::SharedTracker,
    ) -> Result<HashMap<String, Box<dyn Agent>>> {
        let mut agents: HashMap<String, Box<dyn Agent>> =
            HashMap::with_capacity(bundle.nodes.len());

        for (name, node) in &bundle.nodes {
            let registration = self.agents.get(&node.agent_type).ok_or_else(|| {
                RuntimeError::NotFound(format!(
                    "agent type '{}' for node '{name}' is not registered",
                    if node.agent_type.is_empty() {
                        "default"
                    } else {
                        &node.agent_type
                    }
                ))
            })?;

            let context = AgentContext {
                input_fields: node.inputs.clone(),
                output_field: (!node.output.is_empty()).then(|| node.output.clone()),
                description: (!node.description.is_empty()).then(|| node.description.clone()),
                instance_id: Uuid::new_v4().to_string(),
                extra: node.context.clone(),
            };
            let mut agent =
                (registration.factory)(AgentBlueprint::new(name.clone(), node.prompt.clone(), context));

            if agent.name().is_empty() {
                return Err(RuntimeError::InvalidInput(format!(
                    "agent constructed for node '{name}' has an empty name"
                )));
            }

            agent.attach_tracker(tracker.clone());
            self.injector.configure_all_services(agent.as_mut())?;
            agents.insert(name.clone(), agent);
        }
        Ok(agents)
    }

    fn bundle_info_for(&self, bundle: &GraphBundle) -> BundleInfo {
        match self
            .bundle_registry
            .get_entry_info(&bundle.csv_hash, &bundle.graph_name)
        {
            Some(entry) => BundleInfo {
                csv_hash: bundle.csv_hash.clone(),
                bundle_path: entry.bundle_path,
                csv_path: entry.csv_path,
            },
            None => BundleInfo {
                csv_hash: bundle.csv_hash.clone(),
                ..Default::default()
            },
        }
    }

    pub fn interactions(&self) -> &InteractionHandler {
        &self.interactions
    }
}
