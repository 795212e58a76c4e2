//! Graph assembly and the compiled state machine
//!
//! The assembler turns a bundle's nodes plus their instantiated agents into
//! an executable [`AssembledGraph`]:
//!
//! 1. Orchestration-capable agents receive the node-registry catalog before
//!    their node is added (recorded in the injection stats)
//! 2. Each node's edges translate into machine edges:
//!    - `default: t` → an unconditional edge
//!    - `success: ts` / `failure: tf` → a conditional edge routing on the
//!      `last_action_success` state flag
//!    - `func: f` with `success`/`failure` → a conditional edge calling the
//!      named routing function with `(state, success_target, failure_target)`
//! 3. The entry node is the bundle's `entry_point`, falling back to the
//!    first node with a warning
//!
//! Assembly is pure with respect to external state: compiling the same
//! bundle twice yields behaviorally equivalent machines. The machine itself
//! executes nodes sequentially from the entry node, merging each agent's
//! state update and following at most one edge per step, until no edge
//! produces a target or the step cap trips.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use agentmap_core::{
    last_action_success, merge_state, Agent, AgentOutcome, EdgeLabel, Interruption,
    NodeRegistryMap, SharedTracker, LAST_ACTION_SUCCESS,
};
use agentmap_bundle::GraphBundle;

use crate::error::{Result, RuntimeError};
use crate::routing::RoutingFunctionRegistry;

/// Upper bound on node visits per execution, guarding cyclic graphs
const MAX_STEPS: usize = 1000;

/// Router reading state and choosing the next node, or ending the run
type EdgeRouter = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

enum CompiledEdge {
    Direct(String),
    Conditional(EdgeRouter),
}

/// Node-registry injection counts from one assembly pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InjectionStats {
    pub total_nodes: usize,
    pub orchestrators_found: usize,
    pub orchestrators_injected: usize,
}

/// How the compiled machine finished
#[derive(Debug)]
pub enum MachineOutcome {
    /// Ran to completion with this final state
    Completed(Value),
    /// An agent paused for human input
    Interrupted(Interruption),
}

struct MachineNode {
    agent: Arc<dyn Agent>,
    edges: Vec<CompiledEdge>,
}

/// Executable state machine for one graph
pub struct AssembledGraph {
    graph_name: String,
    entry: String,
    nodes: HashMap<String, MachineNode>,
}

impl AssembledGraph {
    pub fn graph_name(&self) -> &str {
        &self.graph_name
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Execute from the entry node, recording every visit on the tracker
    pub async fn invoke(&self, initial_state: Value, tracker: &SharedTracker) -> Result<MachineOutcome> {
        let mut state = if initial_state.is_null() {
            json!({})
        } else {
            initial_state
        };
        let mut current = self.entry.clone();
        let mut steps = 0;

        loop {
            steps += 1;
            if steps > MAX_STEPS {
                return Err(RuntimeError::Execution(format!(
                    "graph '{}' exceeded {MAX_STEPS} steps, aborting",
                    self.graph_name
                )));
            }

            let node = self.nodes.get(&current).ok_or_else(|| {
                RuntimeError::Execution(format!(
                    "graph '{}' routed to unknown node '{current}'",
                    self.graph_name
                ))
            })?;

            let started = Instant::now();
            let outcome = node.agent.run(state.clone()).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                AgentOutcome::Completed(update) => {
                    tracker.lock().record_node(&current, true, duration_ms, None);
                    let update_sets_flag = update.get(LAST_ACTION_SUCCESS).is_some();
                    state = merge_state(state, update);
                    if !update_sets_flag {
                        if let Some(obj) = state.as_object_mut() {
                            obj.insert(LAST_ACTION_SUCCESS.to_string(), json!(true));
                        }
                    }
                }
                AgentOutcome::Failed(message) => {
                    tracker
                        .lock()
                        .record_node(&current, false, duration_ms, Some(message.clone()));
                    debug!(node = %current, error = %message, "node failed, routing on failure");
                    if let Some(obj) = state.as_object_mut() {
                        obj.insert(LAST_ACTION_SUCCESS.to_string(), json!(false));
                    }
                }
                AgentOutcome::Interrupted(interruption) => {
                    tracker.lock().record_node(&current, true, duration_ms, None);
                    return Ok(MachineOutcome::Interrupted(interruption));
                }
            }

            match self.next_node(node, &state) {
                Some(next) => current = next,
                None => return Ok(MachineOutcome::Completed(state)),
            }
        }
    }

    fn next_node(&self, node: &MachineNode, state: &Value) -> Option<String> {
        for edge in &node.edges {
            match edge {
                CompiledEdge::Direct(target) => return Some(target.clone()),
                CompiledEdge::Conditional(router) => {
                    if let Some(target) = router(state) {
                        return Some(target);
                    }
                    return None;
                }
            }
        }
        None
    }
}

/// Builds executable machines from bundles and agent instances
pub struct GraphAssembler {
    routing: Arc<RoutingFunctionRegistry>,
}

/// Machine plus the injection stats gathered while building it
pub struct AssemblyOutput {
    pub machine: AssembledGraph,
    pub stats: InjectionStats,
}

impl std::fmt::Debug for AssemblyOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssemblyOutput")
            .field("machine", &self.machine.graph_name)
            .field("stats", &self.stats)
            .finish()
    }
}

impl GraphAssembler {
    pub fn new(routing: Arc<RoutingFunctionRegistry>) -> Self {
        Self { routing }
    }

    /// Assemble a machine from a bundle and one agent instance per node
    pub fn assemble(
        &self,
        bundle: &GraphBundle,
        mut agents: HashMap<String, Box<dyn Agent>>,
        node_registry: Option<&NodeRegistryMap>,
    ) -> Result<AssemblyOutput> {
        if bundle.nodes.is_empty() {
            return Err(RuntimeError::InvalidInput(format!(
                "graph '{}' has no nodes to assemble",
                bundle.graph_name
            )));
        }

        let mut stats = InjectionStats {
            total_nodes: bundle.nodes.len(),
            ..Default::default()
        };
        let mut nodes = HashMap::with_capacity(bundle.nodes.len());

        for (name, node) in &bundle.nodes {
            let mut agent = agents.remove(name).ok_or_else(|| {
                RuntimeError::InvalidInput(format!(
                    "no agent instance supplied for node '{name}' in graph '{}'",
                    bundle.graph_name
                ))
            })?;

            if let Some(orchestrator) = agent.as_orchestration_capable() {
                stats.orchestrators_found += 1;
                if let Some(registry) = node_registry {
                    orchestrator.set_node_registry(registry.clone());
                    stats.orchestrators_injected += 1;
                }
            }

            let edges = self.compile_edges(node)?;
            nodes.insert(
                name.clone(),
                MachineNode {
                    agent: Arc::from(agent),
                    edges,
                },
            );
        }

        let entry = if !bundle.entry_point.is_empty() && nodes.contains_key(&bundle.entry_point) {
            bundle.entry_point.clone()
        } else if let Some(marked) = bundle.nodes.values().find(|node| node.is_entry_point) {
            marked.name.clone()
        } else {
            let fallback = bundle
                .nodes
                .keys()
                .next()
                .expect("non-empty graph has a first node")
                .clone();
            warn!(
                graph = %bundle.graph_name,
                entry = %fallback,
                "bundle entry point is unset or unknown, using first node"
            );
            fallback
        };

        debug!(
            graph = %bundle.graph_name,
            nodes = nodes.len(),
            entry = %entry,
            "assembled graph"
        );
        Ok(AssemblyOutput {
            machine: AssembledGraph {
                graph_name: bundle.graph_name.clone(),
                entry,
                nodes,
            },
            stats,
        })
    }

    fn compile_edges(&self, node: &agentmap_core::Node) -> Result<Vec<CompiledEdge>> {
        let mut edges = Vec::new();
        let success_target = node.edge_target(EdgeLabel::Success).map(str::to_string);
        let failure_target = node.edge_target(EdgeLabel::Failure).map(str::to_string);

        if let Some(function_name) = node.edge_target(EdgeLabel::Func) {
            let function = self.routing.resolve(function_name).ok_or_else(|| {
                RuntimeError::NotFound(format!(
                    "routing function '{function_name}' referenced by node '{}' is not registered",
                    node.name
                ))
            })?;
            let success = success_target.clone();
            let failure = failure_target.clone();
            edges.push(CompiledEdge::Conditional(Arc::new(move |state| {
                function(state, success.as_deref(), failure.as_deref())
            })));
        } else if success_target.is_some() || failure_target.is_some() {
            let success = success_target;
            let failure = failure_target;
            edges.push(CompiledEdge::Conditional(Arc::new(move |state| {
                match last_action_success(state) {
                    Some(true) => success.clone(),
                    Some(false) => failure.clone(),
                    None => None,
                }
            })));
        }

        if let Some(target) = node.edge_target(EdgeLabel::Default) {
            edges.push(CompiledEdge::Direct(target.to_string()));
        }
        Ok(edges)
    }
}
