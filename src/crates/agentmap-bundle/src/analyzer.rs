//! Graph metadata analyzer
//!
//! Derives everything a [`GraphBundle`](crate::bundle::GraphBundle) records
//! beyond the raw nodes: the entry point, required agent types, required
//! services with their transitive dependencies and load order, the
//! builtin/custom agent partition, protocol mappings, structure metrics and
//! per-node integrity hashes.
//!
//! Service requirements come from two places: capability interfaces the
//! node's agent class implements (probed through the agent registry and
//! mapped to services via the declaration registry) and an explicit
//! `services` list in the node context. A name only counts as a real
//! service when the declaration registry knows it; everything else is
//! dropped with a debug log.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use agentmap_core::{implemented_capabilities, AgentBlueprint, Node};
use agentmap_registry::{AgentRegistry, DeclarationRegistry};

use crate::bundle::{GraphStructure, ValidationMetadata, COMPATIBILITY_VERSION, FRAMEWORK_VERSION};
use crate::error::Result;
use crate::hash::short_node_hash;

/// Class-path prefix identifying built-in agents
pub const BUILTIN_AGENT_NAMESPACE: &str = "agentmap_runtime::agents";

/// Maximum depth recorded in structure metrics
const MAX_DEPTH_CAP: usize = 10;

/// Everything the analyzer derives for one graph
#[derive(Debug)]
pub struct GraphAnalysis {
    pub entry_point: String,
    pub required_agents: BTreeSet<String>,
    pub required_services: BTreeSet<String>,
    pub service_load_order: Vec<String>,
    pub agent_mappings: BTreeMap<String, String>,
    pub builtin_agents: BTreeSet<String>,
    pub custom_agents: BTreeSet<String>,
    pub protocol_mappings: BTreeMap<String, String>,
    pub missing_declarations: BTreeSet<String>,
    pub graph_structure: GraphStructure,
    pub validation_metadata: ValidationMetadata,
}

/// Analyzes node lists against the agent and declaration registries
pub struct MetadataAnalyzer<'a> {
    agents: &'a AgentRegistry,
    declarations: &'a DeclarationRegistry,
}

impl<'a> MetadataAnalyzer<'a> {
    pub fn new(agents: &'a AgentRegistry, declarations: &'a DeclarationRegistry) -> Self {
        Self {
            agents,
            declarations,
        }
    }

    /// Run every sub-analysis over a graph's nodes
    pub fn analyze(&self, graph_name: &str, nodes: &[Node]) -> Result<GraphAnalysis> {
        let entry_point = self.identify_entry_point(graph_name, nodes);
        let required_agents = collect_agent_types(nodes);

        let mut missing_declarations = BTreeSet::new();
        let mut agent_mappings = BTreeMap::new();
        let mut builtin_agents = BTreeSet::new();
        let mut custom_agents = BTreeSet::new();
        for agent_type in &required_agents {
            match self.agents.get_class_path(agent_type) {
                Some(class_path) => {
                    if class_path.starts_with(BUILTIN_AGENT_NAMESPACE) {
                        builtin_agents.insert(agent_type.clone());
                    } else {
                        custom_agents.insert(agent_type.clone());
                    }
                    agent_mappings.insert(agent_type.clone(), class_path);
                }
                None => {
                    missing_declarations.insert(agent_type.clone());
                }
            }
        }

        let candidate_services = self.collect_candidate_services(nodes, &required_agents);
        let filtered = self.filter_actual_services(candidate_services);
        let closure = self.declarations.resolve_service_dependencies(&filtered)?;
        let required_services = self.filter_actual_services(closure);
        let service_load_order = self.declarations.calculate_load_order(&required_services)?;

        let protocol_mappings: BTreeMap<String, String> = self
            .declarations
            .get_protocol_implementations()
            .into_iter()
            .collect();

        Ok(GraphAnalysis {
            entry_point,
            required_agents,
            required_services,
            service_load_order,
            agent_mappings,
            builtin_agents,
            custom_agents,
            protocol_mappings,
            missing_declarations,
            graph_structure: analyze_graph_structure(nodes),
            validation_metadata: generate_validation_metadata(nodes),
        })
    }

    /// The node no edge points at; ambiguity resolves to declaration order
    fn identify_entry_point(&self, graph_name: &str, nodes: &[Node]) -> String {
        let referenced: BTreeSet<&str> = nodes
            .iter()
            .flat_map(Node::target_nodes)
            .filter(|target| !target.is_empty())
            .collect();

        let mut candidates = nodes
            .iter()
            .filter(|node| !referenced.contains(node.name.as_str()));
        let first_candidate = candidates.next();
        let extra = candidates.count();

        match first_candidate {
            Some(node) if extra == 0 => {
                debug!(graph = %graph_name, entry = %node.name, "identified entry point");
                node.name.clone()
            }
            Some(node) => {
                warn!(
                    graph = %graph_name,
                    entry = %node.name,
                    candidates = extra + 1,
                    "multiple entry point candidates, using first declared"
                );
                node.name.clone()
            }
            None => {
                let fallback = nodes[0].name.clone();
                warn!(
                    graph = %graph_name,
                    entry = %fallback,
                    "no unreferenced node found, using first declared"
                );
                fallback
            }
        }
    }

    /// Services implied by agent capabilities plus explicit context lists
    fn collect_candidate_services(
        &self,
        nodes: &[Node],
        agent_types: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        let protocol_implementations = self.declarations.get_protocol_implementations();
        let mut services = BTreeSet::new();

        for agent_type in agent_types {
            let Some(registration) = self.agents.get(agent_type) else {
                continue;
            };
            let mut probe = (registration.factory)(AgentBlueprint::default());
            for capability in implemented_capabilities(probe.as_mut()) {
                if let Some(service) = protocol_implementations.get(capability.protocol_name()) {
                    services.insert(service.clone());
                }
            }
        }

        for node in nodes {
            if let Some(declared) = node.context.get("services").and_then(Value::as_array) {
                services.extend(
                    declared
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string),
                );
            }
        }
        services
    }

    /// Keep only names the declaration registry recognizes
    fn filter_actual_services(&self, candidates: BTreeSet<String>) -> BTreeSet<String> {
        candidates
            .into_iter()
            .filter(|name| {
                let declared = self.declarations.get_service_declaration(name).is_some();
                if !declared {
                    debug!(service = %name, "dropping undeclared service candidate");
                }
                declared
            })
            .collect()
    }
}

fn collect_agent_types(nodes: &[Node]) -> BTreeSet<String> {
    nodes
        .iter()
        .map(|node| {
            if node.agent_type.is_empty() {
                "default".to_string()
            } else {
                node.agent_type.to_lowercase()
            }
        })
        .collect()
}

fn analyze_graph_structure(nodes: &[Node]) -> GraphStructure {
    GraphStructure {
        node_count: nodes.len(),
        edge_count: nodes.iter().map(Node::edge_count).sum(),
        has_conditional_routing: nodes.iter().any(Node::has_conditional_routing),
        max_depth: nodes.len().min(MAX_DEPTH_CAP),
        // Conservative until real cycle detection is warranted
        is_dag: true,
        parallel_opportunities: Vec::new(),
    }
}

fn generate_validation_metadata(nodes: &[Node]) -> ValidationMetadata {
    let node_hashes = nodes
        .iter()
        .map(|node| {
            (
                node.name.clone(),
                short_node_hash(&node.name, &node.agent_type, node.edge_count()),
            )
        })
        .collect();

    ValidationMetadata {
        node_hashes,
        compatibility_version: COMPATIBILITY_VERSION.to_string(),
        framework_version: FRAMEWORK_VERSION.to_string(),
        validation_rules: vec![
            "unique_node_names".to_string(),
            "valid_edge_targets".to_string(),
            "required_fields_present".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmap_core::{
        Agent, AgentContext, AgentOutcome, EdgeLabel, LlmCapable, Result as CoreResult,
        ServiceHandle,
    };
    use agentmap_registry::{AgentFactory, ServiceDeclaration};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct PlainAgent {
        name: String,
        context: AgentContext,
    }

    #[async_trait]
    impl Agent for PlainAgent {
        fn name(&self) -> &str {
            &self.name
        }
        fn context(&self) -> &AgentContext {
            &self.context
        }
        async fn run(&self, state: Value) -> AgentOutcome {
            AgentOutcome::Completed(state)
        }
    }

    struct LlmAgent {
        name: String,
        context: AgentContext,
    }

    impl LlmCapable for LlmAgent {
        fn configure_llm_service(&mut self, _service: ServiceHandle) -> CoreResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Agent for LlmAgent {
        fn name(&self) -> &str {
            &self.name
        }
        fn context(&self) -> &AgentContext {
            &self.context
        }
        async fn run(&self, state: Value) -> AgentOutcome {
            AgentOutcome::Completed(state)
        }
        fn as_llm_capable(&mut self) -> Option<&mut dyn LlmCapable> {
            Some(self)
        }
    }

    fn plain_factory() -> AgentFactory {
        Arc::new(|bp: AgentBlueprint| {
            Box::new(PlainAgent {
                name: bp.name,
                context: bp.context,
            }) as Box<dyn Agent>
        })
    }

    fn llm_factory() -> AgentFactory {
        Arc::new(|bp: AgentBlueprint| {
            Box::new(LlmAgent {
                name: bp.name,
                context: bp.context,
            }) as Box<dyn Agent>
        })
    }

    fn registries() -> (AgentRegistry, DeclarationRegistry) {
        let agents = AgentRegistry::new();
        agents.register(
            "default",
            "agentmap_runtime::agents::DefaultAgent",
            plain_factory(),
        );
        agents.register("summarize", "my_crate::agents::Summarize", llm_factory());

        let declarations = DeclarationRegistry::new();
        declarations.register(
            ServiceDeclaration::new("llm_service", "svc::Llm")
                .with_dependencies(["config_service"])
                .with_implements(["LLMCapable"]),
        );
        declarations.register(ServiceDeclaration::new("config_service", "svc::Config"));
        (agents, declarations)
    }

    fn linear_nodes() -> Vec<Node> {
        let mut n1 = Node::new("n1");
        n1.agent_type = "summarize".into();
        n1.add_edge(EdgeLabel::Default, "n2");
        let n2 = Node::new("n2");
        vec![n1, n2]
    }

    #[test]
    fn test_entry_point_single_unreferenced_node() {
        let (agents, declarations) = registries();
        let analyzer = MetadataAnalyzer::new(&agents, &declarations);
        let analysis = analyzer.analyze("main", &linear_nodes()).unwrap();
        assert_eq!(analysis.entry_point, "n1");
    }

    #[test]
    fn test_entry_point_cycle_falls_back_to_first_declared() {
        let (agents, declarations) = registries();
        let analyzer = MetadataAnalyzer::new(&agents, &declarations);

        let mut a = Node::new("a");
        a.add_edge(EdgeLabel::Success, "b");
        let mut b = Node::new("b");
        b.add_edge(EdgeLabel::Success, "a");
        let analysis = analyzer.analyze("loop", &[a, b]).unwrap();
        assert_eq!(analysis.entry_point, "a");
    }

    #[test]
    fn test_capability_driven_service_requirements() {
        let (agents, declarations) = registries();
        let analyzer = MetadataAnalyzer::new(&agents, &declarations);
        let analysis = analyzer.analyze("main", &linear_nodes()).unwrap();

        // LLMCapable on the summarize agent pulls llm_service, whose
        // declaration pulls config_service transitively
        assert!(analysis.required_services.contains("llm_service"));
        assert!(analysis.required_services.contains("config_service"));
        assert_eq!(
            analysis.service_load_order,
            vec!["config_service", "llm_service"]
        );
    }

    #[test]
    fn test_context_services_filtered_by_declarations() {
        let (agents, declarations) = registries();
        let analyzer = MetadataAnalyzer::new(&agents, &declarations);

        let mut node = Node::new("n1");
        node.context.insert(
            "services".into(),
            serde_json::json!(["config_service", "imaginary_service"]),
        );
        let analysis = analyzer.analyze("main", &[node]).unwrap();

        assert!(analysis.required_services.contains("config_service"));
        assert!(!analysis.required_services.contains("imaginary_service"));
    }

    #[test]
    fn test_agent_classification_and_mappings() {
        let (agents, declarations) = registries();
        let analyzer = MetadataAnalyzer::new(&agents, &declarations);
        let mut nodes = linear_nodes();
        nodes[1].agent_type = String::new(); // resolves to default

        let analysis = analyzer.analyze("main", &nodes).unwrap();
        assert!(analysis.builtin_agents.contains("default"));
        assert!(analysis.custom_agents.contains("summarize"));
        assert_eq!(
            analysis.agent_mappings["summarize"],
            "my_crate::agents::Summarize"
        );
        // builtin ∪ custom covers everything that resolved
        let union: BTreeSet<_> = analysis
            .builtin_agents
            .union(&analysis.custom_agents)
            .cloned()
            .collect();
        assert_eq!(union, analysis.required_agents);
    }

    #[test]
    fn test_missing_declarations_recorded() {
        let (agents, declarations) = registries();
        let analyzer = MetadataAnalyzer::new(&agents, &declarations);

        let mut node = Node::new("n1");
        node.agent_type = "unregistered_type".into();
        let analysis = analyzer.analyze("main", &[node]).unwrap();
        assert!(analysis
            .missing_declarations
            .contains("unregistered_type"));
    }

    #[test]
    fn test_structure_metrics() {
        let (agents, declarations) = registries();
        let analyzer = MetadataAnalyzer::new(&agents, &declarations);

        let mut n1 = Node::new("n1");
        n1.add_edge(EdgeLabel::Success, "n2");
        n1.add_edge(EdgeLabel::Failure, "n3");
        let n2 = Node::new("n2");
        let n3 = Node::new("n3");
        let analysis = analyzer.analyze("main", &[n1, n2, n3]).unwrap();

        let structure = analysis.graph_structure;
        assert_eq!(structure.node_count, 3);
        assert_eq!(structure.edge_count, 2);
        assert!(structure.has_conditional_routing);
        assert_eq!(structure.max_depth, 3);
        assert!(structure.is_dag);
        assert!(structure.parallel_opportunities.is_empty());
    }

    #[test]
    fn test_validation_metadata_per_node_hashes() {
        let (agents, declarations) = registries();
        let analyzer = MetadataAnalyzer::new(&agents, &declarations);
        let analysis = analyzer.analyze("main", &linear_nodes()).unwrap();

        let metadata = analysis.validation_metadata;
        assert_eq!(metadata.node_hashes.len(), 2);
        assert_eq!(metadata.node_hashes["n1"].len(), 8);
        assert_eq!(metadata.compatibility_version, COMPATIBILITY_VERSION);
        assert_eq!(metadata.validation_rules.len(), 3);
    }
}
