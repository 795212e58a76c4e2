//! Application bootstrap
//!
//! Builds the container that owns every process-wide component: the five
//! registries, the bundle pipeline, the injection engine, the interaction
//! handler and the runner. Nothing here is a module global; everything is
//! passed by construction so tests can build isolated containers.
//!
//! Bootstrap is deliberately forgiving: a component that fails to
//! initialize (unreadable cache, bad custom-agents path) degrades to an
//! empty default with a warning. Strictness belongs to the hot path, not
//! to startup.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use agentmap_core::{AgentBlueprint, PolicyEvaluator, ServiceHandle};
use agentmap_bundle::{BundleRegistry, BundleService};
use agentmap_registry::{
    AgentRegistry, AvailabilityCache, DeclarationRegistry, FeatureRegistry, HostServiceRegistry,
    ServiceDeclaration,
};

use crate::agents::{
    BranchingAgent, DefaultAgent, EchoAgent, FailureAgent, GraphAgent, HumanAgent, InputAgent,
    LlmAgent, OrchestratorAgent, SuccessAgent,
};
use crate::assembly::GraphAssembler;
use crate::config::RuntimeConfig;
use crate::injection::ServiceInjector;
use crate::interaction::InteractionHandler;
use crate::node_registry::NodeRegistryService;
use crate::routing::RoutingFunctionRegistry;
use crate::runner::GraphRunner;
use crate::storage::JsonCollectionStore;

/// Class-path namespace shared by every built-in agent
const BUILTIN_NAMESPACE: &str = "agentmap_runtime::agents";

/// The assembled application: every component, wired
pub struct AgentMapContainer {
    pub config: RuntimeConfig,
    pub availability: Arc<AvailabilityCache>,
    pub features: Arc<FeatureRegistry>,
    pub agents: Arc<AgentRegistry>,
    pub host_services: Arc<HostServiceRegistry>,
    pub declarations: Arc<DeclarationRegistry>,
    pub bundle_registry: Arc<BundleRegistry>,
    pub bundle_service: Arc<BundleService>,
    pub routing: Arc<RoutingFunctionRegistry>,
    pub policy_evaluator: Arc<PolicyEvaluator>,
    pub store: Arc<JsonCollectionStore>,
    pub interactions: Arc<InteractionHandler>,
    pub runner: Arc<GraphRunner>,
}

/// Build and wire the full container from a configuration
pub fn bootstrap(config: RuntimeConfig) -> AgentMapContainer {
    let availability = Arc::new(AvailabilityCache::new(config.availability_cache_path()));
    let features = Arc::new(FeatureRegistry::new(Arc::clone(&availability)));
    let agents = Arc::new(AgentRegistry::new());
    let host_services = Arc::new(HostServiceRegistry::new());
    let declarations = Arc::new(DeclarationRegistry::new());
    let bundle_registry = Arc::new(BundleRegistry::new(config.bundle_registry_path()));
    let routing = Arc::new(RoutingFunctionRegistry::new());
    let policy_evaluator = Arc::new(PolicyEvaluator::new());
    let store = Arc::new(JsonCollectionStore::new(config.collections_dir()));
    let interactions = Arc::new(InteractionHandler::new(Arc::clone(&store)));

    seed_service_declarations(&declarations);

    let bundle_service = Arc::new(BundleService::new(
        Arc::clone(&agents),
        Arc::clone(&declarations),
        Arc::clone(&bundle_registry),
        config.cache_dir.clone(),
        config.max_missing_declarations,
    ));

    let injector = Arc::new(ServiceInjector::new(Arc::clone(&host_services)));
    let assembler = Arc::new(GraphAssembler::new(Arc::clone(&routing)));
    let node_registry = Arc::new(NodeRegistryService::new());

    let runner = Arc::new(GraphRunner::new(
        Arc::clone(&agents),
        injector,
        assembler,
        node_registry,
        Arc::clone(&interactions),
        Arc::clone(&bundle_registry),
        Arc::clone(&policy_evaluator),
        config.execution_policy.resolve(),
    ));

    register_builtin_agents(&agents, &bundle_service, &runner);
    register_availability_gated_agents(&agents, &features);
    if let Some(path) = &config.custom_agents_path {
        scan_custom_agents(path);
    }

    info!(
        agent_types = agents.len(),
        cache_dir = %config.cache_dir.display(),
        "bootstrap complete"
    );

    AgentMapContainer {
        config,
        availability,
        features,
        agents,
        host_services,
        declarations,
        bundle_registry,
        bundle_service,
        routing,
        policy_evaluator,
        store,
        interactions,
        runner,
    }
}

/// Declarations for the services built-ins and host extensions provide
fn seed_service_declarations(declarations: &DeclarationRegistry) {
    declarations.register(ServiceDeclaration::new(
        "config_service",
        "agentmap_runtime::services::ConfigService",
    ));
    declarations.register(
        ServiceDeclaration::new("llm_service", "agentmap_runtime::services::LlmService")
            .with_dependencies(["config_service"])
            .with_implements(["LLMCapable"]),
    );
    declarations.register(
        ServiceDeclaration::new(
            "storage_manager",
            "agentmap_runtime::services::StorageManager",
        )
        .with_dependencies(["config_service"])
        .with_implements(["StorageCapable"]),
    );
    declarations.register(
        ServiceDeclaration::new("csv_service", "agentmap_runtime::services::CsvService")
            .with_dependencies(["storage_manager"])
            .with_implements(["CSVCapable"]),
    );
    declarations.register(
        ServiceDeclaration::new("json_service", "agentmap_runtime::services::JsonService")
            .with_dependencies(["storage_manager"])
            .with_implements(["JSONCapable"]),
    );
    declarations.register(
        ServiceDeclaration::new("file_service", "agentmap_runtime::services::FileService")
            .with_dependencies(["storage_manager"])
            .with_implements(["FileCapable"]),
    );
    declarations.register(
        ServiceDeclaration::new("vector_service", "agentmap_runtime::services::VectorService")
            .with_dependencies(["storage_manager"])
            .with_implements(["VectorCapable"]),
    );
    declarations.register(
        ServiceDeclaration::new("memory_service", "agentmap_runtime::services::MemoryService")
            .with_dependencies(["storage_manager"])
            .with_implements(["MemoryCapable"]),
    );
    declarations.register(
        ServiceDeclaration::new("prompt_manager", "agentmap_runtime::services::PromptManager")
            .with_dependencies(["config_service"])
            .with_implements(["PromptCapable"]),
    );
    declarations.register(
        ServiceDeclaration::new(
            "orchestrator_service",
            "agentmap_runtime::services::OrchestratorService",
        )
        .with_implements(["OrchestrationCapable"]),
    );
    declarations.register(
        ServiceDeclaration::new(
            "blob_storage_service",
            "agentmap_runtime::services::BlobStorageService",
        )
        .with_dependencies(["storage_manager"])
        .with_implements(["BlobStorageCapable"]),
    );
}

fn register_builtin_agents(
    agents: &AgentRegistry,
    bundles: &Arc<BundleService>,
    runner: &Arc<GraphRunner>,
) {
    agents.register(
        "default",
        format!("{BUILTIN_NAMESPACE}::DefaultAgent"),
        Arc::new(|bp: AgentBlueprint| {
            Box::new(DefaultAgent::new(bp.name, bp.prompt, bp.context)) as Box<dyn agentmap_core::Agent>
        }),
    );
    agents.register(
        "echo",
        format!("{BUILTIN_NAMESPACE}::EchoAgent"),
        Arc::new(|bp: AgentBlueprint| {
            Box::new(EchoAgent::new(bp.name, bp.context)) as Box<dyn agentmap_core::Agent>
        }),
    );
    agents.register(
        "branching",
        format!("{BUILTIN_NAMESPACE}::BranchingAgent"),
        Arc::new(|bp: AgentBlueprint| {
            Box::new(BranchingAgent::new(bp.name, bp.context)) as Box<dyn agentmap_core::Agent>
        }),
    );
    agents.register(
        "success",
        format!("{BUILTIN_NAMESPACE}::SuccessAgent"),
        Arc::new(|bp: AgentBlueprint| {
            Box::new(SuccessAgent::new(bp.name, bp.context)) as Box<dyn agentmap_core::Agent>
        }),
    );
    agents.register(
        "failure",
        format!("{BUILTIN_NAMESPACE}::FailureAgent"),
        Arc::new(|bp: AgentBlueprint| {
            Box::new(FailureAgent::new(bp.name, bp.context)) as Box<dyn agentmap_core::Agent>
        }),
    );
    agents.register(
        "input",
        format!("{BUILTIN_NAMESPACE}::InputAgent"),
        Arc::new(|bp: AgentBlueprint| {
            Box::new(InputAgent::new(bp.name, bp.prompt, bp.context))
                as Box<dyn agentmap_core::Agent>
        }),
    );
    agents.register(
        "human",
        format!("{BUILTIN_NAMESPACE}::HumanAgent"),
        Arc::new(|bp: AgentBlueprint| {
            Box::new(HumanAgent::new(bp.name, bp.prompt, bp.context))
                as Box<dyn agentmap_core::Agent>
        }),
    );

    let graph_bundles = Arc::clone(bundles);
    let graph_runner = Arc::clone(runner);
    agents.register(
        "graph",
        format!("{BUILTIN_NAMESPACE}::GraphAgent"),
        Arc::new(move |bp: AgentBlueprint| {
            Box::new(GraphAgent::new(
                bp.name,
                bp.prompt,
                bp.context,
                Arc::clone(&graph_bundles),
                Arc::clone(&graph_runner),
            )) as Box<dyn agentmap_core::Agent>
        }),
    );
}

/// Register the agent types whose dependencies are optional
///
/// The `llm` and `orchestrator` types (plus one alias per validated
/// provider) are registered only when the `llm` feature is enabled and at
/// least one provider validated; they are never part of the unconditional
/// built-in roster. Safe to call again after enabling a feature at
/// runtime.
pub fn register_availability_gated_agents(agents: &AgentRegistry, features: &FeatureRegistry) {
    if !features.is_feature_enabled("llm") {
        debug!("llm feature disabled, skipping availability-gated agent types");
        return;
    }
    let providers = features.get_available_providers("llm");
    if providers.is_empty() {
        debug!("no validated llm provider, skipping availability-gated agent types");
        return;
    }

    agents.register(
        "llm",
        format!("{BUILTIN_NAMESPACE}::LlmAgent"),
        Arc::new(|bp: AgentBlueprint| {
            Box::new(LlmAgent::new(bp.name, bp.prompt, bp.context))
                as Box<dyn agentmap_core::Agent>
        }),
    );
    agents.register(
        "orchestrator",
        format!("{BUILTIN_NAMESPACE}::OrchestratorAgent"),
        Arc::new(|bp: AgentBlueprint| {
            Box::new(OrchestratorAgent::new(bp.name, bp.context))
                as Box<dyn agentmap_core::Agent>
        }),
    );
    for provider in providers {
        debug!(provider = %provider, "registering provider alias for the LLM agent");
        agents.register(
            &provider,
            format!("{BUILTIN_NAMESPACE}::LlmAgent"),
            Arc::new(|bp: AgentBlueprint| {
                Box::new(LlmAgent::new(bp.name, bp.prompt, bp.context))
                    as Box<dyn agentmap_core::Agent>
            }),
        );
    }
}

/// Record agent-type names found under the custom-agents path
///
/// Rust has no dynamic loading; discovered names are logged so unregistered
/// types show up as missing declarations with a useful trail.
fn scan_custom_agents(path: &Path) -> Vec<String> {
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "custom-agents path is unreadable");
            return Vec::new();
        }
    };

    let mut discovered = Vec::new();
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(stem) = Path::new(&file_name).file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        discovered.push(stem.to_lowercase());
    }
    discovered.sort();
    debug!(count = discovered.len(), "scanned custom-agents path");
    discovered
}

/// Register a host-extension service provider if the feature is enabled
pub fn register_host_service(
    container: &AgentMapContainer,
    name: &str,
    provider: ServiceHandle,
    protocols: &[&str],
) -> bool {
    if !container.config.host_extensions_enabled {
        warn!(service = %name, "host extensions are disabled, ignoring registration");
        return false;
    }
    container
        .host_services
        .register_service_provider(name, provider, protocols, HashMap::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> RuntimeConfig {
        RuntimeConfig {
            cache_dir: dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_bootstrap_registers_core_roster() {
        let dir = TempDir::new().unwrap();
        let container = bootstrap(test_config(&dir));

        for agent_type in [
            "default",
            "echo",
            "branching",
            "failure",
            "success",
            "input",
            "graph",
            "human",
        ] {
            assert!(
                container.agents.has_agent(agent_type),
                "missing builtin '{agent_type}'"
            );
        }
        // empty type resolves through "default"
        assert!(container.agents.has_agent(""));

        // provider-backed types are not unconditional built-ins
        assert!(!container.agents.has_agent("llm"));
        assert!(!container.agents.has_agent("orchestrator"));
    }

    #[test]
    fn test_gated_agents_require_a_validated_provider() {
        let dir = TempDir::new().unwrap();
        let container = bootstrap(test_config(&dir));

        // feature enabled but nothing validated: still nothing registered
        container.features.enable_feature("llm");
        register_availability_gated_agents(&container.agents, &container.features);
        assert!(!container.agents.has_agent("llm"));

        container.features.set_providers_validated(
            "llm",
            std::collections::HashMap::from([("openai".to_string(), true)]),
        );
        register_availability_gated_agents(&container.agents, &container.features);
        assert!(container.agents.has_agent("llm"));
        assert!(container.agents.has_agent("orchestrator"));
        assert!(container.agents.has_agent("openai"));
    }

    #[test]
    fn test_bootstrap_seeds_declarations_with_valid_load_order() {
        let dir = TempDir::new().unwrap();
        let container = bootstrap(test_config(&dir));

        let declared: std::collections::BTreeSet<String> =
            container.declarations.declared_services().into_iter().collect();
        assert!(declared.contains("llm_service"));
        assert!(declared.contains("storage_manager"));

        let order = container
            .declarations
            .calculate_load_order(&declared)
            .unwrap();
        let position = |name: &str| order.iter().position(|s| s == name).unwrap();
        assert!(position("config_service") < position("llm_service"));
        assert!(position("storage_manager") < position("csv_service"));
    }

    #[test]
    fn test_host_extension_gate() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.host_extensions_enabled = false;
        let container = bootstrap(config);

        assert!(!register_host_service(
            &container,
            "llm_service",
            ServiceHandle::new("llm_service", ()),
            &["LLMCapable"],
        ));

        let dir2 = TempDir::new().unwrap();
        let mut config = test_config(&dir2);
        config.host_extensions_enabled = true;
        let container = bootstrap(config);
        assert!(register_host_service(
            &container,
            "llm_service",
            ServiceHandle::new("llm_service", ()),
            &["LLMCapable"],
        ));
    }
}
