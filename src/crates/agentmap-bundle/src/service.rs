//! Bundle service
//!
//! Orchestrates the bundle pipeline: hash the spec file, check the registry
//! for an existing bundle, otherwise parse, analyze, persist and register.
//! Bundles land at `bundles/<csv_hash>/<graph_name>.json` under the cache
//! directory; the registry is only updated after the bundle file is safely
//! on disk, so a failed write never leaves a dangling index entry.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use agentmap_core::Node;
use agentmap_registry::{AgentRegistry, DeclarationRegistry};

use crate::analyzer::MetadataAnalyzer;
use crate::bundle::{GraphBundle, BUNDLE_FORMAT, FRAMEWORK_VERSION};
use crate::error::{BundleError, Result};
use crate::hash::hash_file;
use crate::parser::parse_spec_file;
use crate::registry::BundleRegistry;

/// Builds, persists and reuses graph bundles
pub struct BundleService {
    agents: Arc<AgentRegistry>,
    declarations: Arc<DeclarationRegistry>,
    registry: Arc<BundleRegistry>,
    cache_dir: PathBuf,
    /// Bundle creation fails when more agent types than this are unknown
    max_missing_declarations: usize,
}

impl BundleService {
    pub fn new(
        agents: Arc<AgentRegistry>,
        declarations: Arc<DeclarationRegistry>,
        registry: Arc<BundleRegistry>,
        cache_dir: impl Into<PathBuf>,
        max_missing_declarations: usize,
    ) -> Self {
        Self {
            agents,
            declarations,
            registry,
            cache_dir: cache_dir.into(),
            max_missing_declarations,
        }
    }

    /// Return the cached bundle for `(spec, graph)` or create and cache one
    ///
    /// The second element is `true` when the bundle was created by this call.
    pub fn get_or_create_bundle(
        &self,
        csv_path: impl AsRef<Path>,
        graph_name: Option<&str>,
    ) -> Result<(GraphBundle, bool)> {
        let csv_path = csv_path.as_ref();
        let csv_hash = hash_file(csv_path)?;

        if let Some(bundle_path) = self.registry.find_bundle(&csv_hash, graph_name) {
            match GraphBundle::load(&bundle_path) {
                Ok(bundle) => {
                    debug!(
                        csv_hash = %csv_hash,
                        graph = %bundle.graph_name,
                        "reusing registered bundle"
                    );
                    return Ok((bundle, false));
                }
                Err(e) => {
                    warn!(
                        path = %bundle_path.display(),
                        error = %e,
                        "registered bundle failed to load, recreating"
                    );
                }
            }
        }

        let bundle = self.create_bundle(csv_path, &csv_hash, graph_name)?;
        Ok((bundle, true))
    }

    fn create_bundle(
        &self,
        csv_path: &Path,
        csv_hash: &str,
        graph_name: Option<&str>,
    ) -> Result<GraphBundle> {
        let spec = parse_spec_file(csv_path)?;
        let (target_name, nodes) = select_graph(&spec, graph_name)?;

        let bundle = self.build_bundle(&target_name, nodes, csv_hash)?;

        let bundle_path = self.bundle_path(csv_hash, &target_name);
        bundle.save(&bundle_path)?;
        self.registry.register(
            csv_hash,
            &target_name,
            &bundle_path,
            csv_path,
            Some(bundle.node_count() as u64),
        )?;

        info!(
            graph = %target_name,
            csv_hash = %csv_hash,
            nodes = bundle.node_count(),
            "created bundle"
        );
        Ok(bundle)
    }

    /// Analyze nodes into a bundle without touching disk
    pub fn build_bundle(
        &self,
        graph_name: &str,
        nodes: &[Node],
        csv_hash: &str,
    ) -> Result<GraphBundle> {
        let analyzer = MetadataAnalyzer::new(&self.agents, &self.declarations);
        let analysis = analyzer.analyze(graph_name, nodes)?;

        if analysis.missing_declarations.len() > self.max_missing_declarations {
            return Err(BundleError::InvalidInput(format!(
                "graph '{graph_name}' references unknown agent types: {:?}",
                analysis.missing_declarations
            )));
        }

        let node_map: BTreeMap<String, Node> = nodes
            .iter()
            .map(|node| (node.name.clone(), node.clone()))
            .collect();

        Ok(GraphBundle {
            graph_name: graph_name.to_string(),
            entry_point: analysis.entry_point,
            nodes: node_map,
            required_agents: analysis.required_agents,
            required_services: analysis.required_services,
            service_load_order: analysis.service_load_order,
            agent_mappings: analysis.agent_mappings,
            builtin_agents: analysis.builtin_agents,
            custom_agents: analysis.custom_agents,
            protocol_mappings: analysis.protocol_mappings,
            graph_structure: analysis.graph_structure,
            validation_metadata: analysis.validation_metadata,
            missing_declarations: analysis.missing_declarations,
            csv_hash: csv_hash.to_string(),
            version_hash: version_hash(csv_hash, graph_name),
            bundle_format: BUNDLE_FORMAT,
            created_at: Utc::now(),
        })
    }

    /// Deterministic bundle path for `(csv_hash, graph_name)`
    pub fn bundle_path(&self, csv_hash: &str, graph_name: &str) -> PathBuf {
        self.cache_dir
            .join("bundles")
            .join(csv_hash)
            .join(format!("{graph_name}.json"))
    }

    pub fn registry(&self) -> &BundleRegistry {
        &self.registry
    }
}

/// Requested graph, sole graph, or first declared with a warning
fn select_graph<'a>(
    spec: &'a agentmap_core::GraphSpec,
    graph_name: Option<&str>,
) -> Result<(String, &'a [Node])> {
    match graph_name {
        Some(name) => {
            let nodes = spec.nodes(name).ok_or_else(|| {
                BundleError::NotFound(format!("graph '{name}' is not declared in the spec"))
            })?;
            Ok((name.to_string(), nodes))
        }
        None => {
            let (name, nodes) = spec
                .first()
                .ok_or_else(|| BundleError::InvalidInput("spec declares no graphs".into()))?;
            if spec.len() > 1 {
                warn!(
                    graph = %name,
                    total = spec.len(),
                    "spec declares multiple graphs, using the first"
                );
            }
            Ok((name.to_string(), nodes))
        }
    }
}

fn version_hash(csv_hash: &str, graph_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(csv_hash.as_bytes());
    hasher.update(b":");
    hasher.update(graph_name.as_bytes());
    hasher.update(b":");
    hasher.update(FRAMEWORK_VERSION.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmap_core::{Agent, AgentBlueprint, AgentContext, AgentOutcome};
    use agentmap_registry::AgentFactory;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::io::Write;
    use tempfile::TempDir;

    struct StubAgent {
        name: String,
        context: AgentContext,
    }

    #[async_trait]
    impl Agent for StubAgent {
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

    fn stub_factory() -> AgentFactory {
        Arc::new(|bp: AgentBlueprint| {
            Box::new(StubAgent {
                name: bp.name,
                context: bp.context,
            }) as Box<dyn Agent>
        })
    }

    fn service_in(dir: &TempDir) -> BundleService {
        let agents = Arc::new(AgentRegistry::new());
        agents.register(
            "default",
            "agentmap_runtime::agents::DefaultAgent",
            stub_factory(),
        );
        agents.register(
            "echo",
            "agentmap_runtime::agents::EchoAgent",
            stub_factory(),
        );
        let declarations = Arc::new(DeclarationRegistry::new());
        let registry = Arc::new(BundleRegistry::new(
            dir.path().join("graph_registry.json"),
        ));
        BundleService::new(agents, declarations, registry, dir.path(), 0)
    }

    const HEADER: &str = "GraphName,Node,AgentType,Context,Prompt,Input_Fields,Output_Field,Description,Edge,Success_Next,Failure_Next\n";

    fn spec_file(dir: &TempDir, rows: &str) -> PathBuf {
        let path = dir.path().join("workflow.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(HEADER.as_bytes()).unwrap();
        file.write_all(rows.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_create_then_reuse() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir);
        let spec = spec_file(&dir, "main,n1,echo,,,,,,n2,,\nmain,n2,echo,,,,,,,,\n");

        let (first, created) = service.get_or_create_bundle(&spec, Some("main")).unwrap();
        assert!(created);
        assert_eq!(first.entry_point, "n1");
        assert_eq!(first.graph_structure.node_count, 2);
        assert_eq!(first.graph_structure.edge_count, 1);
        assert!(!first.graph_structure.has_conditional_routing);

        let (second, created) = service.get_or_create_bundle(&spec, Some("main")).unwrap();
        assert!(!created);
        assert_eq!(second.graph_name, first.graph_name);
        assert_eq!(second.entry_point, first.entry_point);
        assert_eq!(
            second.nodes.keys().collect::<Vec<_>>(),
            first.nodes.keys().collect::<Vec<_>>()
        );
        assert_eq!(second.required_agents, first.required_agents);
        assert_eq!(second.csv_hash, first.csv_hash);
    }

    #[test]
    fn test_reuse_does_not_bump_access_count() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir);
        let spec = spec_file(&dir, "main,n1,echo,,,,,,,,\n");

        let (bundle, _) = service.get_or_create_bundle(&spec, Some("main")).unwrap();
        let before = service
            .registry()
            .get_entry_info(&bundle.csv_hash, "main")
            .unwrap();
        service.get_or_create_bundle(&spec, Some("main")).unwrap();
        let after = service
            .registry()
            .get_entry_info(&bundle.csv_hash, "main")
            .unwrap();
        assert_eq!(before.access_count, after.access_count);
    }

    #[test]
    fn test_graph_selection_by_name() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir);
        let spec = spec_file(
            &dir,
            "a,a1,echo,,,,,,,,\nb,b1,echo,,,,,,b2,,\nb,b2,echo,,,,,,,,\n",
        );

        let (bundle, _) = service.get_or_create_bundle(&spec, Some("b")).unwrap();
        assert_eq!(bundle.graph_name, "b");
        assert_eq!(bundle.entry_point, "b1");
        assert_eq!(bundle.nodes.len(), 2);
    }

    #[test]
    fn test_unknown_graph_is_not_found() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir);
        let spec = spec_file(&dir, "a,a1,echo,,,,,,,,\n");
        assert!(matches!(
            service.get_or_create_bundle(&spec, Some("ghost")),
            Err(BundleError::NotFound(_))
        ));
    }

    #[test]
    fn test_missing_declarations_beyond_tolerance_fail() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir);
        let spec = spec_file(&dir, "main,n1,mystery_agent,,,,,,,,\n");
        assert!(matches!(
            service.get_or_create_bundle(&spec, Some("main")),
            Err(BundleError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_bundle_path_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir);
        let hash = "ab".repeat(32);
        let path = service.bundle_path(&hash, "main");
        assert!(path.ends_with(format!("bundles/{hash}/main.json")));
    }
}
