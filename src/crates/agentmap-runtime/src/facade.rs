//! Runtime façade
//!
//! The thin boundary every adapter (CLI, HTTP, serverless) talks through.
//! Operations return a uniform `{success, outputs, metadata}` shape and a
//! single error mapping applies regardless of adapter: a missing file is
//! `GraphNotFound`, malformed specs or inputs are `InvalidInputs`,
//! everything else is a generic runtime failure.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

use agentmap_core::SourceInfo;
use agentmap_bundle::{parse_spec_file, BundleError, MetadataAnalyzer};

use crate::bootstrap::AgentMapContainer;
use crate::error::RuntimeError;
use crate::runner::RunOptions;

/// Adapter-facing error taxonomy
#[derive(Error, Debug)]
pub enum FacadeError {
    #[error("graph not found: {0}")]
    GraphNotFound(String),

    #[error("invalid inputs: {0}")]
    InvalidInputs(String),

    #[error("runtime failure: {0}")]
    Internal(String),
}

/// Uniform operation result
#[derive(Debug, Clone)]
pub struct FacadeResult {
    pub success: bool,
    pub outputs: Value,
    pub metadata: HashMap<String, Value>,
}

/// Validation report for one workflow file
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The runtime façade over a bootstrapped container
pub struct AgentMapFacade {
    container: AgentMapContainer,
}

impl AgentMapFacade {
    pub fn new(container: AgentMapContainer) -> Self {
        Self { container }
    }

    pub fn container(&self) -> &AgentMapContainer {
        &self.container
    }

    /// Resolve a workflow name to its spec file path
    ///
    /// Accepts a direct path to a `.csv` file or a bare name under the
    /// configured workflows directory.
    fn resolve_workflow_path(&self, name: &str) -> PathBuf {
        let direct = PathBuf::from(name);
        if direct.extension().map(|e| e == "csv").unwrap_or(false) {
            return direct;
        }
        self.container
            .config
            .workflows_dir
            .join(format!("{name}.csv"))
    }

    /// Execute a workflow's target graph with the given inputs
    pub async fn run_workflow(
        &self,
        name: &str,
        graph_name: Option<&str>,
        inputs: Value,
    ) -> Result<FacadeResult, FacadeError> {
        let path = self.resolve_workflow_path(name);
        let (bundle, created) = self
            .container
            .bundle_service
            .get_or_create_bundle(&path, graph_name)
            .map_err(map_bundle_error)?;

        let options = RunOptions {
            initial_state: inputs,
            is_subgraph: false,
            source_info: if created {
                SourceInfo::Autocompiled
            } else {
                SourceInfo::Precompiled
            },
        };
        let result = self
            .container
            .runner
            .run(&bundle, options)
            .await
            .map_err(map_runtime_error)?;

        let mut metadata = HashMap::new();
        metadata.insert("graph_name".to_string(), json!(result.graph_name));
        metadata.insert("execution_time".to_string(), json!(result.execution_time));
        metadata.insert("source_info".to_string(), json!(result.source_info));
        metadata.insert(
            "nodes_executed".to_string(),
            json!(result.summary.executions.len()),
        );
        if let Some(error) = &result.error {
            metadata.insert("error".to_string(), json!(error));
        }

        Ok(FacadeResult {
            success: result.success,
            outputs: result.final_state,
            metadata,
        })
    }

    /// Graph names declared by a workflow spec
    pub fn list_graphs(&self, name: &str) -> Result<Vec<String>, FacadeError> {
        let path = self.resolve_workflow_path(name);
        let spec = parse_spec_file(&path).map_err(map_bundle_error)?;
        Ok(spec.graph_names().map(str::to_string).collect())
    }

    /// Validate a workflow without executing it
    pub fn validate_workflow(&self, name: &str) -> Result<ValidationReport, FacadeError> {
        let path = self.resolve_workflow_path(name);
        let mut report = ValidationReport::default();

        let spec = match parse_spec_file(&path) {
            Ok(spec) => spec,
            Err(BundleError::NotFound(message)) => {
                return Err(FacadeError::GraphNotFound(message))
            }
            Err(e) => {
                report.errors.push(e.to_string());
                return Ok(report);
            }
        };

        let analyzer = MetadataAnalyzer::new(
            &self.container.agents,
            &self.container.declarations,
        );
        for graph_name in spec.graph_names().map(str::to_string).collect::<Vec<_>>() {
            let nodes = spec.nodes(&graph_name).unwrap_or_default();
            match analyzer.analyze(&graph_name, nodes) {
                Ok(analysis) => {
                    for missing in &analysis.missing_declarations {
                        report.warnings.push(format!(
                            "graph '{graph_name}' references unknown agent type '{missing}'"
                        ));
                    }
                }
                Err(e) => report
                    .errors
                    .push(format!("graph '{graph_name}': {e}")),
            }
        }
        Ok(report)
    }

    /// Environment report: features, registries, cache totals
    pub fn diagnose_system(&self) -> Value {
        let registry_metadata = self.container.bundle_registry.metadata();
        json!({
            "agent_types": self.container.agents.list_agent_types(),
            "declared_services": self.container.declarations.declared_services(),
            "host_services": self.container.host_services.get_registry_summary(),
            "bundle_registry": {
                "total_entries": registry_metadata.total_entries,
                "total_bundle_size": registry_metadata.total_bundle_size,
            },
            "availability_cache_entries": self.container.availability.entry_count(),
            "llm_providers": self.container.features.get_available_providers("llm"),
            "storage_providers": self.container.features.get_available_providers("storage"),
        })
    }

    /// Drop every cached availability answer
    pub fn refresh_cache(&self) -> Result<(), FacadeError> {
        self.container
            .availability
            .invalidate(None, None)
            .map_err(|e| FacadeError::Internal(e.to_string()))
    }

    /// Cache health, optionally with entry statistics
    pub fn validate_cache(&self, stats: bool) -> Value {
        let mut report = json!({
            "environment_hash": self.container.availability.environment_hash(),
        });
        if stats {
            report["entry_count"] = json!(self.container.availability.entry_count());
            report["bundle_entries"] = json!(self.container.bundle_registry.entry_count());
        }
        debug!("validated caches");
        report
    }
}

fn map_bundle_error(error: BundleError) -> FacadeError {
    match error {
        BundleError::NotFound(message) => FacadeError::GraphNotFound(message),
        BundleError::InvalidInput(message) | BundleError::Core(agentmap_core::CoreError::InvalidInput(message)) => {
            FacadeError::InvalidInputs(message)
        }
        BundleError::Parse(e) => FacadeError::InvalidInputs(e.to_string()),
        other => FacadeError::Internal(other.to_string()),
    }
}

fn map_runtime_error(error: RuntimeError) -> FacadeError {
    match error {
        RuntimeError::NotFound(message) => FacadeError::GraphNotFound(message),
        RuntimeError::InvalidInput(message) => FacadeError::InvalidInputs(message),
        RuntimeError::Bundle(e) => map_bundle_error(e),
        other => FacadeError::Internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::bootstrap;
    use crate::config::RuntimeConfig;
    use std::io::Write;
    use tempfile::TempDir;

    const HEADER: &str = "GraphName,Node,AgentType,Context,Prompt,Input_Fields,Output_Field,Description,Edge,Success_Next,Failure_Next\n";

    fn facade_with_workflow(dir: &TempDir, rows: &str) -> AgentMapFacade {
        let workflows = dir.path().join("workflows");
        std::fs::create_dir_all(&workflows).unwrap();
        let mut file = std::fs::File::create(workflows.join("flow.csv")).unwrap();
        file.write_all(HEADER.as_bytes()).unwrap();
        file.write_all(rows.as_bytes()).unwrap();

        let config = RuntimeConfig {
            cache_dir: dir.path().join("cache"),
            workflows_dir: workflows,
            ..Default::default()
        };
        AgentMapFacade::new(bootstrap(config))
    }

    #[tokio::test]
    async fn test_run_workflow_returns_outputs_and_metadata() {
        let dir = TempDir::new().unwrap();
        let facade = facade_with_workflow(
            &dir,
            "main,n1,echo,,,x,out,,n2,,\nmain,n2,default,,done,,status,,,,\n",
        );

        let result = facade
            .run_workflow("flow", Some("main"), json!({"x": 7}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.outputs["out"], 7);
        assert_eq!(result.outputs["status"], "done");
        assert_eq!(result.metadata["graph_name"], "main");
        assert_eq!(result.metadata["nodes_executed"], 2);
    }

    #[tokio::test]
    async fn test_missing_workflow_maps_to_graph_not_found() {
        let dir = TempDir::new().unwrap();
        let facade = facade_with_workflow(&dir, "main,n1,echo,,,,,,,,\n");
        let err = facade
            .run_workflow("ghost", None, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, FacadeError::GraphNotFound(_)));
    }

    #[test]
    fn test_list_graphs() {
        let dir = TempDir::new().unwrap();
        let facade = facade_with_workflow(&dir, "a,n1,echo,,,,,,,,\nb,m1,echo,,,,,,,,\n");
        assert_eq!(facade.list_graphs("flow").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_validate_workflow_flags_unknown_agent_types() {
        let dir = TempDir::new().unwrap();
        let facade = facade_with_workflow(&dir, "main,n1,no_such_agent,,,,,,,,\n");
        let report = facade.validate_workflow("flow").unwrap();
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("no_such_agent"));
    }

    #[test]
    fn test_diagnose_and_cache_operations() {
        let dir = TempDir::new().unwrap();
        let facade = facade_with_workflow(&dir, "main,n1,echo,,,,,,,,\n");

        let diagnosis = facade.diagnose_system();
        assert!(diagnosis["agent_types"]
            .as_array()
            .unwrap()
            .iter()
            .any(|t| t == "default"));

        facade.refresh_cache().unwrap();
        let report = facade.validate_cache(true);
        assert_eq!(report["entry_count"], 0);
    }
}
