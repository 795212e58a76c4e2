//! The graph bundle artifact
//!
//! A [`GraphBundle`] is the cached, fully-resolved execution plan for one
//! graph: its nodes, entry point, required agent types and services, service
//! load order, protocol mappings, structure metrics and integrity metadata.
//! Bundles serialize to JSON with every set as a sorted array, so equal
//! inputs produce byte-equal bundles.
//!
//! The persisted document wraps the bundle fields under a `format` marker:
//!
//! ```text
//! { "format": "metadata", "bundle_format": 2, "graph_name": …, … }
//! ```
//!
//! Loading tolerates older `bundle_format` revisions by defaulting absent
//! fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;
use tracing::debug;

use agentmap_core::Node;

use crate::error::{BundleError, Result};

/// Current bundle format revision
pub const BUNDLE_FORMAT: u32 = 2;

/// Marker for the metadata bundle document shape
pub const BUNDLE_DOCUMENT_FORMAT: &str = "metadata";

/// Schema compatibility version recorded in validation metadata
pub const COMPATIBILITY_VERSION: &str = "1.0";

/// Framework version stamped into bundles
pub const FRAMEWORK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Structure metrics computed over a graph's nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStructure {
    pub node_count: usize,
    pub edge_count: usize,
    pub has_conditional_routing: bool,
    /// Capped at 10
    pub max_depth: usize,
    pub is_dag: bool,
    /// Reserved: anti-chain sets of nodes that could run in parallel
    #[serde(default)]
    pub parallel_opportunities: Vec<BTreeSet<String>>,
}

/// Integrity metadata for a bundle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetadata {
    /// Short per-node content hashes
    #[serde(default)]
    pub node_hashes: BTreeMap<String, String>,
    #[serde(default)]
    pub compatibility_version: String,
    #[serde(default)]
    pub framework_version: String,
    #[serde(default)]
    pub validation_rules: Vec<String>,
}

/// Cached, resolved execution plan for one graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphBundle {
    pub graph_name: String,
    pub entry_point: String,
    pub nodes: BTreeMap<String, Node>,
    pub required_agents: BTreeSet<String>,
    /// Including transitive dependencies
    pub required_services: BTreeSet<String>,
    pub service_load_order: Vec<String>,
    /// Agent type to fully-qualified class reference
    pub agent_mappings: BTreeMap<String, String>,
    pub builtin_agents: BTreeSet<String>,
    pub custom_agents: BTreeSet<String>,
    /// Capability protocol name to provider-service name
    pub protocol_mappings: BTreeMap<String, String>,
    pub graph_structure: GraphStructure,
    pub validation_metadata: ValidationMetadata,
    /// Agent types referenced by the spec but unknown to the registries
    #[serde(default)]
    pub missing_declarations: BTreeSet<String>,
    pub csv_hash: String,
    #[serde(default)]
    pub version_hash: String,
    #[serde(default = "default_bundle_format")]
    pub bundle_format: u32,
    pub created_at: DateTime<Utc>,
}

fn default_bundle_format() -> u32 {
    1
}

impl GraphBundle {
    /// Node count, for registry bookkeeping
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Serialize into the persisted document shape
    pub fn to_document(&self) -> Result<Value> {
        let mut document = serde_json::to_value(self)?;
        document
            .as_object_mut()
            .expect("bundle serializes to an object")
            .insert(
                "format".to_string(),
                Value::String(BUNDLE_DOCUMENT_FORMAT.to_string()),
            );
        Ok(document)
    }

    /// Deserialize from the persisted document shape
    pub fn from_document(document: Value) -> Result<Self> {
        if let Some(format) = document.get("format").and_then(Value::as_str) {
            if format != BUNDLE_DOCUMENT_FORMAT {
                return Err(BundleError::InvalidInput(format!(
                    "unsupported bundle document format '{format}'"
                )));
            }
        }
        let bundle: GraphBundle = serde_json::from_value(document)?;
        Ok(bundle)
    }

    /// Write the bundle atomically to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.to_document()?)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .map_err(|e| BundleError::Storage(format!("atomic bundle write failed: {e}")))?;
        debug!(path = %path.display(), graph = %self.graph_name, "saved bundle");
        Ok(())
    }

    /// Load a bundle from `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BundleError::NotFound(format!("bundle file '{}' does not exist", path.display()))
            } else {
                BundleError::Io(e)
            }
        })?;
        let document: Value = serde_json::from_slice(&bytes)?;
        Self::from_document(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmap_core::EdgeLabel;
    use tempfile::TempDir;

    fn sample_bundle() -> GraphBundle {
        let mut n1 = Node::new("n1");
        n1.add_edge(EdgeLabel::Default, "n2");
        let n2 = Node::new("n2");

        GraphBundle {
            graph_name: "main".into(),
            entry_point: "n1".into(),
            nodes: BTreeMap::from([("n1".into(), n1), ("n2".into(), n2)]),
            required_agents: BTreeSet::from(["default".to_string()]),
            required_services: BTreeSet::from(["logging_service".to_string()]),
            service_load_order: vec!["logging_service".into()],
            agent_mappings: BTreeMap::from([(
                "default".to_string(),
                "agentmap_runtime::agents::DefaultAgent".to_string(),
            )]),
            builtin_agents: BTreeSet::from(["default".to_string()]),
            custom_agents: BTreeSet::new(),
            protocol_mappings: BTreeMap::new(),
            graph_structure: GraphStructure {
                node_count: 2,
                edge_count: 1,
                has_conditional_routing: false,
                max_depth: 2,
                is_dag: true,
                parallel_opportunities: Vec::new(),
            },
            validation_metadata: ValidationMetadata {
                compatibility_version: COMPATIBILITY_VERSION.into(),
                framework_version: FRAMEWORK_VERSION.into(),
                ..Default::default()
            },
            missing_declarations: BTreeSet::new(),
            csv_hash: "ab".repeat(32),
            version_hash: "cd".repeat(32),
            bundle_format: BUNDLE_FORMAT,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bundles").join("main.json");
        let bundle = sample_bundle();
        bundle.save(&path).unwrap();

        let loaded = GraphBundle::load(&path).unwrap();
        assert_eq!(loaded.graph_name, "main");
        assert_eq!(loaded.entry_point, "n1");
        assert_eq!(
            loaded.nodes.keys().collect::<Vec<_>>(),
            bundle.nodes.keys().collect::<Vec<_>>()
        );
        assert_eq!(loaded.required_agents, bundle.required_agents);
        assert_eq!(loaded.graph_structure, bundle.graph_structure);
    }

    #[test]
    fn test_document_carries_format_marker() {
        let document = sample_bundle().to_document().unwrap();
        assert_eq!(document["format"], "metadata");
        assert_eq!(document["bundle_format"], BUNDLE_FORMAT);
    }

    #[test]
    fn test_unknown_document_format_is_rejected() {
        let mut document = sample_bundle().to_document().unwrap();
        document["format"] = Value::String("pickle".into());
        assert!(GraphBundle::from_document(document).is_err());
    }

    #[test]
    fn test_old_format_defaults_absent_fields() {
        let mut document = sample_bundle().to_document().unwrap();
        let obj = document.as_object_mut().unwrap();
        obj.remove("bundle_format");
        obj.remove("version_hash");
        obj.remove("missing_declarations");

        let bundle = GraphBundle::from_document(document).unwrap();
        assert_eq!(bundle.bundle_format, 1);
        assert_eq!(bundle.version_hash, "");
        assert!(bundle.missing_declarations.is_empty());
    }

    #[test]
    fn test_sets_serialize_sorted() {
        let mut bundle = sample_bundle();
        bundle.required_agents =
            BTreeSet::from(["zeta".to_string(), "alpha".to_string(), "mid".to_string()]);
        let document = bundle.to_document().unwrap();
        let agents: Vec<&str> = document["required_agents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(agents, vec!["alpha", "mid", "zeta"]);
    }
}
