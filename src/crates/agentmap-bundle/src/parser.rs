//! Tabular graph-spec parser
//!
//! Reads the workflow CSV into a [`GraphSpec`]. One row declares one node:
//!
//! ```text
//! GraphName,Node,AgentType,Context,Prompt,Input_Fields,Output_Field,Description,Edge,Success_Next,Failure_Next
//! main,fetch,,,"get the data",query,rows,,transform,,
//! main,transform,summarize,"format:short","summarize {rows}",rows|query,summary,,,store,report
//! ```
//!
//! `Input_Fields` is `|`-delimited. The `Edge` column is an unconditional
//! transition unless it carries the literal `func:` prefix, which names a
//! routing function combined with the `Success_Next`/`Failure_Next` columns.
//! A blank `GraphName` continues the previous row's graph. The `Context`
//! cell accepts a JSON object, a comma-separated `key:value` / `key=value`
//! list, or free text (kept as `{"description": raw}`).
//!
//! The parser is a boundary: the rest of the pipeline depends only on the
//! [`GraphSpec`] shape it produces.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use agentmap_core::{EdgeLabel, GraphSpec, Node};

use crate::error::{BundleError, Result};

/// Prefix marking a function-routed edge in the `Edge` column
pub const FUNC_EDGE_PREFIX: &str = "func:";

#[derive(Debug, Deserialize)]
struct SpecRow {
    #[serde(rename = "GraphName", default)]
    graph_name: String,
    #[serde(rename = "Node", default)]
    node: String,
    #[serde(rename = "AgentType", default)]
    agent_type: String,
    #[serde(rename = "Context", default)]
    context: String,
    #[serde(rename = "Prompt", default)]
    prompt: String,
    #[serde(rename = "Input_Fields", default)]
    input_fields: String,
    #[serde(rename = "Output_Field", default)]
    output_field: String,
    #[serde(rename = "Description", default)]
    description: String,
    #[serde(rename = "Edge", default)]
    edge: String,
    #[serde(rename = "Success_Next", default)]
    success_next: String,
    #[serde(rename = "Failure_Next", default)]
    failure_next: String,
}

/// Parse a spec file into validated graphs
pub fn parse_spec_file(path: impl AsRef<Path>) -> Result<GraphSpec> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(BundleError::NotFound(format!(
            "spec file '{}' does not exist",
            path.display()
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;

    let mut spec = GraphSpec::new();
    let mut current_graph = String::new();

    for (index, row) in reader.deserialize::<SpecRow>().enumerate() {
        let row = row?;
        let line = index + 2; // header is line 1

        if !row.graph_name.is_empty() {
            current_graph = row.graph_name.clone();
        }
        if current_graph.is_empty() {
            return Err(BundleError::InvalidInput(format!(
                "row {line}: node '{}' has no graph name",
                row.node
            )));
        }
        if row.node.is_empty() {
            warn!(line, "skipping spec row without a node name");
            continue;
        }

        spec.push_node(current_graph.clone(), node_from_row(&row));
    }

    if spec.is_empty() {
        return Err(BundleError::InvalidInput(format!(
            "spec file '{}' declares no graphs",
            path.display()
        )));
    }

    spec.validate()?;
    debug!(graphs = spec.len(), path = %path.display(), "parsed spec file");
    Ok(spec)
}

fn node_from_row(row: &SpecRow) -> Node {
    let mut node = Node::new(&row.node);
    node.agent_type = row.agent_type.to_lowercase();
    node.prompt = row.prompt.clone();
    node.description = row.description.clone();
    node.output = row.output_field.clone();
    node.inputs = row
        .input_fields
        .split('|')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(str::to_string)
        .collect();
    node.context = parse_context(&row.context);

    if !row.edge.is_empty() {
        if let Some(function) = row.edge.strip_prefix(FUNC_EDGE_PREFIX) {
            node.add_edge(EdgeLabel::Func, function.trim());
        } else {
            node.add_edge(EdgeLabel::Default, row.edge.clone());
        }
    }
    if !row.success_next.is_empty() {
        node.add_edge(EdgeLabel::Success, row.success_next.clone());
    }
    if !row.failure_next.is_empty() {
        node.add_edge(EdgeLabel::Failure, row.failure_next.clone());
    }
    node
}

/// Parse a context cell into a key/value map
///
/// Accepts a JSON object, a comma-separated `key:value` or `key=value`
/// sequence, or arbitrary text (which becomes the description).
pub fn parse_context(raw: &str) -> HashMap<String, Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return HashMap::new();
    }

    if raw.starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) {
            return map.into_iter().collect();
        }
    }

    let mut map = HashMap::new();
    for pair in raw.split(',') {
        let Some((key, value)) = pair.split_once(':').or_else(|| pair.split_once('=')) else {
            // Not a key/value sequence: keep the whole cell as a description
            return HashMap::from([("description".to_string(), Value::String(raw.to_string()))]);
        };
        map.insert(
            key.trim().to_string(),
            Value::String(value.trim().to_string()),
        );
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "GraphName,Node,AgentType,Context,Prompt,Input_Fields,Output_Field,Description,Edge,Success_Next,Failure_Next\n";

    fn spec_file(rows: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(HEADER.as_bytes()).unwrap();
        file.write_all(rows.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parses_linear_graph() {
        let file = spec_file("main,n1,echo,,say hi,x|y,out,,n2,,\nmain,n2,echo,,,,,,,,\n");
        let spec = parse_spec_file(file.path()).unwrap();

        let nodes = spec.nodes("main").unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].agent_type, "echo");
        assert_eq!(nodes[0].inputs, vec!["x", "y"]);
        assert_eq!(nodes[0].output, "out");
        assert_eq!(nodes[0].edge_target(EdgeLabel::Default), Some("n2"));
    }

    #[test]
    fn test_blank_graph_name_continues_previous() {
        let file = spec_file("main,n1,,,,,,,n2,,\n,n2,,,,,,,,,\n");
        let spec = parse_spec_file(file.path()).unwrap();
        assert_eq!(spec.nodes("main").unwrap().len(), 2);
    }

    #[test]
    fn test_multiple_graphs() {
        let file = spec_file("a,n1,,,,,,,,,\nb,m1,,,,,,,m2,,\nb,m2,,,,,,,,,\n");
        let spec = parse_spec_file(file.path()).unwrap();
        assert_eq!(spec.graph_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(spec.nodes("b").unwrap().len(), 2);
    }

    #[test]
    fn test_func_edge_with_conditional_targets() {
        let file =
            spec_file("main,n1,,,,,,,func:pick_route,n2,n3\nmain,n2,,,,,,,,,\nmain,n3,,,,,,,,,\n");
        let spec = parse_spec_file(file.path()).unwrap();
        let n1 = &spec.nodes("main").unwrap()[0];
        assert_eq!(n1.edge_target(EdgeLabel::Func), Some("pick_route"));
        assert_eq!(n1.edge_target(EdgeLabel::Success), Some("n2"));
        assert_eq!(n1.edge_target(EdgeLabel::Failure), Some("n3"));
    }

    #[test]
    fn test_dangling_edge_is_rejected() {
        let file = spec_file("main,n1,,,,,,,ghost,,\n");
        assert!(parse_spec_file(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = parse_spec_file("/no/such/spec.csv").unwrap_err();
        assert!(matches!(err, BundleError::NotFound(_)));
    }

    #[test]
    fn test_empty_spec_is_invalid() {
        let file = spec_file("");
        assert!(matches!(
            parse_spec_file(file.path()),
            Err(BundleError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_context_json_form() {
        let parsed = parse_context(r#"{"services": ["llm_service"], "k": 1}"#);
        assert_eq!(parsed["services"], json!(["llm_service"]));
        assert_eq!(parsed["k"], json!(1));
    }

    #[test]
    fn test_context_pair_forms() {
        let parsed = parse_context("format:short, retries=3");
        assert_eq!(parsed["format"], json!("short"));
        assert_eq!(parsed["retries"], json!("3"));
    }

    #[test]
    fn test_context_freeform_becomes_description() {
        let parsed = parse_context("summarize the daily report");
        assert_eq!(parsed["description"], json!("summarize the daily report"));
    }
}
