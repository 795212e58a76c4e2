//! Typed result of a graph execution

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tracker::ExecutionSummary;

/// Where the executed bundle came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceInfo {
    /// Loaded from the bundle registry
    Precompiled,
    /// Compiled from the spec file during this run
    Autocompiled,
    /// Built in memory, never persisted
    Memory,
}

/// Outcome of one graph run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub graph_name: String,
    pub final_state: Value,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    /// Wall-clock duration in seconds
    pub execution_time: f64,
    pub source_info: SourceInfo,
    pub summary: ExecutionSummary,
}

impl ExecutionResult {
    /// A failed result carrying an error message
    pub fn failure(
        graph_name: impl Into<String>,
        error: impl Into<String>,
        execution_time: f64,
        source_info: SourceInfo,
        summary: ExecutionSummary,
    ) -> Self {
        Self {
            graph_name: graph_name.into(),
            final_state: Value::Null,
            success: false,
            error: Some(error.into()),
            execution_time,
            source_info,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_result_has_no_success() {
        let result = ExecutionResult::failure(
            "main",
            "boom",
            0.5,
            SourceInfo::Autocompiled,
            ExecutionSummary::default(),
        );
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert_eq!(result.final_state, Value::Null);
    }
}
