//! Per-execution tracking
//!
//! One [`ExecutionTracker`] is created per graph run. The runner records each
//! node's outcome in visitation order, which is the sole source of truth for
//! the [`ExecutionSummary`] that the execution policy evaluates. Subgraph
//! runs are recorded on the parent tracker as sub-execution entries.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of one node visit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
    pub node_name: String,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Outcome of a nested graph run recorded on the parent tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubExecution {
    pub graph_name: String,
    pub success: bool,
    pub duration_ms: u64,
}

/// Records node outcomes for a single graph execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTracker {
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub executions: Vec<NodeExecution>,
    #[serde(default)]
    pub sub_executions: Vec<SubExecution>,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            ended_at: None,
            executions: Vec::new(),
            sub_executions: Vec::new(),
        }
    }

    /// Record one node outcome in visitation order
    pub fn record_node(
        &mut self,
        node_name: impl Into<String>,
        success: bool,
        duration_ms: u64,
        error: Option<String>,
    ) {
        self.executions.push(NodeExecution {
            node_name: node_name.into(),
            success,
            duration_ms,
            error,
            started_at: Utc::now(),
        });
    }

    /// Record a nested graph run
    pub fn record_sub_execution(
        &mut self,
        graph_name: impl Into<String>,
        success: bool,
        duration_ms: u64,
    ) {
        self.sub_executions.push(SubExecution {
            graph_name: graph_name.into(),
            success,
            duration_ms,
        });
    }

    /// Mark the execution finished
    pub fn complete(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    /// Wall-clock duration so far, in seconds
    pub fn elapsed_secs(&self) -> f64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn summary(&self) -> ExecutionSummary {
        ExecutionSummary {
            executions: self.executions.clone(),
        }
    }
}

impl Default for ExecutionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracker handle shared between the runner and node executors
pub type SharedTracker = Arc<Mutex<ExecutionTracker>>;

/// Create a fresh shared tracker
pub fn shared_tracker() -> SharedTracker {
    Arc::new(Mutex::new(ExecutionTracker::new()))
}

/// Per-node outcomes in visitation order, consumed by the execution policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub executions: Vec<NodeExecution>,
}

impl ExecutionSummary {
    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    /// True when every executed node succeeded (vacuously true when empty)
    pub fn all_succeeded(&self) -> bool {
        self.executions.iter().all(|e| e.success)
    }

    /// Success of the last executed node; `None` when nothing executed
    pub fn final_succeeded(&self) -> Option<bool> {
        self.executions.last().map(|e| e.success)
    }

    /// Whether the named node executed and succeeded
    pub fn node_succeeded(&self, node_name: &str) -> bool {
        self.executions
            .iter()
            .any(|e| e.node_name == node_name && e.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_preserve_visitation_order() {
        let mut tracker = ExecutionTracker::new();
        tracker.record_node("a", true, 5, None);
        tracker.record_node("b", false, 7, Some("boom".into()));
        tracker.record_node("c", true, 2, None);

        let summary = tracker.summary();
        let names: Vec<&str> = summary
            .executions
            .iter()
            .map(|e| e.node_name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(!summary.all_succeeded());
        assert_eq!(summary.final_succeeded(), Some(true));
        assert!(summary.node_succeeded("a"));
        assert!(!summary.node_succeeded("b"));
    }

    #[test]
    fn test_empty_summary() {
        let summary = ExecutionTracker::new().summary();
        assert!(summary.is_empty());
        assert!(summary.all_succeeded());
        assert_eq!(summary.final_succeeded(), None);
    }

    #[test]
    fn test_tracker_snapshot_roundtrip() {
        let mut tracker = ExecutionTracker::new();
        tracker.record_node("a", true, 1, None);
        tracker.record_sub_execution("inner", true, 10);
        tracker.complete();

        let json = serde_json::to_string(&tracker).unwrap();
        let back: ExecutionTracker = serde_json::from_str(&json).unwrap();
        assert_eq!(back.executions.len(), 1);
        assert_eq!(back.sub_executions.len(), 1);
        assert!(back.ended_at.is_some());
    }
}
