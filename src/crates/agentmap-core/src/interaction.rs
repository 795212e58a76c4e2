//! Human-interaction requests and interruption checkpoints
//!
//! An agent that needs human input does not block: it returns an
//! [`Interruption`](crate::agent::AgentOutcome::Interrupted) carrying a
//! [`HumanInteractionRequest`] and an [`InterruptionCheckpoint`]. The runtime
//! persists both so a later invocation can resume the paused thread with the
//! supplied response. There is no in-place resume; the persisted thread
//! record is the continuation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

use crate::tracker::ExecutionTracker;

/// Kind of human interaction an agent is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    TextInput,
    Choice,
    Approval,
    Custom,
}

/// A request for human input raised by an agent mid-execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanInteractionRequest {
    /// Unique request id
    pub id: Uuid,
    /// Thread this request belongs to
    pub thread_id: String,
    /// Node that raised the request
    pub node_name: String,
    pub interaction_type: InteractionType,
    /// Prompt to surface to the human
    pub prompt: String,
    /// Free-form context for the adapter rendering the prompt
    #[serde(default)]
    pub context: HashMap<String, Value>,
    /// Choices for `Choice`-type interactions
    #[serde(default)]
    pub options: Vec<String>,
    /// Advisory timeout; the core does not enforce it
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl HumanInteractionRequest {
    pub fn new(
        thread_id: impl Into<String>,
        node_name: impl Into<String>,
        interaction_type: InteractionType,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            thread_id: thread_id.into(),
            node_name: node_name.into(),
            interaction_type,
            prompt: prompt.into(),
            context: HashMap::new(),
            options: Vec::new(),
            timeout_seconds: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }
}

/// State captured at the moment of interruption, sufficient to resume
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterruptionCheckpoint {
    /// Input fields the node had extracted when it paused
    #[serde(default)]
    pub inputs: Map<String, Value>,
    /// Agent context snapshot
    #[serde(default)]
    pub agent_context: HashMap<String, Value>,
    /// Tracker snapshot for the paused execution
    #[serde(default)]
    pub execution_tracker: Option<ExecutionTracker>,
    /// Node to resume from
    pub node_name: String,
}

/// The typed interruption an agent raises to pause execution
#[derive(Debug, Clone)]
pub struct Interruption {
    pub thread_id: String,
    pub request: HumanInteractionRequest,
    pub checkpoint: InterruptionCheckpoint,
}

impl Interruption {
    pub fn new(
        thread_id: impl Into<String>,
        request: HumanInteractionRequest,
        checkpoint: InterruptionCheckpoint,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            request,
            checkpoint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_unique() {
        let a = HumanInteractionRequest::new("t-1", "n1", InteractionType::TextInput, "?");
        let b = HumanInteractionRequest::new("t-1", "n1", InteractionType::TextInput, "?");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_request_roundtrips_through_json() {
        let req = HumanInteractionRequest::new("t-1", "n2", InteractionType::Choice, "pick one")
            .with_options(vec!["a".into(), "b".into()])
            .with_timeout(30);
        let json = serde_json::to_string(&req).unwrap();
        let back: HumanInteractionRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, req.id);
        assert_eq!(back.options, vec!["a", "b"]);
        assert_eq!(back.timeout_seconds, Some(30));
        assert_eq!(back.interaction_type, InteractionType::Choice);
    }
}
