//! Routing-function registry
//!
//! `func:` edges in a spec name a routing function. The registry maps those
//! names to callables registered at bootstrap; the assembler resolves the
//! name when it builds the conditional edge. A routing function receives
//! the current state plus the node's success and failure targets and
//! returns the next node, or `None` to end the run.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// `(state, success_target, failure_target) → next node`
pub type RoutingFn =
    Arc<dyn Fn(&Value, Option<&str>, Option<&str>) -> Option<String> + Send + Sync>;

/// Name → routing-function table
#[derive(Default)]
pub struct RoutingFunctionRegistry {
    functions: RwLock<HashMap<String, RoutingFn>>,
}

impl RoutingFunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a routing function; later registrations win
    pub fn register(&self, name: impl Into<String>, function: RoutingFn) {
        self.functions.write().insert(name.into(), function);
    }

    pub fn resolve(&self, name: &str) -> Option<RoutingFn> {
        self.functions.read().get(name).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_and_resolve() {
        let registry = RoutingFunctionRegistry::new();
        registry.register(
            "pick_by_score",
            Arc::new(|state, success, failure| {
                let score = state.get("score").and_then(Value::as_f64).unwrap_or(0.0);
                if score > 0.5 {
                    success.map(str::to_string)
                } else {
                    failure.map(str::to_string)
                }
            }),
        );

        let function = registry.resolve("pick_by_score").unwrap();
        assert_eq!(
            function(&json!({"score": 0.9}), Some("win"), Some("lose")),
            Some("win".to_string())
        );
        assert_eq!(
            function(&json!({"score": 0.1}), Some("win"), Some("lose")),
            Some("lose".to_string())
        );
        assert!(registry.resolve("missing").is_none());
    }
}
