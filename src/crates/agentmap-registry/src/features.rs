//! Feature and dependency registry
//!
//! Tracks which optional capability families (`llm`, `storage`) are enabled
//! and which providers inside each family have been validated. Provider
//! validation is delegated to registered validator callbacks; results are
//! cached through the [`AvailabilityCache`] under `dependency.<category>`
//! so repeated checks cost one cache read.

use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::availability::AvailabilityCache;

/// Validates that a provider's dependencies are importable
///
/// Returns `Ok(())` when the provider is usable, or `Err(missing_module)`
/// naming what could not be loaded.
pub type ProviderValidator = Arc<dyn Fn(&str) -> std::result::Result<(), String> + Send + Sync>;

/// Registry of enabled features and validated providers
pub struct FeatureRegistry {
    cache: Arc<AvailabilityCache>,
    enabled: RwLock<HashSet<String>>,
    validated: RwLock<HashMap<String, HashMap<String, bool>>>,
    validators: RwLock<HashMap<String, ProviderValidator>>,
}

impl FeatureRegistry {
    pub fn new(cache: Arc<AvailabilityCache>) -> Self {
        Self {
            cache,
            enabled: RwLock::new(HashSet::new()),
            validated: RwLock::new(HashMap::new()),
            validators: RwLock::new(HashMap::new()),
        }
    }

    /// Register the validator used for every provider in a category
    pub fn register_validator(&self, category: impl Into<String>, validator: ProviderValidator) {
        self.validators.write().insert(category.into(), validator);
    }

    pub fn enable_feature(&self, name: impl Into<String>) {
        let name = name.into();
        debug!(feature = %name, "feature enabled");
        self.enabled.write().insert(name);
    }

    pub fn is_feature_enabled(&self, name: &str) -> bool {
        self.enabled.read().contains(name)
    }

    /// Record validation results for a batch of providers
    pub fn set_providers_validated(&self, category: &str, results: HashMap<String, bool>) {
        let mut validated = self.validated.write();
        let entry = validated.entry(category.to_string()).or_default();
        for (provider, available) in results {
            entry.insert(provider, available);
        }
    }

    /// Whether a provider is usable, consulting the cache and falling back
    /// to the category's validator on a miss
    pub fn is_provider_available(&self, category: &str, provider: &str) -> bool {
        if let Some(&known) = self
            .validated
            .read()
            .get(category)
            .and_then(|providers| providers.get(provider))
        {
            return known;
        }

        let cache_category = format!("dependency.{category}");
        if let Some(cached) = self.cache.get_availability(&cache_category, provider) {
            let available = cached
                .get("available")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            self.remember(category, provider, available);
            return available;
        }

        let verdict = self.run_validator(category, provider);
        let entry = match &verdict {
            Ok(()) => json!({
                "available": true,
                "validated_at": chrono::Utc::now().to_rfc3339(),
            }),
            Err(missing) => json!({
                "available": false,
                "missing": [missing],
                "validated_at": chrono::Utc::now().to_rfc3339(),
            }),
        };
        if let Err(e) = self.cache.set_availability(&cache_category, provider, entry) {
            warn!(category, provider, error = %e, "failed to cache provider validation");
        }

        let available = verdict.is_ok();
        self.remember(category, provider, available);
        available
    }

    fn run_validator(&self, category: &str, provider: &str) -> std::result::Result<(), String> {
        let validator = self.validators.read().get(category).cloned();
        match validator {
            Some(validator) => validator(provider),
            None => Err(format!("no validator registered for category '{category}'")),
        }
    }

    fn remember(&self, category: &str, provider: &str, available: bool) {
        self.validated
            .write()
            .entry(category.to_string())
            .or_default()
            .insert(provider.to_string(), available);
    }

    /// Providers validated as available in a category, sorted
    pub fn get_available_providers(&self, category: &str) -> Vec<String> {
        let validated = self.validated.read();
        let mut providers: Vec<String> = validated
            .get(category)
            .map(|providers| {
                providers
                    .iter()
                    .filter(|(_, available)| **available)
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default();
        providers.sort();
        providers
    }

    /// Missing dependency modules per category, from cached failure entries
    pub fn get_missing_dependencies(&self, category: Option<&str>) -> HashMap<String, Vec<String>> {
        let categories: Vec<String> = match category {
            Some(category) => vec![category.to_string()],
            None => {
                let validated = self.validated.read();
                validated.keys().cloned().collect()
            }
        };

        let mut missing = HashMap::new();
        for category in categories {
            let cache_category = format!("dependency.{category}");
            let mut modules: Vec<String> = Vec::new();
            for provider in self.cache.category_keys(&cache_category) {
                if let Some(entry) = self.cache.get_availability(&cache_category, &provider) {
                    if let Some(entries) = entry.get("missing").and_then(Value::as_array) {
                        modules.extend(
                            entries
                                .iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string),
                        );
                    }
                }
            }
            modules.sort();
            modules.dedup();
            if !modules.is_empty() {
                missing.insert(category, modules);
            }
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> FeatureRegistry {
        let cache = Arc::new(AvailabilityCache::new(
            dir.path().join("availability_cache.json"),
        ));
        FeatureRegistry::new(cache)
    }

    #[test]
    fn test_feature_enablement() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        assert!(!registry.is_feature_enabled("llm"));
        registry.enable_feature("llm");
        assert!(registry.is_feature_enabled("llm"));
    }

    #[test]
    fn test_validator_runs_once_per_provider() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_validator = Arc::clone(&calls);
        registry.register_validator(
            "llm",
            Arc::new(move |provider| {
                calls_in_validator.fetch_add(1, Ordering::SeqCst);
                if provider == "openai" {
                    Ok(())
                } else {
                    Err(format!("{provider}_client"))
                }
            }),
        );

        assert!(registry.is_provider_available("llm", "openai"));
        assert!(registry.is_provider_available("llm", "openai"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(!registry.is_provider_available("llm", "fakellm"));
        assert!(!registry.is_provider_available("llm", "fakellm"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failure_results_are_cached_with_missing_modules() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        registry.register_validator("storage", Arc::new(|_| Err("vector_db".to_string())));

        assert!(!registry.is_provider_available("storage", "chroma"));
        let missing = registry.get_missing_dependencies(Some("storage"));
        assert_eq!(missing["storage"], vec!["vector_db"]);
    }

    #[test]
    fn test_batch_validation_and_listing() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        registry.set_providers_validated(
            "llm",
            HashMap::from([
                ("openai".to_string(), true),
                ("anthropic".to_string(), true),
                ("broken".to_string(), false),
            ]),
        );
        assert_eq!(
            registry.get_available_providers("llm"),
            vec!["anthropic", "openai"]
        );
    }

    #[test]
    fn test_no_validator_means_unavailable() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        assert!(!registry.is_provider_available("llm", "openai"));
    }
}
