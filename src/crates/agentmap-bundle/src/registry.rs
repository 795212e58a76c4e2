//! Persistent bundle registry
//!
//! Index of persisted bundles keyed by `(csv_hash, graph_name)`, backed by a
//! single JSON file under the cache directory:
//!
//! ```text
//! { "version": 2,
//!   "entries": { "<csv_hash>": { "<graph_name>": { "bundle_path": …, … } } },
//!   "metadata": { "last_modified": …, "total_entries": …, "total_bundle_size": … } }
//! ```
//!
//! All mutations run under one process-level lock and persist atomically
//! (temp file + rename). Lookups never mutate the registry. Older registry
//! files that stored flat `{csv_hash: entry}` records are migrated in
//! memory on load; the file is only rewritten in the nested form on the
//! next write.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{BundleError, Result};
use crate::hash::is_valid_hash;

/// Current registry file version
pub const REGISTRY_VERSION: u32 = 2;

/// One registered bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub bundle_path: PathBuf,
    pub csv_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default)]
    pub bundle_size: u64,
    #[serde(default)]
    pub node_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryMetadata {
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_entries: u64,
    #[serde(default)]
    pub total_bundle_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryFile {
    version: u32,
    entries: BTreeMap<String, BTreeMap<String, RegistryEntry>>,
    #[serde(default)]
    metadata: RegistryMetadata,
}

impl Default for RegistryFile {
    fn default() -> Self {
        Self {
            version: REGISTRY_VERSION,
            entries: BTreeMap::new(),
            metadata: RegistryMetadata::default(),
        }
    }
}

/// Persistent `(csv_hash, graph_name) → bundle_path` index
pub struct BundleRegistry {
    path: PathBuf,
    inner: Mutex<RegistryFile>,
}

impl BundleRegistry {
    /// Open the registry at `path`, loading and migrating any existing file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let inner = Self::load(&path).unwrap_or_default();
        Self {
            path,
            inner: Mutex::new(inner),
        }
    }

    fn load(path: &Path) -> Option<RegistryFile> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read bundle registry");
                return None;
            }
        };
        let document: Value = match serde_json::from_slice(&bytes) {
            Ok(document) => document,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "bundle registry is corrupt, starting empty");
                return None;
            }
        };

        let version = document
            .get("version")
            .and_then(Value::as_u64)
            .unwrap_or(REGISTRY_VERSION as u64) as u32;
        if version != REGISTRY_VERSION {
            warn!(
                found = version,
                expected = REGISTRY_VERSION,
                "bundle registry version mismatch"
            );
        }

        let mut entries: BTreeMap<String, BTreeMap<String, RegistryEntry>> = BTreeMap::new();
        if let Some(raw_entries) = document.get("entries").and_then(Value::as_object) {
            for (csv_hash, value) in raw_entries {
                if let Some(nested) = Self::parse_hash_entry(csv_hash, value) {
                    entries.insert(csv_hash.clone(), nested);
                }
            }
        }

        let metadata = document
            .get("metadata")
            .cloned()
            .and_then(|m| serde_json::from_value(m).ok())
            .unwrap_or_default();

        Some(RegistryFile {
            version: REGISTRY_VERSION,
            entries,
            metadata,
        })
    }

    /// Parse one hash's entry, migrating legacy flat records in memory
    fn parse_hash_entry(csv_hash: &str, value: &Value) -> Option<BTreeMap<String, RegistryEntry>> {
        // Legacy shape: the entry itself is a flat record carrying bundle_path
        if value.get("bundle_path").is_some() {
            let graph_name = value
                .get("graph_name")
                .and_then(Value::as_str)
                .unwrap_or("default")
                .to_string();
            match serde_json::from_value::<RegistryEntry>(value.clone()) {
                Ok(entry) => {
                    debug!(csv_hash, graph = %graph_name, "migrated legacy flat registry entry");
                    return Some(BTreeMap::from([(graph_name, entry)]));
                }
                Err(e) => {
                    warn!(csv_hash, error = %e, "dropping unreadable legacy registry entry");
                    return None;
                }
            }
        }

        match serde_json::from_value::<BTreeMap<String, RegistryEntry>>(value.clone()) {
            Ok(nested) => Some(nested),
            Err(e) => {
                warn!(csv_hash, error = %e, "dropping unreadable registry entry");
                None
            }
        }
    }

    /// Insert or overwrite a bundle entry and persist
    pub fn register(
        &self,
        csv_hash: &str,
        graph_name: &str,
        bundle_path: impl Into<PathBuf>,
        csv_path: impl Into<PathBuf>,
        node_count: Option<u64>,
    ) -> Result<()> {
        if !is_valid_hash(csv_hash) {
            return Err(BundleError::InvalidInput(format!(
                "'{csv_hash}' is not a 64-hex content hash"
            )));
        }
        if graph_name.is_empty() {
            return Err(BundleError::InvalidInput(
                "graph name must be non-empty".into(),
            ));
        }
        let bundle_path = bundle_path.into();
        let bundle_size = match fs::metadata(&bundle_path) {
            Ok(metadata) => metadata.len(),
            Err(_) => {
                return Err(BundleError::InvalidInput(format!(
                    "bundle file '{}' does not exist",
                    bundle_path.display()
                )));
            }
        };

        let now = Utc::now();
        let entry = RegistryEntry {
            bundle_path,
            csv_path: csv_path.into(),
            created_at: now,
            last_accessed: now,
            access_count: 0,
            bundle_size,
            node_count: node_count.unwrap_or(0),
        };

        let mut inner = self.inner.lock();
        inner
            .entries
            .entry(csv_hash.to_string())
            .or_default()
            .insert(graph_name.to_string(), entry);
        Self::refresh_metadata(&mut inner);
        self.persist(&inner)
    }

    /// Look up a bundle path; lookups do not mutate the registry
    ///
    /// Without a graph name the lexicographically smallest graph under the
    /// hash is returned. A stored path that no longer exists on disk yields
    /// `None` with a warning.
    pub fn find_bundle(&self, csv_hash: &str, graph_name: Option<&str>) -> Option<PathBuf> {
        let inner = self.inner.lock();
        let graphs = inner.entries.get(csv_hash)?;
        let entry = match graph_name {
            Some(graph_name) => graphs.get(graph_name)?,
            None => graphs.values().next()?,
        };
        if !entry.bundle_path.exists() {
            warn!(
                csv_hash,
                path = %entry.bundle_path.display(),
                "registered bundle file is missing on disk"
            );
            return None;
        }
        Some(entry.bundle_path.clone())
    }

    /// Remove one graph's entry, or the whole hash when no graph is given
    ///
    /// A hash left with zero graphs is removed entirely.
    pub fn remove_entry(&self, csv_hash: &str, graph_name: Option<&str>) -> Result<bool> {
        let mut inner = self.inner.lock();
        let removed = match graph_name {
            Some(graph_name) => {
                let Some(graphs) = inner.entries.get_mut(csv_hash) else {
                    return Ok(false);
                };
                let removed = graphs.remove(graph_name).is_some();
                if graphs.is_empty() {
                    inner.entries.remove(csv_hash);
                }
                removed
            }
            None => inner.entries.remove(csv_hash).is_some(),
        };

        if removed {
            Self::refresh_metadata(&mut inner);
            self.persist(&inner)?;
        }
        Ok(removed)
    }

    /// Full entry record for `(csv_hash, graph_name)`
    pub fn get_entry_info(&self, csv_hash: &str, graph_name: &str) -> Option<RegistryEntry> {
        self.inner
            .lock()
            .entries
            .get(csv_hash)?
            .get(graph_name)
            .cloned()
    }

    /// Registry totals, for diagnostics
    pub fn metadata(&self) -> RegistryMetadata {
        self.inner.lock().metadata.clone()
    }

    pub fn entry_count(&self) -> usize {
        self.inner.lock().entries.values().map(BTreeMap::len).sum()
    }

    fn refresh_metadata(inner: &mut RegistryFile) {
        inner.metadata.last_modified = Some(Utc::now());
        inner.metadata.total_entries =
            inner.entries.values().map(|g| g.len() as u64).sum();
        inner.metadata.total_bundle_size = inner
            .entries
            .values()
            .flat_map(BTreeMap::values)
            .map(|entry| entry.bundle_size)
            .sum();
    }

    fn persist(&self, inner: &RegistryFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, inner)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| BundleError::Storage(format!("atomic registry write failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn valid_hash(seed: u8) -> String {
        format!("{:02x}", seed).repeat(32)
    }

    fn write_bundle(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, b"{}").unwrap();
        path
    }

    fn registry_in(dir: &TempDir) -> BundleRegistry {
        BundleRegistry::new(dir.path().join("graph_registry.json"))
    }

    #[test]
    fn test_register_then_find() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        let bundle = write_bundle(&dir, "b1.json");
        let hash = valid_hash(0xab);

        registry
            .register(&hash, "main", &bundle, "spec.csv", Some(2))
            .unwrap();
        assert_eq!(registry.find_bundle(&hash, Some("main")), Some(bundle.clone()));
        assert_eq!(registry.find_bundle(&hash, None), Some(bundle));
        assert_eq!(registry.find_bundle(&hash, Some("other")), None);
        assert_eq!(registry.find_bundle(&valid_hash(0xcd), None), None);
    }

    #[test]
    fn test_lookup_does_not_mutate() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        let bundle = write_bundle(&dir, "b1.json");
        let hash = valid_hash(0xab);
        registry
            .register(&hash, "main", &bundle, "spec.csv", None)
            .unwrap();

        let before = registry.get_entry_info(&hash, "main").unwrap();
        registry.find_bundle(&hash, Some("main"));
        registry.find_bundle(&hash, Some("main"));
        let after = registry.get_entry_info(&hash, "main").unwrap();
        assert_eq!(before.access_count, after.access_count);
        assert_eq!(before.last_accessed, after.last_accessed);
    }

    #[test]
    fn test_find_without_graph_name_is_lexicographic() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        let zeta = write_bundle(&dir, "zeta.json");
        let alpha = write_bundle(&dir, "alpha.json");
        let hash = valid_hash(0xab);

        registry.register(&hash, "zeta", &zeta, "s.csv", None).unwrap();
        registry.register(&hash, "alpha", &alpha, "s.csv", None).unwrap();
        assert_eq!(registry.find_bundle(&hash, None), Some(alpha));
    }

    #[test]
    fn test_remove_last_graph_removes_hash() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        let bundle = write_bundle(&dir, "b1.json");
        let hash = valid_hash(0xab);
        registry
            .register(&hash, "main", &bundle, "spec.csv", None)
            .unwrap();

        assert!(registry.remove_entry(&hash, Some("main")).unwrap());
        assert_eq!(registry.find_bundle(&hash, None), None);
        assert_eq!(registry.entry_count(), 0);
        assert!(!registry.remove_entry(&hash, Some("main")).unwrap());
    }

    #[test]
    fn test_remove_whole_hash() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        let b1 = write_bundle(&dir, "b1.json");
        let b2 = write_bundle(&dir, "b2.json");
        let hash = valid_hash(0xab);
        registry.register(&hash, "a", &b1, "s.csv", None).unwrap();
        registry.register(&hash, "b", &b2, "s.csv", None).unwrap();

        assert!(registry.remove_entry(&hash, None).unwrap());
        assert_eq!(registry.entry_count(), 0);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        let bundle = write_bundle(&dir, "b1.json");

        assert!(registry
            .register("nothex", "main", &bundle, "s.csv", None)
            .is_err());
        assert!(registry
            .register(&valid_hash(0xab), "", &bundle, "s.csv", None)
            .is_err());
        assert!(registry
            .register(
                &valid_hash(0xab),
                "main",
                dir.path().join("missing.json"),
                "s.csv",
                None,
            )
            .is_err());
    }

    #[test]
    fn test_missing_bundle_file_yields_absent() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        let bundle = write_bundle(&dir, "b1.json");
        let hash = valid_hash(0xab);
        registry
            .register(&hash, "main", &bundle, "s.csv", None)
            .unwrap();

        fs::remove_file(&bundle).unwrap();
        assert_eq!(registry.find_bundle(&hash, Some("main")), None);
    }

    #[test]
    fn test_persists_across_instances_with_metadata() {
        let dir = TempDir::new().unwrap();
        let bundle = write_bundle(&dir, "b1.json");
        let hash = valid_hash(0xab);
        {
            let registry = registry_in(&dir);
            registry
                .register(&hash, "main", &bundle, "spec.csv", Some(3))
                .unwrap();
        }

        let reloaded = registry_in(&dir);
        assert_eq!(reloaded.find_bundle(&hash, Some("main")), Some(bundle));
        let metadata = reloaded.metadata();
        assert_eq!(metadata.total_entries, 1);
        assert!(metadata.total_bundle_size > 0);
        assert_eq!(
            reloaded.get_entry_info(&hash, "main").unwrap().node_count,
            3
        );
    }

    #[test]
    fn test_legacy_flat_entries_migrate_on_load() {
        let dir = TempDir::new().unwrap();
        let bundle = write_bundle(&dir, "legacy.json");
        let hash = valid_hash(0xab);
        let now = Utc::now();

        let flat_entry = json!({
            "graph_name": "legacy_graph",
            "bundle_path": bundle,
            "csv_path": "old.csv",
            "created_at": now,
            "last_accessed": now,
            "access_count": 4,
            "bundle_size": 2,
            "node_count": 1
        });
        let legacy = json!({
            "version": 1,
            "entries": { &hash: flat_entry }
        });
        let path = dir.path().join("graph_registry.json");
        fs::write(&path, serde_json::to_vec(&legacy).unwrap()).unwrap();

        let registry = BundleRegistry::new(&path);
        assert_eq!(
            registry.find_bundle(&hash, Some("legacy_graph")),
            Some(bundle)
        );
        let entry = registry.get_entry_info(&hash, "legacy_graph").unwrap();
        assert_eq!(entry.access_count, 4);
    }
}
