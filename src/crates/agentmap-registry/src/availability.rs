//! Unified availability cache
//!
//! A categorized, file-backed, thread-safe cache of "is X available?"
//! answers. Categories are namespaces such as `dependency.llm`,
//! `dependency.storage`, `llm_provider`, `storage`; values are free-form
//! JSON written by the feature registry's validators.
//!
//! The whole cache lives in a single JSON file so startup pays one read:
//!
//! ```text
//! { "version": 1,
//!   "environment_hash": "ab12…",
//!   "categories": { "dependency.llm": { "openai": { "available": true, … } } } }
//! ```
//!
//! A cached file is discarded wholesale when its schema version or its
//! environment hash no longer matches the running process. Entries that
//! carry `source_path`/`source_mtime` fields are additionally validated
//! against the file's current modification time with a tolerance of
//! [`MTIME_TOLERANCE_SECS`] to absorb cross-filesystem timestamp
//! resolution.
//!
//! Writes serialize into a sibling temporary file, fsync, then atomically
//! replace the canonical file while holding an advisory file lock; the
//! in-memory image is only swapped after the replace succeeds. Load
//! failures degrade to an empty cache with a warning, never an error.

use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

use crate::error::{RegistryError, Result};

/// Current schema version of the cache file
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Tolerance when comparing stored source mtimes against the filesystem
pub const MTIME_TOLERANCE_SECS: u64 = 5;

/// Environment variables that invalidate the cache when they change
const TRACKED_ENV_PREFIX: &str = "AGENTMAP_";
const TRACKED_ENV_KEYS: &[&str] = &["OPENAI_API_KEY", "ANTHROPIC_API_KEY", "GOOGLE_API_KEY"];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheImage {
    version: u32,
    environment_hash: String,
    categories: HashMap<String, HashMap<String, Value>>,
}

impl CacheImage {
    fn empty(environment_hash: String) -> Self {
        Self {
            version: CACHE_SCHEMA_VERSION,
            environment_hash,
            categories: HashMap::new(),
        }
    }
}

/// File-backed availability cache
pub struct AvailabilityCache {
    path: PathBuf,
    environment_hash: String,
    image: RwLock<CacheImage>,
}

impl AvailabilityCache {
    /// Open the cache at `path`, loading any valid persisted image
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let environment_hash = compute_environment_hash();
        let image = match Self::load_image(&path, &environment_hash) {
            Some(image) => image,
            None => CacheImage::empty(environment_hash.clone()),
        };
        Self {
            path,
            environment_hash,
            image: RwLock::new(image),
        }
    }

    fn load_image(path: &Path, environment_hash: &str) -> Option<CacheImage> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read availability cache");
                return None;
            }
        };
        let image: CacheImage = match serde_json::from_slice(&bytes) {
            Ok(image) => image,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "availability cache is corrupt, discarding");
                return None;
            }
        };
        if image.version != CACHE_SCHEMA_VERSION {
            warn!(
                found = image.version,
                expected = CACHE_SCHEMA_VERSION,
                "availability cache schema version mismatch, discarding"
            );
            return None;
        }
        if image.environment_hash != environment_hash {
            debug!("environment changed, discarding availability cache");
            return None;
        }
        Some(image)
    }

    /// Look up a cached availability value
    ///
    /// Entries tied to a source file (carrying `source_path`/`source_mtime`)
    /// are treated as absent when the file's mtime has drifted beyond the
    /// tolerance.
    pub fn get_availability(&self, category: &str, key: &str) -> Option<Value> {
        let image = self.image.read();
        let value = image.categories.get(category)?.get(key)?;
        if !entry_source_is_fresh(value) {
            debug!(category, key, "cached entry is stale against its source file");
            return None;
        }
        Some(value.clone())
    }

    /// Store an availability value and persist the cache
    pub fn set_availability(&self, category: &str, key: &str, value: Value) -> Result<()> {
        if category.is_empty() || key.is_empty() {
            return Err(RegistryError::InvalidInput(
                "availability category and key must be non-empty".into(),
            ));
        }
        let mut next = self.image.read().clone();
        next.categories
            .entry(category.to_string())
            .or_default()
            .insert(key.to_string(), value);
        self.persist_and_swap(next)
    }

    /// Invalidate the whole cache, one category, or one entry
    pub fn invalidate(&self, category: Option<&str>, key: Option<&str>) -> Result<()> {
        let mut next = self.image.read().clone();
        match (category, key) {
            (None, _) => next.categories.clear(),
            (Some(category), None) => {
                next.categories.remove(category);
            }
            (Some(category), Some(key)) => {
                if let Some(entries) = next.categories.get_mut(category) {
                    entries.remove(key);
                    if entries.is_empty() {
                        next.categories.remove(category);
                    }
                }
            }
        }
        self.persist_and_swap(next)
    }

    /// All keys currently cached under a category
    pub fn category_keys(&self, category: &str) -> Vec<String> {
        let image = self.image.read();
        let mut keys: Vec<String> = image
            .categories
            .get(category)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Number of entries across all categories
    pub fn entry_count(&self) -> usize {
        self.image.read().categories.values().map(HashMap::len).sum()
    }

    /// Replace the canonical file atomically, then swap the in-memory image
    fn persist_and_swap(&self, next: CacheImage) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_path = self.path.with_extension("lock");
        let lock_file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)?;
        lock_file
            .lock_exclusive()
            .map_err(|e| RegistryError::Storage(format!("failed to lock cache file: {e}")))?;

        let result = (|| -> Result<()> {
            let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
            let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
            serde_json::to_writer_pretty(&mut tmp, &next)?;
            tmp.flush()?;
            tmp.as_file().sync_all()?;
            tmp.persist(&self.path)
                .map_err(|e| RegistryError::Storage(format!("atomic replace failed: {e}")))?;
            Ok(())
        })();

        let _ = fs2::FileExt::unlock(&lock_file);

        result?;
        *self.image.write() = next;
        Ok(())
    }

    /// Hash of the environment this cache was built under
    pub fn environment_hash(&self) -> &str {
        &self.environment_hash
    }
}

/// Sha256 over the sorted tracked environment variables
fn compute_environment_hash() -> String {
    let mut entries: Vec<(String, String)> = std::env::vars()
        .filter(|(key, _)| {
            key.starts_with(TRACKED_ENV_PREFIX) || TRACKED_ENV_KEYS.contains(&key.as_str())
        })
        .collect();
    entries.sort();

    let mut hasher = Sha256::new();
    for (key, value) in entries {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    hex_digest(hasher)
}

fn hex_digest(hasher: Sha256) -> String {
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Check the `source_path`/`source_mtime` fields of an entry, if present
fn entry_source_is_fresh(entry: &Value) -> bool {
    let Some(obj) = entry.as_object() else {
        return true;
    };
    let (Some(source_path), Some(stored_mtime)) = (
        obj.get("source_path").and_then(Value::as_str),
        obj.get("source_mtime").and_then(Value::as_u64),
    ) else {
        return true;
    };

    match fs::metadata(source_path).and_then(|m| m.modified()) {
        Ok(modified) => {
            let current = modified
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            current.abs_diff(stored_mtime) <= MTIME_TOLERANCE_SECS
        }
        // Source file gone: the cached answer no longer applies
        Err(_) => false,
    }
}

/// Current mtime of a file in whole seconds, for storing alongside an entry
pub fn source_mtime_secs(path: impl AsRef<Path>) -> Option<u64> {
    fs::metadata(path.as_ref())
        .and_then(|m| m.modified())
        .ok()
        .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
}
