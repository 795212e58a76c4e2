//! JSON collection storage
//!
//! Small document store backing the interaction handler: each named
//! collection is one JSON file under the cache directory mapping document
//! id to document. Reads of missing or corrupt collections return empty;
//! writes replace the collection file atomically under an in-process lock.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Result, RuntimeError};

/// One-file-per-collection JSON document store
pub struct JsonCollectionStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonCollectionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{collection}.json"))
    }

    /// All documents in a collection; missing or corrupt files read empty
    pub fn read_collection(&self, collection: &str) -> BTreeMap<String, Value> {
        let path = self.collection_path(collection);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!(collection, error = %e, "failed to read collection, treating as empty");
                return BTreeMap::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(documents) => documents,
            Err(e) => {
                warn!(collection, error = %e, "collection is corrupt, treating as empty");
                BTreeMap::new()
            }
        }
    }

    pub fn read_document(&self, collection: &str, id: &str) -> Option<Value> {
        self.read_collection(collection).remove(id)
    }

    /// Insert or overwrite one document and persist the collection
    pub fn write_document(&self, collection: &str, id: &str, document: Value) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut documents = self.read_collection(collection);
        documents.insert(id.to_string(), document);
        self.persist(collection, &documents)
    }

    /// Remove one document; returns whether it existed
    pub fn delete_document(&self, collection: &str, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let mut documents = self.read_collection(collection);
        let existed = documents.remove(id).is_some();
        if existed {
            self.persist(collection, &documents)?;
        }
        Ok(existed)
    }

    fn persist(&self, collection: &str, documents: &BTreeMap<String, Value>) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.collection_path(collection);
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, documents)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| RuntimeError::Storage {
            step: format!("persist collection '{collection}'"),
            message: e.to_string(),
        })?;
        Ok(())
    }
}
