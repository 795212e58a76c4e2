//! Content hashing
//!
//! The Sha256 of a spec file's raw bytes is the canonical identity of that
//! spec: bundles are cached and looked up by `(csv_hash, graph_name)`. Files
//! are streamed in fixed-size chunks so large specs never load whole.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{BundleError, Result};

const CHUNK_SIZE: usize = 8192;

/// Sha256 of a file's bytes as 64 lowercase hex chars
pub fn hash_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BundleError::NotFound(format!("spec file '{}' does not exist", path.display()))
        } else {
            BundleError::Io(e)
        }
    })?;

    let mut hasher = Sha256::new();
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        hasher.update(&chunk[..read]);
    }
    Ok(to_hex(&hasher.finalize()))
}

/// Short per-node integrity hash over `"name:agent_type:edge_count"`
pub fn short_node_hash(name: &str, agent_type: &str, edge_count: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{name}:{agent_type}:{edge_count}").as_bytes());
    to_hex(&hasher.finalize())[..8].to_string()
}

/// Whether a string is a well-formed 64-hex content hash
pub fn is_valid_hash(hash: &str) -> bool {
    hash.len() == 64 && hash.bytes().all(|b| b.is_ascii_hexdigit())
}

fn to_hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
