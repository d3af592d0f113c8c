//! Derived-table cache
//!
//! Every derived table is computed at most once per cache. Tables are
//! stored MessagePack-encoded in a [`CacheStore`]; every read decodes the
//! stored bytes, so repeated reads of one table are identical. There is no
//! invalidation: one cache belongs to exactly one immutable trace capture.
//! Tables that also depend on the configuration or the manifest are stored
//! under keys suffixed with [`analysis_identity`], so one store can serve
//! several analyses of the same trace.

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::manifest::Manifest;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Keyed storage for encoded tables
pub trait CacheStore {
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>>;
    fn set(&mut self, name: &str, table: Vec<u8>) -> Result<()>;
    fn contains(&self, name: &str) -> bool;
}

/// In-process store (default)
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.tables.get(name).cloned())
    }

    fn set(&mut self, name: &str, table: Vec<u8>) -> Result<()> {
        self.tables.insert(name.to_string(), table);
        Ok(())
    }

    fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }
}

/// On-disk store: one `<name>.msgpack` file per table
///
/// Use [`DirStore::for_trace`] to scope the directory to a trace identity.
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    /// Store tables directly under `dir` (created if missing)
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Store tables under `root/<sha256 of trace file>`
    pub fn for_trace<P: AsRef<Path>, Q: AsRef<Path>>(root: P, trace: Q) -> Result<Self> {
        let identity = trace_identity(trace.as_ref())?;
        tracing::debug!("Trace identity {}", identity);
        Self::new(root.as_ref().join(identity))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.msgpack", name))
    }
}

impl CacheStore for DirStore {
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, name: &str, table: Vec<u8>) -> Result<()> {
        // atomic replace
        let tmp = self.dir.join(format!(".{}.tmp", name));
        fs::write(&tmp, table)?;
        fs::rename(&tmp, self.path_for(name))?;
        Ok(())
    }

    fn contains(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }
}

/// Hex SHA-256 of a file's contents
pub fn trace_identity(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn hash_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

/// Hex SHA-256 of every analysis input besides the trace itself
///
/// Covers the provider filter, the counter field, the latency scale and
/// every manifest descriptor in load order. Tables derived from these
/// inputs are cached under a key carrying this digest.
pub fn analysis_identity(config: &AnalysisConfig, manifest: &Manifest) -> String {
    let mut hasher = Sha256::new();
    match &config.provider {
        Some(provider) => {
            hasher.update([1u8]);
            hash_str(&mut hasher, provider);
        }
        None => hasher.update([0u8]),
    }
    hash_str(&mut hasher, &config.counter_field);
    hasher.update(config.latency_scale.to_bits().to_le_bytes());

    hasher.update((manifest.len() as u64).to_le_bytes());
    for d in manifest.descriptors() {
        hash_str(&mut hasher, &d.hash);
        hash_str(&mut hasher, &d.prefix);
        hash_str(&mut hasher, &d.suffix);
        hash_str(&mut hasher, &d.return_type);
        hasher.update((d.arg_list.len() as u64).to_le_bytes());
        for arg in &d.arg_list {
            hasher.update(arg.arg_num.to_le_bytes());
            hash_str(&mut hasher, &arg.arg_type);
        }
    }
    hex::encode(hasher.finalize())
}

/// Hit/miss counters for a cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Typed front-end over a [`CacheStore`]
#[derive(Debug)]
pub struct ComputationCache<S: CacheStore = MemoryStore> {
    store: S,
    stats: CacheStats,
}

impl Default for ComputationCache<MemoryStore> {
    fn default() -> Self {
        Self::new(MemoryStore::new())
    }
}

impl<S: CacheStore> ComputationCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            stats: CacheStats::default(),
        }
    }

    /// Decode a stored table, counting a hit or a miss
    pub fn load<T: DeserializeOwned>(&mut self, name: &str) -> Result<Option<T>> {
        let Some(bytes) = self.store.get(name)? else {
            self.stats.misses += 1;
            return Ok(None);
        };
        let table = rmp_serde::from_slice(&bytes).map_err(|e| AnalysisError::Cache {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        self.stats.hits += 1;
        tracing::debug!("Table '{}' served from cache", name);
        Ok(Some(table))
    }

    /// Encode and store a table
    pub fn store<T: Serialize>(&mut self, name: &str, table: &T) -> Result<()> {
        let bytes = rmp_serde::to_vec_named(table).map_err(|e| AnalysisError::Cache {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        self.store.set(name, bytes)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.store.contains(name)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn into_store(self) -> S {
        self.store
    }
}
