//! Static call-site manifest
//!
//! The instrumentation build emits JSON manifests describing every shimmed
//! callable: `{"shims": [{"hash", "prefix", "suffix", "return_type",
//! "arg_list": [{"arg_num", "arg_type"}]}]}`. Several manifests may match the
//! configured glob; they are concatenated in lexical path order.
//!
//! A hash declared twice with the same descriptor is collapsed. A hash
//! declared twice with different descriptors is rejected.

use crate::error::{AnalysisError, Result};
use fnv::FnvHashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level manifest field holding the descriptor list
const BLOB_FIELD: &str = "shims";

/// One positional argument of a callable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgDescriptor {
    pub arg_num: u32,
    pub arg_type: String,
}

/// Static description of one instrumented call site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallableDescriptor {
    pub hash: String,
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    #[serde(default)]
    pub return_type: String,
    #[serde(default)]
    pub arg_list: Vec<ArgDescriptor>,
}

impl CallableDescriptor {
    /// Display symbol: prefix followed by suffix
    pub fn symbol(&self) -> String {
        format!("{}{}", self.prefix, self.suffix)
    }
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    shims: Vec<CallableDescriptor>,
}

/// Hash -> descriptor lookup built once per analysis
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    descriptors: Vec<CallableDescriptor>,
    origins: Vec<PathBuf>,
    by_hash: FnvHashMap<String, usize>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every manifest file matching a glob pattern
    pub fn from_glob(pattern: &str) -> Result<Self> {
        let files = expand_glob(pattern)?;
        if files.is_empty() {
            tracing::warn!("No manifest files match '{}'", pattern);
        }
        let mut manifest = Self::new();
        for file in files {
            manifest.load_file(&file)?;
        }
        tracing::info!(
            "Loaded {} call-site descriptors from '{}'",
            manifest.len(),
            pattern
        );
        Ok(manifest)
    }

    /// Append the descriptors of one manifest file
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let contents = fs::read_to_string(path)?;
        let parsed: ManifestFile =
            serde_json::from_str(&contents).map_err(|e| AnalysisError::Manifest {
                path: path.to_path_buf(),
                reason: format!("expected a '{}' list: {}", BLOB_FIELD, e),
            })?;
        for descriptor in parsed.shims {
            self.insert(path, descriptor)?;
        }
        Ok(())
    }

    /// Add a descriptor attributed to `origin`
    pub fn insert(&mut self, origin: &Path, descriptor: CallableDescriptor) -> Result<()> {
        if let Some(&existing) = self.by_hash.get(&descriptor.hash) {
            if self.descriptors[existing] == descriptor {
                return Ok(());
            }
            return Err(AnalysisError::DuplicateHash {
                hash: descriptor.hash,
                first: self.origins[existing].clone(),
                second: origin.to_path_buf(),
            });
        }
        self.by_hash.insert(descriptor.hash.clone(), self.descriptors.len());
        self.descriptors.push(descriptor);
        self.origins.push(origin.to_path_buf());
        Ok(())
    }

    /// Build a manifest from descriptors held in memory
    pub fn from_descriptors<I>(descriptors: I) -> Result<Self>
    where
        I: IntoIterator<Item = CallableDescriptor>,
    {
        let mut manifest = Self::new();
        for descriptor in descriptors {
            manifest.insert(Path::new("<memory>"), descriptor)?;
        }
        Ok(manifest)
    }

    pub fn get(&self, hash: &str) -> Option<&CallableDescriptor> {
        self.by_hash.get(hash).map(|&i| &self.descriptors[i])
    }

    pub fn descriptors(&self) -> &[CallableDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn is_wild(s: &str) -> bool {
    s.contains(['*', '?'])
}

/// Expand a glob whose wildcards (`*`, `?`) appear only in the file name
///
/// Matches are returned in lexical order. A pattern without wildcards
/// matches itself if the file exists.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let path = Path::new(pattern);
    let file_pattern = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AnalysisError::InvalidPattern(pattern.to_string()))?;
    let dir = match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Path::new("."),
        Some(p) => p,
        None => return Err(AnalysisError::InvalidPattern(pattern.to_string())),
    };
    if is_wild(dir.to_string_lossy().as_ref()) {
        return Err(AnalysisError::InvalidPattern(pattern.to_string()));
    }

    if !is_wild(file_pattern) {
        return Ok(if path.is_file() { vec![path.to_path_buf()] } else { Vec::new() });
    }
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut regex_src = String::from("^");
    for c in file_pattern.chars() {
        match c {
            '*' => regex_src.push_str(".*"),
            '?' => regex_src.push('.'),
            other => regex_src.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex_src.push('$');
    let matcher = Regex::new(&regex_src)
        .map_err(|_| AnalysisError::InvalidPattern(pattern.to_string()))?;

    let mut matches = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if matcher.is_match(name) && entry.path().is_file() {
            matches.push(entry.path());
        }
    }
    matches.sort();
    Ok(matches)
}
