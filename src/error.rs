//! Error taxonomy for trace analysis
//!
//! Only fatal conditions live here. Expected filtering (unparseable event
//! names, call sites missing from the manifest, in-flight calls at capture
//! end) is never an error; it is counted in [`crate::pipeline::Diagnostics`].

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort construction of a derived table
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(
        "Stack mismatch on pid {pid} tid {tid} at event {index}: \
         exit for {found} but stack top is {expected}"
    )]
    StackMismatch {
        pid: i64,
        tid: i64,
        index: usize,
        expected: String,
        found: String,
    },

    #[error("Exit for {hash} on pid {pid} tid {tid} at event {index} with no open entry")]
    EmptyStack {
        pid: i64,
        tid: i64,
        index: usize,
        hash: String,
    },

    #[error("Table '{table}' is missing required column '{column}' (event {index})")]
    MissingColumn {
        table: &'static str,
        column: String,
        index: usize,
    },

    #[error("Table '{table}' has an invalid '{column}' value at event {index}: {reason}")]
    InvalidField {
        table: &'static str,
        column: String,
        index: usize,
        reason: String,
    },

    #[error(
        "Manifest hash {hash} is declared differently in {} and {}",
        first.display(),
        second.display()
    )]
    DuplicateHash {
        hash: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Invalid manifest {}: {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },

    #[error("Invalid trace event at line {line}: {reason}")]
    InvalidSource { line: usize, reason: String },

    #[error("Invalid glob pattern '{0}'")]
    InvalidPattern(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cache entry '{name}' could not be used: {reason}")]
    Cache { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for trace analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;
