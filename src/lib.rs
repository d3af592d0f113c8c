//! Callscope - call reconstruction and shape-keyed profiling for entry/exit traces
//!
//! This library turns a captured stream of per-thread entry/exit
//! instrumentation events into completed call records, joins them against
//! a static call-site manifest, and aggregates latency and throughput per
//! callable and argument shape.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod fields;
pub mod join;
pub mod manifest;
pub mod name;
pub mod pairer;
pub mod pipeline;
pub mod report;
pub mod source;
pub mod stats;
pub mod timing;

pub use error::{AnalysisError, Result};
pub use pipeline::TraceAnalyzer;
