//! CLI argument parsing for callscope

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
    /// CSV format for spreadsheet analysis
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "callscope")]
#[command(version)]
#[command(
    about = "Reconstruct calls from entry/exit traces and profile them by argument shape",
    long_about = None
)]
pub struct Cli {
    /// Enable debug logging to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Latency/throughput per call site and argument shape
    Report(TraceArgs),
    /// Joined per-call records
    Calls(TraceArgs),
    /// Manifest call sites that appear in the trace
    Callables(TraceArgs),
}

/// Options shared by every trace command
#[derive(Args, Debug, Clone)]
pub struct TraceArgs {
    /// Trace export (one JSON event per line)
    #[arg(value_name = "TRACE")]
    pub trace: PathBuf,

    /// Manifest glob (overrides the config file)
    #[arg(short, long, value_name = "GLOB")]
    pub manifest: Option<String>,

    /// TOML config file with a [profiler] table
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory for the persistent table cache
    #[arg(long = "cache-dir", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Only keep events of this provider
    #[arg(long, value_name = "NAME")]
    pub provider: Option<String>,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl Command {
    pub fn trace_args(&self) -> &TraceArgs {
        match self {
            Command::Report(args) | Command::Calls(args) | Command::Callables(args) => args,
        }
    }
}
