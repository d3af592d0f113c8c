use anyhow::{Context, Result};
use callscope::cache::{CacheStore, DirStore, MemoryStore};
use callscope::cli::{Cli, Command, OutputFormat, TraceArgs};
use callscope::config::AnalysisConfig;
use callscope::manifest::Manifest;
use callscope::pipeline::TraceAnalyzer;
use callscope::report;
use callscope::source::JsonLinesSource;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file values with command-line overrides applied
fn resolve_config(args: &TraceArgs) -> Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    if let Some(glob) = &args.manifest {
        config.manifest_glob = glob.clone();
    }
    if let Some(provider) = &args.provider {
        config.provider = Some(provider.clone());
    }
    if let Some(dir) = &args.cache_dir {
        config.cache_dir = Some(dir.clone());
    }
    config.validate()?;
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Execute one trace command against an analyzer
fn run_command<S: CacheStore>(
    command: &Command,
    format: OutputFormat,
    mut analyzer: TraceAnalyzer<JsonLinesSource, S>,
) -> Result<()> {
    match command {
        Command::Report(_) => {
            let summary = analyzer.summary()?;
            let diagnostics = analyzer.diagnostics()?;
            let packets = analyzer.packet_summary()?;
            match format {
                OutputFormat::Text => {
                    print!("{}", report::summary_text(&summary));
                    eprint!("{}", report::diagnostics_text(&diagnostics, &packets));
                }
                OutputFormat::Json => print_json(&report::JsonReport {
                    summary: &summary,
                    diagnostics: &diagnostics,
                    packets: &packets,
                })?,
                OutputFormat::Csv => print!("{}", report::summary_csv(&summary)),
            }
        }
        Command::Calls(_) => {
            let records = analyzer.records()?;
            match format {
                OutputFormat::Text => print!("{}", report::records_text(&records)),
                OutputFormat::Json => print_json(&records)?,
                OutputFormat::Csv => print!("{}", report::records_csv(&records)),
            }
        }
        Command::Callables(_) => {
            let callables = analyzer.callables()?;
            match format {
                OutputFormat::Text => print!("{}", report::callables_text(&callables)),
                OutputFormat::Json => print_json(&callables)?,
                OutputFormat::Csv => print!("{}", report::callables_csv(&callables)),
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let args = cli.command.trace_args();
    let config = resolve_config(args)?;
    let source = JsonLinesSource::from_path(&args.trace)
        .with_context(|| format!("Failed to open trace {}", args.trace.display()))?;
    let manifest = Manifest::from_glob(&config.manifest_glob)
        .with_context(|| format!("Failed to load manifests from '{}'", config.manifest_glob))?;

    match config.cache_dir.clone() {
        Some(root) => {
            let store = DirStore::for_trace(&root, &args.trace)
                .with_context(|| format!("Failed to open cache under {}", root.display()))?;
            let analyzer = TraceAnalyzer::with_store(source, manifest, config, store);
            run_command(&cli.command, args.format, analyzer)
        }
        None => {
            let analyzer = TraceAnalyzer::with_store(source, manifest, config, MemoryStore::new());
            run_command(&cli.command, args.format, analyzer)
        }
    }
}
