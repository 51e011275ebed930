use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use livecov_core::config::CollectorConfig;
use livecov_core::runtime::RuntimeAbi;
use livecov_core::session::path::normalize;
use livecov_core::symbols;
use livecov_core::types::CoverageInfo;
use livecov_utils::{debug, info, init_logging, init_logging_to_file, init_logging_with_level, LogFormat, LogLevel, LoggingGuard};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Inspect the coverage runtime of this toolchain and work with coverage snapshots.
#[derive(Parser, Debug)]
#[command(name = "livecov")]
#[command(version)]
#[command(about = "In-process source coverage collection for LLVM-instrumented binaries", long_about = None)]
struct Cli
{
    /// Log level, overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// Log to ~/.livecov/<date>-livecov.log instead of stderr
    #[arg(long, global = true, default_value_t = false)]
    log_to_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Show the runtime ABI this build targets and the configured one
    Abi,
    /// List the instrumented images loaded into this process
    Binaries,
    /// Show how a requested profile path is rewritten for windowed collection
    Normalize
    {
        /// Profile path as it would appear in LLVM_PROFILE_FILE
        path: String,
    },
    /// Print a serialized coverage snapshot
    Show
    {
        /// JSON snapshot to read
        snapshot: PathBuf,
        /// Print only file and segment counts
        #[arg(long, default_value_t = false)]
        summary: bool,
    },
    /// Merge serialized coverage snapshots
    Merge
    {
        /// JSON snapshots to merge
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,
        /// Write the merged snapshot here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main()
{
    let cli = Cli::parse();

    let _guard = match start_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli.command) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn start_logging(cli: &Cli) -> CliResult<LoggingGuard>
{
    if cli.log_to_file {
        let (path, guard) = init_logging_to_file(cli.log_level)?;
        debug!(path = %path.display(), "logging to file");
        return Ok(guard);
    }
    Ok(match cli.log_level {
        Some(level) => init_logging_with_level(level, LogFormat::default())?,
        None => init_logging()?,
    })
}

fn run_command(command: Commands) -> CliResult<()>
{
    match command {
        Commands::Abi => {
            let config = CollectorConfig::from_env()?;
            match RuntimeAbi::compiled_by() {
                Some(abi) => println!("Compiled for:      {abi}"),
                None => println!("Compiled for:      unknown"),
            }
            println!("Configured ABI:    {}", config.runtime_abi);
            println!("Requires bitmap:   {}", config.runtime_abi.requires_bitmap());
            println!("Export table:      {}", config.runtime_abi.export_table_symbol());
            println!("Profile variable:  {}", config.profile_variable);
            println!("Window directory:  {}", config.temp_dir.display());
            Ok(())
        }
        Commands::Binaries => {
            let binaries = symbols::resolve_binaries();
            info!(count = binaries.len(), "resolved instrumented binaries");
            if binaries.is_empty() {
                println!("No instrumented binaries loaded");
                return Ok(());
            }
            for binary in &binaries {
                let version = binary
                    .profile_version()
                    .map_or_else(|| "-".to_string(), |version| format!("{version:#x}"));
                println!(
                    "{:<32} bitmap={:<5} version={:<20} {}",
                    binary.name(),
                    binary.has_bitmap(),
                    version,
                    binary.path().display()
                );
            }
            Ok(())
        }
        Commands::Normalize { path } => {
            let normalized = normalize(&path);
            println!("{}", normalized.path);
            println!("changed:    {}", normalized.changed);
            println!("continuous: {}", normalized.continuous);
            Ok(())
        }
        Commands::Show { snapshot, summary } => {
            let coverage = read_snapshot(&snapshot)?;
            if summary {
                let counts = coverage.summary();
                println!(
                    "{} files, {} segments, {} covered",
                    counts.files, counts.segments, counts.covered_segments
                );
            } else {
                println!("{coverage}");
            }
            Ok(())
        }
        Commands::Merge { inputs, output } => {
            let merged = merge_snapshots(&inputs)?;
            let json = serde_json::to_string_pretty(&merged)?;
            match output {
                Some(output) => {
                    fs::write(&output, json)?;
                    info!(output = %output.display(), inputs = inputs.len(), "merged snapshots");
                }
                None => println!("{json}"),
            }
            Ok(())
        }
    }
}

fn read_snapshot(path: &Path) -> CliResult<CoverageInfo>
{
    let body = fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let coverage = serde_json::from_str(&body).map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(coverage)
}

fn merge_snapshots(inputs: &[PathBuf]) -> CliResult<CoverageInfo>
{
    let mut merged = CoverageInfo::new();
    for input in inputs {
        merged = merged.merged(read_snapshot(input)?);
    }
    Ok(merged)
}
