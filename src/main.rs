use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use podium::pipeline::{self, LoadConfig};
use podium::source::{SourceData, SourceFiles};
use podium::verify;
use podium::warehouse::Warehouse;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "podium")]
#[command(about = "Load Olympic Games results into a star-schema warehouse")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the warehouse from the CSV files (full refresh)
    Load(LoadArgs),
    /// Drop and recreate the warehouse schema without loading data
    Schema(SchemaArgs),
    /// Check distinctness and referential integrity of a loaded warehouse
    Verify(VerifyArgs),
}

#[derive(Args)]
struct LoadArgs {
    /// Directory containing winter.csv, summer.csv and dictionary.csv
    #[arg(short, long, default_value = podium::config::DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// SQLite warehouse file (created if missing)
    #[arg(long, default_value = podium::config::DEFAULT_DATABASE)]
    database: PathBuf,

    /// Write run statistics as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args)]
struct SchemaArgs {
    /// SQLite warehouse file (created if missing)
    #[arg(long, default_value = podium::config::DEFAULT_DATABASE)]
    database: PathBuf,
}

#[derive(Args)]
struct VerifyArgs {
    /// SQLite warehouse file
    #[arg(long, default_value = podium::config::DEFAULT_DATABASE)]
    database: PathBuf,

    /// Also check the fact row count against the source files in this directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
}

fn run_load(args: LoadArgs) -> Result<()> {
    let config = LoadConfig {
        data_dir: args.data_dir,
        database: args.database,
    };

    let pb = make_spinner(&format!("Loading {} ...", config.database.display()));
    let stats = pipeline::run(&config);
    pb.finish_and_clear();
    let stats = stats?;

    stats.print_summary();
    if let Some(path) = args.report {
        stats.write_json(&path)?;
        info!(path = %path.display(), "Report written");
    }
    Ok(())
}

fn run_verify(args: VerifyArgs) -> Result<()> {
    if !args.database.exists() {
        bail!(
            "Warehouse not found: {}\n\
             Run 'podium load' first.",
            args.database.display()
        );
    }

    let expected = match args.data_dir {
        Some(dir) => {
            let files = SourceFiles::locate(&dir)?;
            Some(SourceData::read(&files)?.result_count())
        }
        None => None,
    };

    let mut warehouse = pipeline::open_warehouse(&args.database)?;
    let report = verify::check(&mut warehouse, expected);
    let closed = warehouse.close();
    let report = report?;
    closed?;

    report.print_summary();
    if !report.is_ok() {
        bail!("Warehouse failed integrity checks");
    }
    Ok(())
}

fn make_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message(msg.to_string());
    pb
}

/// `RUST_LOG` directives win when set; otherwise `-v` picks the level.
fn log_filter(verbose: u8, directives: Option<&str>) -> EnvFilter {
    match directives.map(str::trim) {
        Some(directives) if !directives.is_empty() => EnvFilter::new(directives),
        _ => {
            let level = match verbose {
                0 => LevelFilter::WARN,
                1 => LevelFilter::INFO,
                2 => LevelFilter::DEBUG,
                _ => LevelFilter::TRACE,
            };
            EnvFilter::new(level.to_string())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let rust_log = std::env::var("RUST_LOG").ok();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(cli.verbose, rust_log.as_deref()))
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let result = match cli.command {
        Commands::Load(args) => run_load(args),
        Commands::Schema(args) => pipeline::recreate_schema(&args.database),
        Commands::Verify(args) => run_verify(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_sets_level_without_rust_log() {
        assert_eq!(log_filter(0, None).max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(log_filter(2, None).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(log_filter(9, Some("  ")).max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn rust_log_overrides_verbosity() {
        let filter = log_filter(0, Some("podium=debug"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }
}
