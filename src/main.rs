use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ecs_inventory::config::{Config, Overrides, Settings};
use ecs_inventory::error::RunError;
use ecs_inventory::inventory::OutputFormat;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Snapshot Huawei Cloud ECS instances with their flavors, ports,
/// security groups and volumes
#[derive(Parser, Debug)]
#[command(name = "ecs-inventory", version, about, long_about = None)]
struct Args {
    /// Project to inventory (overrides HUAWEI_PROJECT_ID)
    #[arg(short, long)]
    project: Option<String>,

    /// Region to inventory (overrides HUAWEI_REGION)
    #[arg(short, long)]
    region: Option<String>,

    /// Account label used in the snapshot and its file name
    #[arg(long)]
    account: Option<String>,

    /// Directory the snapshot is written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Snapshot format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Servers requested per listing page
    #[arg(long)]
    page_size: Option<usize>,

    /// Servers enriched in parallel
    #[arg(long)]
    concurrency: Option<usize>,

    /// Attempts per API call before giving up
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Base URL used for every service instead of the regional endpoints
    #[arg(long)]
    endpoint: Option<String>,

    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn setup_logging(
    level: LogLevel,
    log_file: Option<&PathBuf>,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let (writer, guard) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(log_file.is_none())
        .with_target(true)
        .with_thread_ids(false)
        .init();

    Ok(guard)
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            project_id: self.project.clone(),
            region: self.region.clone(),
            account: self.account.clone(),
            output_dir: self.output_dir.clone(),
            format: self.format,
            page_size: self.page_size,
            concurrency: self.concurrency,
            max_attempts: self.max_attempts,
            endpoint: self.endpoint.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = match setup_logging(args.log_level, args.log_file.as_ref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error: {err:?}");
            return ExitCode::FAILURE;
        }
    };

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {err:#}");
            exit_code(&err)
        }
    }
}

async fn run(args: &Args) -> Result<()> {
    let file = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let settings = Settings::from_env(&file, &args.overrides()).map_err(RunError::Config)?;

    let report = ecs_inventory::run(&settings).await?;

    println!("Data saved to {}", report.path.display());
    println!(
        "Servers: {} total, {} fully enriched, {} partially enriched, {} failed",
        report.stats.total,
        report.stats.fully_enriched,
        report.stats.partially_enriched,
        report.stats.fatally_failed
    );
    Ok(())
}

/// Configuration problems exit with 2, everything else with 1
fn exit_code(err: &anyhow::Error) -> ExitCode {
    let config_error = matches!(err.downcast_ref::<RunError>(), Some(RunError::Config(_)))
        || err
            .downcast_ref::<ecs_inventory::error::ConfigError>()
            .is_some();

    if config_error {
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}
