//! cmdb-reconcile command-line entry point
//!
//! Exit codes: 0 success, 1 authentication, 2 transport, 3 malformed data,
//! 4 configuration, 5 other execution errors.

use clap::Parser;
use cmdb_reconcile::{
    Config, DirectoryReportWriter, Error, Reconciler, ReportSink, Result, RunMode,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "cmdb-reconcile")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Remove CMDB relationships whose ends disagree on the company NIT", long_about = None)]
struct Cli {
    /// JSON configuration file; missing fields take their defaults
    #[arg(short, long, env = "RECONCILE_CONFIG")]
    config: Option<PathBuf>,

    /// simulation (default) or execution
    #[arg(short, long)]
    mode: Option<String>,

    /// Read the snapshot from this file instead of downloading it
    #[arg(long)]
    local_snapshot: Option<PathBuf>,

    /// Parent directory for run reports
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Do not write run reports
    #[arg(long)]
    no_report: bool,

    /// Concurrent deletions per target
    #[arg(long)]
    concurrency: Option<usize>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;

    if let Some(mode) = &cli.mode {
        config.mode = mode.parse::<RunMode>()?;
    }
    if let Some(path) = &cli.local_snapshot {
        config.local_snapshot = Some(path.clone());
    }
    if let Some(dir) = &cli.report_dir {
        config.report.directory = dir.clone();
    }
    if cli.no_report {
        config.report.enabled = false;
    }
    if let Some(concurrency) = cli.concurrency {
        config.deletion.concurrency = concurrency;
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let report_config = config.report.clone();

    let reconciler = Reconciler::new(config)?;
    let report = reconciler.run().await?;

    if report_config.enabled {
        let writer = DirectoryReportWriter::new(&report_config.directory);
        let dir = writer.write(&report).await?;
        println!("Report written to {}", dir.display());
    }

    let summary = report.summary();
    println!(
        "{} run: {} normal, {} particular, {} mirrored in the service desk",
        summary.mode, summary.normal, summary.particular, summary.downstream
    );
    println!(
        "  inventory:    {} succeeded, {} simulated, {} failed",
        summary.inventory.succeeded,
        summary.inventory.simulated,
        summary.inventory.failed()
    );
    println!(
        "  service desk: {} succeeded, {} simulated, {} failed",
        summary.service_desk.succeeded,
        summary.service_desk.simulated,
        summary.service_desk.failed()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is normal; real environment variables still apply
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(
        cli.json,
        if cli.verbose { Level::DEBUG } else { Level::INFO },
    );

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "reconciliation failed");
            if let Error::Config { key: Some(key), .. } = &e {
                eprintln!("error: {e} ({key})");
            } else {
                eprintln!("error: {e}");
            }
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
