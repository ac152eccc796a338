//! Sitevisit main entry point
//!
//! This is the command-line interface for the sitevisit harness.

use anyhow::Context;
use clap::Parser;
use sitevisit::config::{
    default_config_with_hash, load_config_with_hash, validate, Config, InstrumentFlags,
};
use sitevisit::crawler::run_crawl;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Sitevisit: visit a list of sites with a pool of instrumented browsers
///
/// Each site gets one command sequence (fetch, then idle). Outcomes and
/// everything the browsers observed are stored in a SQLite database in the
/// data directory.
#[derive(Parser, Debug)]
#[command(name = "sitevisit")]
#[command(version = "1.0.0")]
#[command(about = "Instrumented site-visit harness", long_about = None)]
struct Cli {
    /// Path to TOML configuration file; built-in defaults when omitted
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Override the number of browser workers
    #[arg(long, value_name = "N")]
    workers: Option<u32>,

    /// Override the data directory (the log moves with it)
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Validate config and show what would be visited without visiting
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match load(&cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            setup_logging(cli.verbose, cli.quiet, None);
            tracing::error!("Failed to load configuration: {:#}", e);
            return Err(e);
        }
    };
    let (config, config_hash) = config;

    if cli.dry_run {
        setup_logging(cli.verbose, cli.quiet, None);
        handle_dry_run(&config);
        return Ok(());
    }

    if cli.stats {
        setup_logging(cli.verbose, cli.quiet, None);
        return handle_stats(&config);
    }

    let log_file = open_log_file(Path::new(&config.manager.log_path));
    let log_error = log_file.as_ref().err().map(ToString::to_string);
    setup_logging(cli.verbose, cli.quiet, log_file.ok());
    if let Some(e) = log_error {
        tracing::warn!("Log file unavailable, logging to console only: {}", e);
    }

    tracing::info!("Configuration loaded (hash: {})", config_hash);
    handle_crawl(&config, &config_hash).await
}

/// Loads the configuration and applies command-line overrides
fn load(cli: &Cli) -> anyhow::Result<(Config, String)> {
    let (mut config, hash) = match &cli.config {
        Some(path) => load_config_with_hash(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => default_config_with_hash(),
    };

    if let Some(workers) = cli.workers {
        config.manager.num_browsers = workers;
    }

    if let Some(dir) = &cli.data_dir {
        let log_name = Path::new(&config.manager.log_path)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "crawl.log".into());
        config.manager.data_directory = dir.display().to_string();
        config.manager.log_path = dir.join(log_name).display().to_string();
    }

    validate(&config).context("invalid configuration")?;
    Ok((config, hash))
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// With a log file, a second plain-text layer mirrors everything written to
/// the console.
fn setup_logging(verbose: u8, quiet: bool, log_file: Option<File>) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sitevisit=info,warn"),
            1 => EnvFilter::new("sitevisit=debug,info"),
            2 => EnvFilter::new("sitevisit=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let console = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);

    let file = log_file.map(|file| {
        fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be visited
fn handle_dry_run(config: &Config) {
    println!("=== Sitevisit Dry Run ===\n");

    println!("Manager Configuration:");
    println!("  Browsers: {}", config.manager.num_browsers);
    println!("  Data directory: {}", config.manager.data_directory);
    println!("  Log: {}", config.manager.log_path);
    println!("  Database: {}", config.storage_paths().database_path.display());

    let instruments = InstrumentFlags::from(&config.browser);
    println!("\nBrowser:");
    println!("  Display mode: {}", config.browser.display_mode.as_str());
    println!("  User agent: {}", config.browser.user_agent);
    println!("  Instruments: {}", instruments.enabled().join(", "));

    println!("\nVisit:");
    println!("  Sleep after load: {}s", config.visit.sleep_secs);
    println!("  Action timeout: {}s", config.visit.timeout_secs);

    println!("\nSites ({}):", config.sites.len());
    for (rank, site) in config.sites.iter().enumerate() {
        println!("  {}. {}", rank, site);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would visit {} sites with {} browsers",
        config.sites.len(),
        config.manager.num_browsers
    );
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use sitevisit::output::{load_statistics, print_statistics};
    use sitevisit::storage::SqliteStorage;

    let database = config.storage_paths().database_path;
    println!("Database: {}\n", database.display());

    if !database.exists() {
        anyhow::bail!("no crawl database at {}", database.display());
    }

    let storage = SqliteStorage::open(&database)
        .with_context(|| format!("opening {}", database.display()))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
///
/// Individual site failures do not make the crawl fail; only errors that
/// stop the task manager from starting do.
async fn handle_crawl(config: &Config, config_hash: &str) -> anyhow::Result<()> {
    tracing::info!(
        "Visiting {} sites with {} browsers",
        config.sites.len(),
        config.manager.num_browsers
    );

    match run_crawl(config, config_hash).await {
        Ok(report) => {
            if !report.storage_warnings.is_empty() {
                tracing::warn!(
                    "{} visit(s) could not be stored",
                    report.storage_warnings.len()
                );
            }
            tracing::info!(
                "Crawl {} finished: {}/{} sites succeeded",
                report.crawl_id,
                report.succeeded,
                report.sites
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
