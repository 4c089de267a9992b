//! News-Harvest main entry point
//!
//! This is the command-line interface for the News-Harvest crawler.

use anyhow::{Context, Result};
use clap::Parser;
use news_harvest::config::{load_config, Config};
use news_harvest::output::{load_statistics, print_statistics};
use news_harvest::storage::open_storage;
use news_harvest::{run, RunMode, RunResult, RunTarget};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// News-Harvest: an incremental news article crawler
///
/// News-Harvest crawls the configured news sites, extracts articles into a
/// normalized record, and stores each article URL at most once across runs.
#[derive(Parser, Debug)]
#[command(name = "news-harvest")]
#[command(version)]
#[command(about = "An incremental multi-source news crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Source id to crawl, or "all" for every enabled source
    #[arg(short, long, default_value = "all")]
    source: RunTarget,

    /// Discovery mode: "full" or "incremental"
    #[arg(short, long, default_value = "incremental")]
    mode: RunMode,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the sources that would be crawled
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show stored article counts per source and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = load_config(&cli.config)
        .with_context(|| format!("invalid configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded (hash: {})", config.fingerprint);

    if cli.dry_run {
        handle_dry_run(&config, &cli.source, cli.mode)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(&config, cli.source, cli.mode).await
    }
}

/// Sets up the logging/tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise verbosity flags pick the filter.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            EnvFilter::new("error")
        } else {
            match verbose {
                0 => EnvFilter::new("news_harvest=info,warn"),
                1 => EnvFilter::new("news_harvest=debug,info"),
                2 => EnvFilter::new("news_harvest=trace,debug"),
                _ => EnvFilter::new("trace"),
            }
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config, target: &RunTarget, mode: RunMode) -> Result<()> {
    println!("=== News-Harvest Dry Run ===\n");

    println!("Run:");
    println!("  Mode: {}", mode);
    println!("  Processed index: {}", config.run.state_path);
    println!("  Database: {}", config.run.database_path);
    println!("  Exports: {}", config.run.export_dir);
    println!("  Flush every: {} records", config.run.flush_every);

    println!("\nUser Agent:");
    println!(
        "  {}/{} (+{})",
        config.user_agent.crawler_name,
        config.user_agent.crawler_version,
        config.user_agent.contact_url
    );

    let selected: Vec<_> = match target {
        RunTarget::All => config.enabled_sources().collect(),
        RunTarget::Source(id) => match config.source(id) {
            Some(profile) => vec![profile],
            None => anyhow::bail!("unknown source: {}", id),
        },
    };

    println!("\nSources ({}):", selected.len());
    for profile in selected {
        println!("  - {} ({})", profile.id, profile.display_name());
        println!("    Base URL: {}", profile.base_url);
        println!(
            "    Budget: {} pages, {} workers, {}s delay",
            profile.max_pages, profile.max_workers, profile.delay_seconds
        );
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<()> {
    println!("Database: {}\n", config.run.database_path);

    let storage = open_storage(Path::new(&config.run.database_path))
        .context("failed to open database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, target: RunTarget, mode: RunMode) -> Result<()> {
    let result = run(config, target, mode).await.context("crawl failed")?;
    print_run_summary(&result);
    Ok(())
}

fn print_run_summary(result: &RunResult) {
    let elapsed = result.finished_at - result.started_at;
    println!(
        "\n=== Run finished in {}s{} ===",
        elapsed.num_seconds(),
        if result.interrupted { " (interrupted)" } else { "" }
    );
    for (source, stats) in &result.per_source {
        println!(
            "  {}: {} inserted, {} fetched, {} duplicates, {} rejected, {} fetch failures",
            source,
            stats.inserted,
            stats.pages_fetched,
            stats.duplicates(),
            stats.rejected,
            stats.fetch_failed
        );
    }
    for source in &result.failed_sources {
        println!("  {}: failed", source);
    }
    println!("Total inserted: {}", result.inserted_count);
}
