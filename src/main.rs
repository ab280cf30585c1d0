//! Supplier-Quotes main entry point
//!
//! This is the command-line interface for the Supplier-Quotes price ledger.

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use supplier_quotes::compare::{compare_all, ComparisonResponse, ComparisonSettings};
use supplier_quotes::config::{load_config_with_hash, parse_timezone, Config};
use supplier_quotes::ingest::{ingest_many, RetryPolicy};
use supplier_quotes::output::{
    generate_markdown_report, load_statistics, print_statistics, render_response,
};
use supplier_quotes::record::read_envelopes;
use supplier_quotes::storage::{QuoteStore, SqliteStore};
use tracing_subscriber::EnvFilter;

/// Supplier-Quotes: a cross-supplier price ledger
///
/// Stores the price and stock snapshots scraped from each supplier, keeps one
/// live row per (supplier, product code) and reports the best offer for
/// every product.
#[derive(Parser, Debug)]
#[command(name = "supplier-quotes")]
#[command(version = "1.0.0")]
#[command(about = "A cross-supplier price ledger", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest supplier batch files (one envelope or an array per file)
    Ingest {
        /// JSON batch files
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,

        /// Do not update the processing marker after a successful batch
        #[arg(long)]
        no_mark: bool,
    },

    /// Print the best-offer comparison as JSON
    Compare {
        /// Fold variation codes under their parent code
        #[arg(long)]
        group_variants: bool,

        /// Indent the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Record the last successful processing time
    MarkProcessed {
        /// Timestamp to store instead of now
        #[arg(long, value_name = "RFC3339")]
        at: Option<DateTime<Utc>>,
    },

    /// Delete every lot, item and regional detail
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Show statistics from the database and exit
    Stats,

    /// Write the markdown comparison report
    ExportReport,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let store = SqliteStore::from_config(&config.storage)
        .with_context(|| format!("opening database {}", config.storage.database_path))?
        .with_legacy_timezone(parse_timezone(&config.comparison.timezone)?);

    match cli.command {
        Command::Ingest { files, no_mark } => handle_ingest(&config, store, &files, !no_mark).await,
        Command::Compare {
            group_variants,
            pretty,
        } => handle_compare(&config, &store, group_variants, pretty),
        Command::MarkProcessed { at } => handle_mark_processed(&store, at),
        Command::Reset { yes } => handle_reset(&store, yes),
        Command::Stats => handle_stats(&config, &store),
        Command::ExportReport => handle_export_report(&config, &store),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("supplier_quotes=info,warn"),
            1 => EnvFilter::new("supplier_quotes=debug,info"),
            2 => EnvFilter::new("supplier_quotes=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // Logs go to stderr so JSON on stdout stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles `ingest`: loads every file and ingests the batches concurrently
async fn handle_ingest(
    config: &Config,
    store: SqliteStore,
    files: &[PathBuf],
    mark_done: bool,
) -> anyhow::Result<()> {
    let mut envelopes = Vec::new();
    for path in files {
        let loaded =
            read_envelopes(path).with_context(|| format!("reading {}", path.display()))?;
        envelopes.extend(loaded);
    }

    tracing::info!(
        "Ingesting {} batch(es) from {} file(s)",
        envelopes.len(),
        files.len()
    );

    let policy = RetryPolicy::from_config(&config.ingest);
    let outcomes = ingest_many(Arc::new(store), envelopes, policy, mark_done).await?;

    println!("{}", serde_json::to_string_pretty(&outcomes)?);

    let failed = outcomes.iter().filter(|o| !o.success).count();
    if failed > 0 {
        bail!("{} of {} batch(es) failed", failed, outcomes.len());
    }

    Ok(())
}

/// Handles `compare`: prints the comparison payload
fn handle_compare(
    config: &Config,
    store: &SqliteStore,
    group_variants: bool,
    pretty: bool,
) -> anyhow::Result<()> {
    let settings = ComparisonSettings::from_config(&config.comparison)?;
    let grouped = group_variants || settings.group_variants;

    let response = ComparisonResponse::from_result(compare_all(store, &settings), grouped);
    println!("{}", render_response(&response, pretty)?);

    if !response.is_success() {
        bail!("comparison failed");
    }

    Ok(())
}

/// Handles `mark-processed`
fn handle_mark_processed(store: &SqliteStore, at: Option<DateTime<Utc>>) -> anyhow::Result<()> {
    let stored = store.mark_processed(at)?;
    println!("✓ Marked processed at {}", stored.to_rfc3339());
    Ok(())
}

/// Handles `reset`: empties the store after confirmation
fn handle_reset(store: &SqliteStore, yes: bool) -> anyhow::Result<()> {
    if !yes {
        bail!("refusing to reset {} without --yes", store.path().display());
    }

    store.reset()?;
    println!("✓ Store reset: {}", store.path().display());
    Ok(())
}

/// Handles `stats`: shows statistics from the database
fn handle_stats(config: &Config, store: &SqliteStore) -> anyhow::Result<()> {
    let settings = ComparisonSettings::from_config(&config.comparison)?;

    println!("Database: {}\n", config.storage.database_path);

    let stats = load_statistics(store)?;
    print_statistics(&stats, &settings.timezone);

    Ok(())
}

/// Handles `export-report`: writes the markdown comparison report
fn handle_export_report(config: &Config, store: &SqliteStore) -> anyhow::Result<()> {
    let settings = ComparisonSettings::from_config(&config.comparison)?;
    let output_path = Path::new(&config.output.report_path);

    println!("=== Exporting Comparison Report ===\n");
    println!("Database: {}", config.storage.database_path);
    println!("Output: {}", config.output.report_path);
    println!();

    tracing::info!("Loading offers from database...");
    let report = compare_all(store, &settings)?;

    tracing::info!("Generating markdown report...");
    generate_markdown_report(&report, output_path)?;

    println!("✓ Report exported to: {}", config.output.report_path);

    Ok(())
}
