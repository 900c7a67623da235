//! CLI entry point for the harvester tool.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use harvester_core::{
    Database, HarvestConfig, Ledger, Pipeline, RateLimiter, RegexExtractor,
    crawler::PageExtractor,
};
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let db = Database::new(&args.db)
        .await
        .context("failed to open ledger database")?;
    let ledger = Ledger::new(db);

    // Maintenance modes run against the ledger and exit.
    if args.report {
        return print_report(&ledger).await;
    }
    if args.reset_failures {
        let reset = ledger.reset_failures().await?;
        info!(reset, "failed items returned to pending");
        return Ok(());
    }

    let config_path = args
        .config
        .as_deref()
        .context("a config file is required: pass --config harvest.json")?;
    let config = HarvestConfig::load(config_path)?;
    info!(
        categories = config.categories.len(),
        output = %args.output.display(),
        "harvester starting"
    );

    let limiter = Arc::new(RateLimiter::new(
        Duration::from_millis(args.min_delay),
        Duration::from_millis(args.max_delay),
    ));
    let extractor: Arc<dyn PageExtractor> = Arc::new(RegexExtractor::from_patterns(
        &config.item_link_pattern,
        config.next_link_pattern.as_deref(),
    )?);

    let pipeline = Pipeline::new(ledger, limiter, extractor, &args.output)?
        .with_batch_size(args.batch_size)
        .with_max_pages(usize::try_from(args.max_pages).unwrap_or(50));

    // Ctrl-C requests a cooperative stop; a second Ctrl-C kills the process.
    let cancel = pipeline.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current items then stopping");
            cancel.cancel();
        }
    });

    let report = pipeline.run(&config.categories).await?;

    info!(
        categories = report.categories_crawled,
        discovered = report.items_discovered,
        skipped_known = report.items_skipped_known,
        downloaded = report.downloads_completed,
        invalid = report.downloads_invalid,
        download_failures = report.downloads_failed,
        extracted = report.extractions_completed,
        extraction_failures = report.extractions_failed,
        cancelled = report.cancelled,
        "harvest complete"
    );

    Ok(())
}

async fn print_report(ledger: &Ledger) -> Result<()> {
    println!("By status:");
    for (status, count) in ledger.counts_by_status().await? {
        println!("  {status:<20} {count}");
    }
    println!("By category:");
    for (category, count) in ledger.counts_by_category().await? {
        println!("  {category:<20} {count}");
    }
    Ok(())
}
