//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Harvest paginated catalogs: discover, download, extract.
///
/// Harvester walks category listings described by a config file, records
/// every discovered item in a SQLite ledger, downloads the item archives
/// with adaptive pacing, and extracts them into an organized output tree.
/// Re-running resumes from the ledger.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
pub struct Args {
    /// Path to the harvest config file (categories and link patterns)
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    /// Output directory (receives downloads/ and extracted/ subtrees)
    #[arg(short, long, default_value = "./output")]
    pub output: PathBuf,

    /// Path to the ledger database file
    #[arg(long, default_value = "./harvester.db")]
    pub db: PathBuf,

    /// Items pulled from the ledger per download batch (1-500)
    #[arg(short = 'b', long, default_value_t = 100, value_parser = clap::value_parser!(i64).range(1..=500))]
    pub batch_size: i64,

    /// Maximum listing pages walked per category (1-50)
    #[arg(short = 'p', long, default_value_t = 50, value_parser = clap::value_parser!(u64).range(1..=50))]
    pub max_pages: u64,

    /// Initial/minimum delay between requests in milliseconds (max 60000)
    #[arg(long, default_value_t = 500, value_parser = clap::value_parser!(u64).range(1..=60000))]
    pub min_delay: u64,

    /// Maximum adaptive delay between requests in milliseconds (max 600000)
    #[arg(long, default_value_t = 60000, value_parser = clap::value_parser!(u64).range(1..=600_000))]
    pub max_delay: u64,

    /// Print ledger counts by status and category, then exit
    #[arg(long)]
    pub report: bool,

    /// Reset failed items back to pending, then exit
    #[arg(long)]
    pub reset_failures: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
