//! Validation and retrieval of archive payloads.
//!
//! This module owns everything between a pending ledger item and a verified
//! file on disk: the shared adaptive rate limiter, the HEAD pre-flight
//! validation, the streaming fetch with incremental hashing and a hard byte
//! cap, and filename resolution.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use harvester_core::download::{Downloader, RateLimiter};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = Arc::new(RateLimiter::with_defaults());
//! let downloader = Downloader::new(limiter)?;
//! let outcome = downloader
//!     .fetch("https://example.com/pack.zip", Path::new("./downloads/mods"), None)
//!     .await?;
//! println!("sha256: {}", outcome.sha256_hex);
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod error;
mod filename;
pub mod rate_limiter;

pub use client::{Downloader, FetchOutcome};
pub use constants::MAX_ARCHIVE_BYTES;
pub use error::DownloadError;
pub use filename::{
    ARCHIVE_EXTENSIONS, fallback_filename, filename_from_url, has_archive_extension,
    parse_content_disposition, resolve_filename, sanitize_name,
};
pub use rate_limiter::{RateLimiter, parse_retry_after};
