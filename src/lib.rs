//! Harvester Core Library
//!
//! This library provides the core functionality for the harvester tool,
//! which walks paginated catalog listings, records discovered items in a
//! durable ledger, downloads their archives politely, and extracts them
//! safely into an organized output tree.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection and schema management
//! - [`ledger`] - Durable work-item ledger (the resume/dedup boundary)
//! - [`crawler`] - Paginated discovery with pluggable page extractors
//! - [`download`] - Adaptive rate limiting, validation, streaming fetch
//! - [`extract`] - Secure archive extraction with full pre-validation
//! - [`pipeline`] - Three-phase orchestration with cooperative cancellation
//! - [`config`] - Harvest run configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod crawler;
pub mod db;
pub mod download;
pub mod extract;
pub mod ledger;
pub mod pipeline;

// Re-export commonly used types
pub use config::{Category, ConfigError, HarvestConfig};
pub use crawler::{Crawler, PageExtractor, RegexExtractor};
pub use db::Database;
pub use download::{DownloadError, Downloader, RateLimiter};
pub use extract::{ExtractError, ExtractOptions, SecureExtractor};
pub use ledger::{DiscoveredItem, ItemStatus, Ledger, LedgerError, WorkItem};
pub use pipeline::{CancelFlag, Pipeline, PipelineError, RunReport};
