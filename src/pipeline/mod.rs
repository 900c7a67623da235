//! Three-phase harvest orchestration: discover, download, extract.
//!
//! # Overview
//!
//! Each phase reads its work from the ledger rather than from the previous
//! phase's in-memory output, so a run killed at any point resumes cleanly:
//! discovery skips known URLs, the download phase pulls whatever is
//! `pending`, and the extract phase pulls whatever is `downloaded`.
//!
//! Downloads run in batches pulled from the ledger, each batch fetched
//! concurrently; extraction is sequential (it is disk-bound and the atomic
//! swap makes concurrent extraction of the same destination pointless).
//!
//! Cancellation is cooperative: the flag is checked between categories,
//! between batches, and between items, never mid-transfer of a payload that
//! is already being written (the item-level operations are themselves
//! crash-safe through the ledger).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::Category;
use crate::crawler::{CrawlError, Crawler, PageExtractor};
use crate::download::{DownloadError, Downloader, RateLimiter, fallback_filename, sanitize_name};
use crate::extract::SecureExtractor;
use crate::ledger::{ItemStatus, Ledger, LedgerError, WorkItem};

/// Default number of items pulled from the ledger per download batch.
pub const DEFAULT_BATCH_SIZE: i64 = 100;

/// Cooperative cancellation flag shared between the pipeline and signal
/// handlers. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Creates a new, unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Errors that abort a whole run (item-level failures are recorded in the
/// ledger instead).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Ledger operation failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A category crawl failed.
    #[error(transparent)]
    Crawl(#[from] CrawlError),

    /// The downloader could not be constructed.
    #[error(transparent)]
    Download(#[from] DownloadError),
}

/// Counters for a completed (or cancelled) run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunReport {
    /// Categories whose crawl finished.
    pub categories_crawled: usize,
    /// Items upserted by discovery.
    pub items_discovered: usize,
    /// Item links discovery skipped as already known.
    pub items_skipped_known: usize,
    /// Items whose download completed and verified.
    pub downloads_completed: u64,
    /// Items that failed validation (`invalid_url`).
    pub downloads_invalid: u64,
    /// Items whose fetch failed (`download_failed`).
    pub downloads_failed: u64,
    /// Items fully extracted.
    pub extractions_completed: u64,
    /// Items whose extraction failed.
    pub extractions_failed: u64,
    /// Whether the run stopped early on cancellation.
    pub cancelled: bool,
}

/// Orchestrates the discover, download, and extract phases.
pub struct Pipeline {
    ledger: Ledger,
    crawler: Crawler,
    downloader: Downloader,
    extractor: SecureExtractor,
    downloads_dir: PathBuf,
    extracted_dir: PathBuf,
    batch_size: i64,
    cancel: CancelFlag,
}

impl Pipeline {
    /// Builds a pipeline around a ledger and a shared rate limiter.
    ///
    /// `output_dir` receives `downloads/` and `extracted/` subtrees.
    ///
    /// # Errors
    ///
    /// Returns an error when an HTTP client cannot be constructed.
    pub fn new(
        ledger: Ledger,
        limiter: Arc<RateLimiter>,
        page_extractor: Arc<dyn PageExtractor>,
        output_dir: &Path,
    ) -> Result<Self, PipelineError> {
        let crawler = Crawler::new(Arc::clone(&limiter), page_extractor)?;
        let downloader = Downloader::new(limiter)?;
        Ok(Self {
            ledger,
            crawler,
            downloader,
            extractor: SecureExtractor::new(),
            downloads_dir: output_dir.join("downloads"),
            extracted_dir: output_dir.join("extracted"),
            batch_size: DEFAULT_BATCH_SIZE,
            cancel: CancelFlag::new(),
        })
    }

    /// Overrides the download batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Caps the listing pages walked per category.
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.crawler = self.crawler.with_max_pages(max_pages);
        self
    }

    /// Overrides the secure extractor (used by tests to shrink the caps).
    #[must_use]
    pub fn with_extractor(mut self, extractor: SecureExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Returns a handle to the cancellation flag for signal handlers.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Runs all three phases over the given categories.
    ///
    /// # Errors
    ///
    /// Returns an error when a phase fails in a way that is not an
    /// item-level failure (listing fetch, ledger access, client setup).
    #[instrument(skip(self, categories), fields(categories = categories.len()))]
    pub async fn run(&self, categories: &[Category]) -> Result<RunReport, PipelineError> {
        let mut report = RunReport::default();

        // Items a previous run left mid-flight are requeued before any phase
        // reads the ledger, so a crash never strands work.
        let reclaimed = self.ledger.reclaim_interrupted().await?;
        if reclaimed > 0 {
            info!(reclaimed, "requeued items interrupted by a previous run");
        }

        self.discover_phase(categories, &mut report).await?;
        self.download_phase(&mut report).await?;
        self.extract_phase(&mut report).await?;

        report.cancelled = self.cancel.is_cancelled();
        info!(
            discovered = report.items_discovered,
            downloaded = report.downloads_completed,
            extracted = report.extractions_completed,
            cancelled = report.cancelled,
            "run finished"
        );
        Ok(report)
    }

    async fn discover_phase(
        &self,
        categories: &[Category],
        report: &mut RunReport,
    ) -> Result<(), PipelineError> {
        for category in categories {
            if self.cancel.is_cancelled() {
                info!(category = %category.name, "cancelled before category");
                return Ok(());
            }
            // A category whose listing cannot be fetched is abandoned; the
            // remaining categories (and the later phases) still run. Only a
            // ledger failure aborts the run.
            match self
                .crawler
                .crawl_category(&self.ledger, &category.name, &category.url, &self.cancel)
                .await
            {
                Ok(stats) => {
                    report.categories_crawled += 1;
                    report.items_discovered += stats.items_discovered;
                    report.items_skipped_known += stats.items_skipped_known;
                }
                Err(CrawlError::Ledger(e)) => return Err(e.into()),
                Err(e) => {
                    warn!(category = %category.name, error = %e, "category crawl failed, moving on");
                }
            }
        }
        Ok(())
    }

    async fn download_phase(&self, report: &mut RunReport) -> Result<(), PipelineError> {
        let completed = Arc::new(AtomicU64::new(0));
        let invalid = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicU64::new(0));

        loop {
            if self.cancel.is_cancelled() {
                info!("cancelled before download batch");
                break;
            }
            let batch = self.ledger.list_pending_downloadable(self.batch_size).await?;
            if batch.is_empty() {
                break;
            }
            debug!(size = batch.len(), "download batch pulled");

            let mut handles = Vec::with_capacity(batch.len());
            for item in batch {
                if self.cancel.is_cancelled() {
                    break;
                }
                let ledger = self.ledger.clone();
                let downloader = self.downloader.clone();
                // One flat file per payload: <downloads>/<category>/<item>_<filename>.
                let dest_dir = self.downloads_dir.join(sanitize_name(&item.category));
                let name_prefix = item_dir_name(&item);
                let completed = Arc::clone(&completed);
                let invalid = Arc::clone(&invalid);
                let failed = Arc::clone(&failed);
                handles.push(tokio::spawn(async move {
                    download_one(
                        &ledger,
                        &downloader,
                        &item,
                        &dest_dir,
                        &name_prefix,
                        &completed,
                        &invalid,
                        &failed,
                    )
                    .await;
                }));
            }

            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "download task aborted");
                    failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        report.downloads_completed = completed.load(Ordering::Relaxed);
        report.downloads_invalid = invalid.load(Ordering::Relaxed);
        report.downloads_failed = failed.load(Ordering::Relaxed);
        Ok(())
    }

    async fn extract_phase(&self, report: &mut RunReport) -> Result<(), PipelineError> {
        let downloaded = self.ledger.list_by_status(ItemStatus::Downloaded).await?;
        for item in downloaded {
            if self.cancel.is_cancelled() {
                info!("cancelled before extraction item");
                break;
            }
            let Some(local_path) = item.local_path.clone() else {
                warn!(url = %item.url, "downloaded item has no local path");
                self.ledger
                    .set_status(&item.url, ItemStatus::ExtractionFailed)
                    .await?;
                report.extractions_failed += 1;
                continue;
            };

            self.ledger
                .set_status(&item.url, ItemStatus::Extracting)
                .await?;

            let dest = self
                .extracted_dir
                .join(sanitize_name(&item.category))
                .join(item_dir_name(&item));
            let extractor = self.extractor.clone();
            let archive = PathBuf::from(local_path);
            let dest_for_task = dest.clone();
            let result = tokio::task::spawn_blocking(move || {
                extractor.extract(&archive, &dest_for_task)
            })
            .await;

            match result {
                Ok(Ok(summary)) => {
                    self.ledger.mark_extracted(&item.url, &dest).await?;
                    report.extractions_completed += 1;
                    debug!(url = %item.url, files = summary.files_written, "extracted");
                }
                Ok(Err(e)) => {
                    warn!(url = %item.url, error = %e, "extraction failed");
                    self.ledger
                        .set_status(&item.url, ItemStatus::ExtractionFailed)
                        .await?;
                    report.extractions_failed += 1;
                }
                Err(e) => {
                    warn!(url = %item.url, error = %e, "extraction task aborted");
                    self.ledger
                        .set_status(&item.url, ItemStatus::ExtractionFailed)
                        .await?;
                    report.extractions_failed += 1;
                }
            }
        }
        Ok(())
    }
}

/// Validates and fetches a single item, recording the outcome in the ledger.
///
/// Ledger write failures are logged rather than propagated; the item will be
/// retried or inspected on the next run.
#[allow(clippy::too_many_arguments)]
async fn download_one(
    ledger: &Ledger,
    downloader: &Downloader,
    item: &WorkItem,
    dest_dir: &Path,
    name_prefix: &str,
    completed: &AtomicU64,
    invalid: &AtomicU64,
    failed: &AtomicU64,
) {
    let Some(download_url) = item.download_url.clone() else {
        // list_pending_downloadable filters these out; belt and braces.
        return;
    };

    if let Err(e) = ledger.set_status(&item.url, ItemStatus::Validating).await {
        warn!(url = %item.url, error = %e, "failed to mark validating");
        return;
    }

    match downloader.validate(&download_url).await {
        Ok(true) => {}
        Ok(false) => {
            record_status(ledger, &item.url, ItemStatus::InvalidUrl).await;
            invalid.fetch_add(1, Ordering::Relaxed);
            return;
        }
        Err(e) => {
            warn!(url = %item.url, error = %e, "validation rejected URL");
            record_status(ledger, &item.url, ItemStatus::InvalidUrl).await;
            invalid.fetch_add(1, Ordering::Relaxed);
            return;
        }
    }

    record_status(ledger, &item.url, ItemStatus::Downloading).await;

    match downloader.fetch(&download_url, dest_dir, Some(name_prefix)).await {
        Ok(outcome) => {
            match ledger
                .mark_downloaded(&item.url, &outcome.path, &outcome.sha256_hex)
                .await
            {
                Ok(()) => {
                    completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(url = %item.url, error = %e, "failed to record download");
                    failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Err(e) => {
            warn!(url = %item.url, error = %e, "fetch failed");
            record_status(ledger, &item.url, ItemStatus::DownloadFailed).await;
            failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

async fn record_status(ledger: &Ledger, url: &str, status: ItemStatus) {
    if let Err(e) = ledger.set_status(url, status).await {
        warn!(url = %url, status = %status, error = %e, "failed to record status");
    }
}

/// Per-item name under the category: the sanitized title, or a URL-hash name
/// when the title is unusable. Used as the download filename prefix and as
/// the extraction directory name.
fn item_dir_name(item: &WorkItem) -> String {
    let name = sanitize_name(&item.title);
    if name == "unnamed" {
        fallback_filename(&item.url)
            .trim_end_matches(".zip")
            .to_string()
    } else {
        name
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_item(title: &str, url: &str) -> WorkItem {
        WorkItem {
            url: url.to_string(),
            title: title.to_string(),
            category: "mods".to_string(),
            category_url: "https://example.com/mods".to_string(),
            page_number: 1,
            author: None,
            description: None,
            download_url: Some("https://example.com/a.zip".to_string()),
            download_filename: None,
            file_size: None,
            downloads_count: None,
            rating: None,
            tags: None,
            screenshots: None,
            created_date: None,
            updated_date: None,
            version: None,
            compatibility: None,
            scraped_at: "2026-01-01".to_string(),
            status_str: "pending".to_string(),
            local_path: None,
            extracted_path: None,
            file_hash: None,
        }
    }

    #[test]
    fn test_cancel_flag_shared_between_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_item_dir_name_sanitizes_title() {
        let item = sample_item("My Mod: Deluxe", "https://example.com/mods/1");
        assert_eq!(item_dir_name(&item), "My Mod_ Deluxe");
    }

    #[test]
    fn test_item_dir_name_falls_back_to_url_hash() {
        let item = sample_item("", "https://example.com/mods/1");
        let name = item_dir_name(&item);
        assert!(name.starts_with("item_"), "Expected hashed name: {name}");
        assert!(!name.ends_with(".zip"));
    }
}
