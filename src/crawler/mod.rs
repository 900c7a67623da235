//! Paginated discovery of catalog items.
//!
//! # Overview
//!
//! The crawler walks a category's listing pages (capped at
//! [`MAX_LISTING_PAGES`]), follows each item link to its detail page, and
//! upserts the scraped metadata into the ledger. URLs the ledger already
//! knows are skipped without a detail fetch, which is what makes re-runs
//! cheap. Every page request goes through the shared rate-limiter gate.
//!
//! A listing page that fails to fetch aborts the category (the rest of the
//! walk depends on it); a detail page that fails is logged and skipped.

mod extractor;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use crate::download::rate_limiter::parse_retry_after;
use crate::download::{RateLimiter, filename_from_url};
use crate::ledger::{DiscoveredItem, Ledger, LedgerError};
use crate::pipeline::CancelFlag;

pub use extractor::{ItemDetails, PageExtractor, RegexExtractor};

/// Hard cap on listing pages walked per category.
pub const MAX_LISTING_PAGES: usize = 50;

/// Errors that abort a category crawl.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The HTTP client could not be constructed.
    #[error("failed to build crawler HTTP client: {message}")]
    Client {
        /// Builder failure text.
        message: String,
    },

    /// The category listing URL does not parse.
    #[error("invalid listing URL: {url}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
    },

    /// A listing page failed to fetch; the walk cannot continue.
    #[error("failed to fetch listing page {url}: {message}")]
    Listing {
        /// The listing page URL.
        url: String,
        /// Transport or status failure text.
        message: String,
    },

    /// Ledger write failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Per-category crawl counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryStats {
    /// Listing pages visited.
    pub pages_visited: usize,
    /// New or refreshed items upserted into the ledger.
    pub items_discovered: usize,
    /// Item links skipped because the ledger already knew them.
    pub items_skipped_known: usize,
    /// Detail pages that failed to fetch.
    pub detail_failures: usize,
}

/// Walks category listings and records discovered items in the ledger.
pub struct Crawler {
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    extractor: Arc<dyn PageExtractor>,
    max_pages: usize,
}

impl Crawler {
    /// Creates a crawler sharing the pipeline's rate limiter.
    ///
    /// # Errors
    ///
    /// Returns `CrawlError::Client` when the HTTP client cannot be built.
    pub fn new(
        limiter: Arc<RateLimiter>,
        extractor: Arc<dyn PageExtractor>,
    ) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .read_timeout(std::time::Duration::from_secs(READ_TIMEOUT_SECS))
            .gzip(true)
            .build()
            .map_err(|e| CrawlError::Client {
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            limiter,
            extractor,
            max_pages: MAX_LISTING_PAGES,
        })
    }

    /// Overrides the listing page cap (clamped to [`MAX_LISTING_PAGES`]).
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.clamp(1, MAX_LISTING_PAGES);
        self
    }

    /// Crawls one category: listing pages, item links, detail pages, upserts.
    ///
    /// Cancellation is honored between pages and between items; work already
    /// persisted stays persisted.
    ///
    /// # Errors
    ///
    /// Returns an error when the listing URL is invalid, a listing page
    /// fails to fetch, or a ledger write fails.
    #[instrument(skip(self, ledger, cancel), fields(category = %category_name))]
    pub async fn crawl_category(
        &self,
        ledger: &Ledger,
        category_name: &str,
        listing_url: &str,
        cancel: &CancelFlag,
    ) -> Result<CategoryStats, CrawlError> {
        let mut page_url = Url::parse(listing_url).map_err(|_| CrawlError::InvalidUrl {
            url: listing_url.to_string(),
        })?;
        let mut stats = CategoryStats::default();

        for page_number in 1..=self.max_pages {
            if cancel.is_cancelled() {
                info!(page = page_number, "cancelled before listing page");
                break;
            }

            let html = self.fetch_page(page_url.as_str()).await.map_err(|message| {
                CrawlError::Listing {
                    url: page_url.to_string(),
                    message,
                }
            })?;
            stats.pages_visited += 1;

            let item_urls = self.extractor.item_urls(&html, &page_url);
            debug!(page = page_number, items = item_urls.len(), "listing page parsed");

            for item_url in item_urls {
                if cancel.is_cancelled() {
                    info!("cancelled mid-page");
                    return Ok(stats);
                }
                if ledger.contains(item_url.as_str()).await? {
                    stats.items_skipped_known += 1;
                    continue;
                }
                match self
                    .scrape_item(category_name, listing_url, page_number, &item_url)
                    .await
                {
                    Ok(item) => {
                        ledger.upsert(&item).await?;
                        stats.items_discovered += 1;
                    }
                    Err(message) => {
                        warn!(url = %item_url, error = %message, "detail page failed, skipping item");
                        stats.detail_failures += 1;
                    }
                }
            }

            match self.extractor.next_page(&html, &page_url) {
                Some(next) => page_url = next,
                None => break,
            }
        }

        info!(
            pages = stats.pages_visited,
            discovered = stats.items_discovered,
            skipped = stats.items_skipped_known,
            failures = stats.detail_failures,
            "category crawl finished"
        );
        Ok(stats)
    }

    async fn scrape_item(
        &self,
        category_name: &str,
        listing_url: &str,
        page_number: usize,
        item_url: &Url,
    ) -> Result<DiscoveredItem, String> {
        let html = self.fetch_page(item_url.as_str()).await?;
        let details = self.extractor.item_details(&html, item_url);
        Ok(discovered_from_details(
            item_url.as_str(),
            category_name,
            listing_url,
            page_number,
            details,
        ))
    }

    /// Fetches one page through the shared pacing gate, returning its body.
    async fn fetch_page(&self, url: &str) -> Result<String, String> {
        self.limiter.wait().await;
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                self.limiter.on_error().await;
                return Err(e.to_string());
            }
        };

        let status = response.status();
        if status.as_u16() == 429 {
            if let Some(delay) = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after)
            {
                self.limiter.apply_server_delay(delay).await;
            }
            self.limiter.on_rate_limited().await;
            return Err(format!("HTTP {status}"));
        }
        if !status.is_success() {
            self.limiter.on_error().await;
            return Err(format!("HTTP {status}"));
        }

        match response.text().await {
            Ok(body) => {
                self.limiter.on_success().await;
                Ok(body)
            }
            Err(e) => {
                self.limiter.on_error().await;
                Err(e.to_string())
            }
        }
    }
}

fn discovered_from_details(
    url: &str,
    category_name: &str,
    listing_url: &str,
    page_number: usize,
    details: ItemDetails,
) -> DiscoveredItem {
    let download_url = none_if_empty(details.download_url);
    // The name the server would suggest for the payload, when the URL has a
    // usable last segment. Purely informational; the downloader re-resolves
    // the name against response headers at fetch time.
    let download_filename = download_url
        .as_deref()
        .and_then(|raw| Url::parse(raw).ok())
        .and_then(|parsed| filename_from_url(&parsed));
    DiscoveredItem {
        url: url.to_string(),
        title: details.title,
        category: category_name.to_string(),
        category_url: listing_url.to_string(),
        page_number: i64::try_from(page_number).unwrap_or(i64::MAX),
        author: none_if_empty(details.author),
        description: none_if_empty(details.description),
        download_url,
        download_filename,
        file_size: none_if_empty(details.file_size),
        downloads_count: none_if_empty(details.downloads_count),
        rating: none_if_empty(details.rating),
        tags: details.tags,
        screenshots: details.screenshots,
        created_date: none_if_empty(details.created_date),
        updated_date: none_if_empty(details.updated_date),
        version: none_if_empty(details.version),
        compatibility: none_if_empty(details.compatibility),
    }
}

fn none_if_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}
