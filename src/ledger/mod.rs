//! Durable work-item ledger backed by `SQLite`.
//!
//! The ledger is the single source of truth for pipeline progress. Items are
//! keyed by their source URL and move through the lifecycle
//! (pending → validating → downloading → downloaded → extracting → extracted)
//! with terminal failure branches. Re-running the pipeline resumes from
//! whatever the ledger recorded.
//!
//! # Overview
//!
//! - [`Ledger`] - Main interface for ledger operations
//! - [`WorkItem`] - Persisted work item with metadata
//! - [`DiscoveredItem`] - Discovery-time metadata for upsert
//! - [`ItemStatus`] - Item lifecycle states
//! - [`LedgerError`] - Operation error types
//!
//! # Example
//!
//! ```ignore
//! use harvester_core::ledger::{DiscoveredItem, ItemStatus, Ledger};
//! use harvester_core::Database;
//!
//! let db = Database::new_in_memory().await?;
//! let ledger = Ledger::new(db);
//!
//! let item = DiscoveredItem {
//!     url: "https://example.com/item/1".to_string(),
//!     download_url: Some("https://example.com/item/1/download".to_string()),
//!     ..DiscoveredItem::default()
//! };
//! ledger.upsert(&item).await?;
//!
//! for item in ledger.list_pending_downloadable(100).await? {
//!     // ... fetch the item ...
//! }
//! ```

mod error;
mod item;

pub use error::{LedgerDbErrorKind, LedgerError};
pub use item::{DiscoveredItem, ItemStatus, WorkItem};

use crate::db::Database;
use sqlx::Row;
use tracing::instrument;

/// Returns `Ok(())` if at least one row was affected; otherwise [`LedgerError::ItemNotFound`].
fn check_affected(url: &str, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(LedgerError::ItemNotFound(url.to_string()))
    } else {
        Ok(())
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Ledger manager for pipeline work items.
///
/// Provides atomic operations for tracking discovered items through the
/// pipeline, backed by `SQLite` with WAL mode for concurrent access. Every
/// mutating operation is a single statement, so a crash can never leave a
/// work item half-updated.
#[derive(Debug, Clone)]
pub struct Ledger {
    db: Database,
}

impl Ledger {
    /// Creates a new ledger with the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts or refreshes a work item by source URL.
    ///
    /// Idempotent: repeating the call with identical data leaves exactly one
    /// unchanged record. For an existing URL only the discovery metadata
    /// columns are refreshed; status, paths, and hash are preserved so
    /// re-discovery never regresses pipeline progress.
    ///
    /// New items start as `pending`, or `no_download_url` when discovery
    /// found no resolvable download URL.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the statement fails.
    #[instrument(skip(self, item), fields(url = %item.url, category = %item.category))]
    pub async fn upsert(&self, item: &DiscoveredItem) -> Result<()> {
        let initial_status = if item
            .download_url
            .as_deref()
            .is_some_and(|u| !u.trim().is_empty())
        {
            ItemStatus::Pending
        } else {
            ItemStatus::NoDownloadUrl
        };

        sqlx::query(
            r"INSERT INTO items (
                url, title, category, category_url, page_number,
                author, description, download_url, download_filename,
                file_size, downloads_count, rating, tags, screenshots,
                created_date, updated_date, version, compatibility,
                download_status
              )
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
              ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                category = excluded.category,
                category_url = excluded.category_url,
                page_number = excluded.page_number,
                author = excluded.author,
                description = excluded.description,
                download_url = excluded.download_url,
                download_filename = excluded.download_filename,
                file_size = excluded.file_size,
                downloads_count = excluded.downloads_count,
                rating = excluded.rating,
                tags = excluded.tags,
                screenshots = excluded.screenshots,
                created_date = excluded.created_date,
                updated_date = excluded.updated_date,
                version = excluded.version,
                compatibility = excluded.compatibility",
        )
        .bind(&item.url)
        .bind(&item.title)
        .bind(&item.category)
        .bind(&item.category_url)
        .bind(item.page_number)
        .bind(item.author.as_deref())
        .bind(item.description.as_deref())
        .bind(item.download_url.as_deref())
        .bind(item.download_filename.as_deref())
        .bind(item.file_size.as_deref())
        .bind(item.downloads_count.as_deref())
        .bind(item.rating.as_deref())
        .bind(WorkItem::serialize_list(&item.tags))
        .bind(WorkItem::serialize_list(&item.screenshots))
        .bind(item.created_date.as_deref())
        .bind(item.updated_date.as_deref())
        .bind(item.version.as_deref())
        .bind(item.compatibility.as_deref())
        .bind(initial_status.as_str())
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Gets a work item by source URL.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the query fails.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get(&self, url: &str) -> Result<Option<WorkItem>> {
        let item = sqlx::query_as::<_, WorkItem>(r"SELECT * FROM items WHERE url = ?")
            .bind(url)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(item)
    }

    /// Checks whether a source URL is already in the ledger.
    ///
    /// Used by discovery as the resume/dedup boundary: known URLs are
    /// skipped without re-fetching their detail pages.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the query fails.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn contains(&self, url: &str) -> Result<bool> {
        let result = sqlx::query(r"SELECT COUNT(*) as count FROM items WHERE url = ?")
            .bind(url)
            .fetch_one(self.db.pool())
            .await?;

        Ok(result.get::<i64, _>("count") > 0)
    }

    /// Returns up to `limit` pending items that have a resolved download URL.
    ///
    /// Ordered by discovery time then URL so repeated pulls are stable.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_pending_downloadable(&self, limit: i64) -> Result<Vec<WorkItem>> {
        let items = sqlx::query_as::<_, WorkItem>(
            r"SELECT * FROM items
              WHERE download_status = ?
                AND download_url IS NOT NULL
                AND download_url != ''
              ORDER BY scraped_at ASC, url ASC
              LIMIT ?",
        )
        .bind(ItemStatus::Pending.as_str())
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(items)
    }

    /// Lists items filtered by status, ordered by discovery time.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_by_status(&self, status: ItemStatus) -> Result<Vec<WorkItem>> {
        let items = sqlx::query_as::<_, WorkItem>(
            r"SELECT * FROM items
              WHERE download_status = ?
              ORDER BY scraped_at ASC, url ASC",
        )
        .bind(status.as_str())
        .fetch_all(self.db.pool())
        .await?;

        Ok(items)
    }

    /// Sets the status of an item.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ItemNotFound`] if no item exists with the URL.
    /// Returns [`LedgerError::Database`] if the update fails.
    #[instrument(skip(self), fields(url = %url, status = %status))]
    pub async fn set_status(&self, url: &str, status: ItemStatus) -> Result<()> {
        let result = sqlx::query(r"UPDATE items SET download_status = ? WHERE url = ?")
            .bind(status.as_str())
            .bind(url)
            .execute(self.db.pool())
            .await?;

        check_affected(url, result.rows_affected())
    }

    /// Marks an item as downloaded, recording the archive path and hash.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ItemNotFound`] if no item exists with the URL.
    /// Returns [`LedgerError::Database`] if the update fails.
    #[instrument(skip(self, local_path), fields(url = %url))]
    pub async fn mark_downloaded(
        &self,
        url: &str,
        local_path: &std::path::Path,
        file_hash: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE items
              SET download_status = ?, local_path = ?, file_hash = ?
              WHERE url = ?",
        )
        .bind(ItemStatus::Downloaded.as_str())
        .bind(local_path.to_string_lossy().into_owned())
        .bind(file_hash)
        .bind(url)
        .execute(self.db.pool())
        .await?;

        check_affected(url, result.rows_affected())
    }

    /// Marks an item as extracted, recording the output directory.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ItemNotFound`] if no item exists with the URL.
    /// Returns [`LedgerError::Database`] if the update fails.
    #[instrument(skip(self, extracted_path), fields(url = %url))]
    pub async fn mark_extracted(
        &self,
        url: &str,
        extracted_path: &std::path::Path,
    ) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE items
              SET download_status = ?, extracted_path = ?
              WHERE url = ?",
        )
        .bind(ItemStatus::Extracted.as_str())
        .bind(extracted_path.to_string_lossy().into_owned())
        .bind(url)
        .execute(self.db.pool())
        .await?;

        check_affected(url, result.rows_affected())
    }

    /// Counts items grouped by status.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn counts_by_status(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            r"SELECT download_status, COUNT(*) as count
              FROM items
              GROUP BY download_status
              ORDER BY download_status",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("download_status"), row.get("count")))
            .collect())
    }

    /// Counts items grouped by category.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn counts_by_category(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            r"SELECT category, COUNT(*) as count
              FROM items
              GROUP BY category
              ORDER BY category",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("category"), row.get("count")))
            .collect())
    }

    /// Requeues items stranded in a transient status by an interrupted run.
    ///
    /// `validating` and `downloading` return to `pending` (the payload never
    /// finished, so the whole download is redone); `extracting` returns to
    /// `downloaded` (the archive is on disk, only the swap was cut short).
    /// Called at pipeline start, before any phase pulls work.
    ///
    /// # Returns
    ///
    /// The number of items that were requeued.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if an update fails.
    #[instrument(skip(self))]
    pub async fn reclaim_interrupted(&self) -> Result<u64> {
        let redownload = sqlx::query(
            r"UPDATE items
              SET download_status = ?
              WHERE download_status IN (?, ?)",
        )
        .bind(ItemStatus::Pending.as_str())
        .bind(ItemStatus::Validating.as_str())
        .bind(ItemStatus::Downloading.as_str())
        .execute(self.db.pool())
        .await?;

        let reextract = sqlx::query(
            r"UPDATE items
              SET download_status = ?
              WHERE download_status = ?",
        )
        .bind(ItemStatus::Downloaded.as_str())
        .bind(ItemStatus::Extracting.as_str())
        .execute(self.db.pool())
        .await?;

        Ok(redownload.rows_affected() + reextract.rows_affected())
    }

    /// Returns all terminal-failure items to `pending` for another pass.
    ///
    /// Covers `invalid_url`, `download_failed`, and `extraction_failed`.
    ///
    /// # Returns
    ///
    /// The number of items that were reset.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn reset_failures(&self) -> Result<u64> {
        let result = sqlx::query(
            r"UPDATE items
              SET download_status = ?
              WHERE download_status IN (?, ?, ?)",
        )
        .bind(ItemStatus::Pending.as_str())
        .bind(ItemStatus::InvalidUrl.as_str())
        .bind(ItemStatus::DownloadFailed.as_str())
        .bind(ItemStatus::ExtractionFailed.as_str())
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }
}
