//! Work-item types and status definitions.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Pipeline status of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Discovered, waiting for the download phase.
    Pending,
    /// Download URL is being probed.
    Validating,
    /// Payload is being fetched.
    Downloading,
    /// Archive saved to disk, waiting for extraction.
    Downloaded,
    /// Archive is being unpacked.
    Extracting,
    /// Fully unpacked into the output tree.
    Extracted,
    /// Download URL failed validation (oversized or wrong content type).
    InvalidUrl,
    /// Discovery found no resolvable download URL; excluded from downloads.
    NoDownloadUrl,
    /// Fetch failed (network error, HTTP error, or byte-cap abort).
    DownloadFailed,
    /// Extraction failed (corrupt archive or security violation).
    ExtractionFailed,
}

impl ItemStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validating => "validating",
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::Extracting => "extracting",
            Self::Extracted => "extracted",
            Self::InvalidUrl => "invalid_url",
            Self::NoDownloadUrl => "no_download_url",
            Self::DownloadFailed => "download_failed",
            Self::ExtractionFailed => "extraction_failed",
        }
    }

    /// Returns true for terminal failure statuses an operator may reset
    /// back to `pending`.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidUrl | Self::DownloadFailed | Self::ExtractionFailed
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "validating" => Ok(Self::Validating),
            "downloading" => Ok(Self::Downloading),
            "downloaded" => Ok(Self::Downloaded),
            "extracting" => Ok(Self::Extracting),
            "extracted" => Ok(Self::Extracted),
            "invalid_url" => Ok(Self::InvalidUrl),
            "no_download_url" => Ok(Self::NoDownloadUrl),
            "download_failed" => Ok(Self::DownloadFailed),
            "extraction_failed" => Ok(Self::ExtractionFailed),
            _ => Err(format!("invalid item status: {s}")),
        }
    }
}

/// Metadata captured at discovery time for a new work item.
///
/// Field values beyond `url`/`category` are opaque to the pipeline; they are
/// persisted as-is for downstream tooling.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredItem {
    /// Source detail-page URL. Identity of the work item.
    pub url: String,
    /// Human-readable item title.
    pub title: String,
    /// Category name the item was discovered under.
    pub category: String,
    /// Listing URL of the originating category.
    pub category_url: String,
    /// 1-based listing page the item appeared on.
    pub page_number: i64,
    /// Item author, when the extractor found one.
    pub author: Option<String>,
    /// Item description text.
    pub description: Option<String>,
    /// Resolved archive download URL, when present.
    pub download_url: Option<String>,
    /// Filename suggested by the detail page.
    pub download_filename: Option<String>,
    /// Declared file size (opaque string).
    pub file_size: Option<String>,
    /// Declared download count (opaque string).
    pub downloads_count: Option<String>,
    /// Declared rating (opaque string).
    pub rating: Option<String>,
    /// Tag list.
    pub tags: Vec<String>,
    /// Screenshot URLs.
    pub screenshots: Vec<String>,
    /// Declared creation date.
    pub created_date: Option<String>,
    /// Declared last-update date.
    pub updated_date: Option<String>,
    /// Declared version string.
    pub version: Option<String>,
    /// Declared compatibility note.
    pub compatibility: Option<String>,
}

/// A work item as persisted in the ledger.
#[derive(Debug, Clone, FromRow)]
pub struct WorkItem {
    /// Source detail-page URL (primary key).
    pub url: String,
    /// Human-readable item title.
    pub title: String,
    /// Category name.
    pub category: String,
    /// Listing URL of the originating category.
    pub category_url: String,
    /// 1-based listing page the item appeared on.
    pub page_number: i64,
    /// Item author.
    pub author: Option<String>,
    /// Item description.
    pub description: Option<String>,
    /// Resolved archive download URL.
    pub download_url: Option<String>,
    /// Filename suggested by the detail page.
    pub download_filename: Option<String>,
    /// Declared file size.
    pub file_size: Option<String>,
    /// Declared download count.
    pub downloads_count: Option<String>,
    /// Declared rating.
    pub rating: Option<String>,
    /// Tags as a JSON array string.
    pub tags: Option<String>,
    /// Screenshot URLs as a JSON array string.
    pub screenshots: Option<String>,
    /// Declared creation date.
    pub created_date: Option<String>,
    /// Declared last-update date.
    pub updated_date: Option<String>,
    /// Declared version string.
    pub version: Option<String>,
    /// Declared compatibility note.
    pub compatibility: Option<String>,
    /// When discovery recorded the item.
    pub scraped_at: String,
    /// Current pipeline status (stored as text, parsed via `status()`).
    #[sqlx(rename = "download_status")]
    pub status_str: String,
    /// Path of the downloaded archive once fetched.
    pub local_path: Option<String>,
    /// Path of the unpacked output once extracted.
    pub extracted_path: Option<String>,
    /// SHA-256 of the downloaded archive, hex-encoded.
    pub file_hash: Option<String>,
}

impl WorkItem {
    /// Returns the parsed status enum.
    ///
    /// Falls back to `Pending` if the status string is invalid.
    #[must_use]
    pub fn status(&self) -> ItemStatus {
        self.status_str.parse().unwrap_or(ItemStatus::Pending)
    }

    /// Parses the tags column from its JSON array string.
    ///
    /// Returns an empty vector if tags are None or invalid JSON.
    #[must_use]
    pub fn parse_tags(&self) -> Vec<String> {
        parse_list(self.tags.as_deref())
    }

    /// Parses the screenshots column from its JSON array string.
    #[must_use]
    pub fn parse_screenshots(&self) -> Vec<String> {
        parse_list(self.screenshots.as_deref())
    }

    /// Serializes a string list to a JSON array for database storage.
    ///
    /// Returns None if the list is empty.
    #[must_use]
    pub fn serialize_list(values: &[String]) -> Option<String> {
        if values.is_empty() {
            return None;
        }

        serde_json::to_string(values).ok()
    }
}

fn parse_list(json: Option<&str>) -> Vec<String> {
    let Some(json) = json else {
        return Vec::new();
    };

    serde_json::from_str(json).unwrap_or_default()
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WorkItem {{ url: {}, category: {}, status: {} }}",
            self.url,
            self.category,
            self.status()
        )
    }
}
