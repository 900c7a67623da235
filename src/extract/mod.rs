//! Secure archive extraction with full pre-validation.
//!
//! # Overview
//!
//! Extraction is all-or-nothing: every entry in the archive is validated
//! (path containment, size caps) before a single byte is written. Entries
//! are then materialized into a hidden temp directory next to the final
//! destination and the result is swapped into place with a rename, so the
//! destination is never observable in a half-extracted state. Any failure
//! removes the staging directory and leaves the destination untouched.
//!
//! Format dispatch goes through the [`ArchiveReader`] trait; zip ships as
//! the only built-in backend.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use harvester_core::extract::SecureExtractor;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let extractor = SecureExtractor::new();
//! let summary = extractor.extract(
//!     Path::new("./downloads/mods/pack/pack.zip"),
//!     Path::new("./extracted/mods/pack"),
//! )?;
//! println!("{} files, {} bytes", summary.files_written, summary.bytes_written);
//! # Ok(())
//! # }
//! ```

mod error;
mod zip;

use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, instrument, warn};

pub use error::ExtractError;
pub use zip::ZipReader;

/// Default cap on a single extracted file (500 MB).
pub const DEFAULT_PER_FILE_CAP: u64 = 500 * 1024 * 1024;

/// Default cap on the declared total across all entries (2 GB).
pub const DEFAULT_AGGREGATE_CAP: u64 = 2 * 1024 * 1024 * 1024;

/// One entry in an archive, as reported by a backend.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Entry path as stored in the archive.
    pub name: String,
    /// Declared uncompressed size in bytes.
    pub size: u64,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// Format backend seam: list entries, then unpack them one at a time.
///
/// Backends only read archives and write single files to paths the extractor
/// has already validated; all safety decisions live in [`SecureExtractor`].
pub trait ArchiveReader: Send {
    /// Lists every entry in the archive.
    ///
    /// # Errors
    ///
    /// Returns an error when the archive cannot be enumerated.
    fn entries(&mut self) -> Result<Vec<ArchiveEntry>, ExtractError>;

    /// Unpacks the entry at `index` to `target`, returning bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error when the entry cannot be read or `target` cannot be
    /// written.
    fn unpack_entry(&mut self, index: usize, target: &Path) -> Result<u64, ExtractError>;
}

/// Opens an archive with the backend matching its file extension.
///
/// # Errors
///
/// Returns `ExtractError::UnsupportedFormat` for extensions without a
/// backend, or the backend's open error.
pub fn open_archive(path: &Path) -> Result<Box<dyn ArchiveReader>, ExtractError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "zip" => Ok(Box::new(ZipReader::open(path)?)),
        other => Err(ExtractError::unsupported(format!(".{other}"))),
    }
}

/// Size caps applied during pre-validation.
///
/// Configurable so tests can exercise the caps with small fixtures.
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Entries declaring more than this are skipped (with a warning).
    pub per_file_cap: u64,
    /// Declared total over this aborts the whole extraction.
    pub aggregate_cap: u64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            per_file_cap: DEFAULT_PER_FILE_CAP,
            aggregate_cap: DEFAULT_AGGREGATE_CAP,
        }
    }
}

/// Summary of a completed extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractSummary {
    /// Files materialized at the destination.
    pub files_written: usize,
    /// Total bytes written.
    pub bytes_written: u64,
    /// Entries skipped for exceeding the per-file cap.
    pub entries_skipped: usize,
}

struct PlannedEntry {
    index: usize,
    relative: PathBuf,
    is_dir: bool,
}

/// Validates and extracts archives with staging and an atomic swap.
#[derive(Debug, Clone, Default)]
pub struct SecureExtractor {
    options: ExtractOptions,
}

impl SecureExtractor {
    /// Creates an extractor with the default caps.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an extractor with explicit caps.
    #[must_use]
    pub fn with_options(options: ExtractOptions) -> Self {
        Self { options }
    }

    /// Extracts `archive_path` into `dest`, replacing any previous contents.
    ///
    /// The destination only changes on full success: entries are staged in a
    /// temp directory created next to `dest` (same filesystem, so the final
    /// rename is atomic) and swapped in at the end.
    ///
    /// # Errors
    ///
    /// Returns an error when the archive is unsupported or corrupted, when
    /// any entry escapes the destination, when the declared total exceeds
    /// the aggregate cap, or on filesystem failures. The destination is
    /// untouched in every error case.
    #[instrument(skip(self), fields(archive = %archive_path.display(), dest = %dest.display()))]
    pub fn extract(&self, archive_path: &Path, dest: &Path) -> Result<ExtractSummary, ExtractError> {
        let mut archive = open_archive(archive_path)?;
        let entries = archive.entries()?;

        let (plan, entries_skipped) = self.validate_entries(&entries)?;

        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| ExtractError::io(parent, e))?;
        let staging = tempfile::Builder::new()
            .prefix(".extracting-")
            .tempdir_in(parent)
            .map_err(|e| ExtractError::io(parent, e))?;

        let mut summary = ExtractSummary {
            entries_skipped,
            ..ExtractSummary::default()
        };
        for planned in &plan {
            let target = staging.path().join(&planned.relative);
            // Containment recheck after the join; validate_entries already
            // rejected traversal so a miss here is a logic bug.
            if !target.starts_with(staging.path()) {
                return Err(ExtractError::traversal(planned.relative.display().to_string()));
            }
            if planned.is_dir {
                std::fs::create_dir_all(&target).map_err(|e| ExtractError::io(&target, e))?;
                continue;
            }
            if let Some(target_parent) = target.parent() {
                std::fs::create_dir_all(target_parent)
                    .map_err(|e| ExtractError::io(target_parent, e))?;
            }
            let written = archive.unpack_entry(planned.index, &target)?;
            summary.files_written += 1;
            summary.bytes_written += written;
        }

        // Swap: drop any previous extraction, then rename the staging dir in.
        if dest.exists() {
            debug!("removing previous extraction");
            std::fs::remove_dir_all(dest).map_err(|e| ExtractError::io(dest, e))?;
        }
        let staged = staging.keep();
        if let Err(e) = std::fs::rename(&staged, dest) {
            let _ = std::fs::remove_dir_all(&staged);
            return Err(ExtractError::io(dest, e));
        }

        info!(
            files = summary.files_written,
            bytes = summary.bytes_written,
            skipped = summary.entries_skipped,
            "extraction complete"
        );
        Ok(summary)
    }

    /// Validates every entry up front. Returns the materialization plan plus
    /// the count of entries skipped for size.
    fn validate_entries(
        &self,
        entries: &[ArchiveEntry],
    ) -> Result<(Vec<PlannedEntry>, usize), ExtractError> {
        let mut plan = Vec::with_capacity(entries.len());
        let mut skipped = 0usize;
        let mut total: u64 = 0;

        for (index, entry) in entries.iter().enumerate() {
            let relative = normalize_entry_path(&entry.name)
                .ok_or_else(|| ExtractError::traversal(entry.name.clone()))?;
            if relative.as_os_str().is_empty() {
                continue;
            }
            if !entry.is_dir {
                if entry.size > self.options.per_file_cap {
                    warn!(
                        entry = %entry.name,
                        size = entry.size,
                        cap = self.options.per_file_cap,
                        "skipping oversized entry"
                    );
                    skipped += 1;
                    continue;
                }
                total = total.saturating_add(entry.size);
                if total > self.options.aggregate_cap {
                    return Err(ExtractError::TotalSizeExceeded {
                        total_bytes: total,
                        cap_bytes: self.options.aggregate_cap,
                    });
                }
            }
            plan.push(PlannedEntry {
                index,
                relative,
                is_dir: entry.is_dir,
            });
        }

        Ok((plan, skipped))
    }
}

/// Normalizes an archive entry path into a safe relative path.
///
/// Returns `None` when the path is absolute, carries a drive prefix, or
/// contains a `..` component. `.` components are dropped. Backslashes are
/// treated as separators since some archivers store them.
fn normalize_entry_path(name: &str) -> Option<PathBuf> {
    let unified = name.replace('\\', "/");
    let path = Path::new(&unified);
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(normalized)
}
