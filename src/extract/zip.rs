//! Zip backend for the secure extractor.

use std::fs::File;
use std::io;
use std::path::Path;

use zip::ZipArchive;

use super::error::ExtractError;
use super::{ArchiveEntry, ArchiveReader};

/// Reads zip archives through the [`ArchiveReader`] seam.
pub struct ZipReader {
    archive: ZipArchive<File>,
}

impl ZipReader {
    /// Opens a zip archive from disk.
    ///
    /// # Errors
    ///
    /// Returns `ExtractError::Io` when the file cannot be opened, or
    /// `ExtractError::Corrupted` when the central directory does not parse.
    pub fn open(path: &Path) -> Result<Self, ExtractError> {
        let file = File::open(path).map_err(|e| ExtractError::io(path, e))?;
        let archive =
            ZipArchive::new(file).map_err(|e| ExtractError::corrupted(path, e.to_string()))?;
        Ok(Self { archive })
    }
}

impl ArchiveReader for ZipReader {
    fn entries(&mut self) -> Result<Vec<ArchiveEntry>, ExtractError> {
        let mut entries = Vec::with_capacity(self.archive.len());
        for index in 0..self.archive.len() {
            let entry = self
                .archive
                .by_index(index)
                .map_err(|e| ExtractError::corrupted("<zip entry>", e.to_string()))?;
            entries.push(ArchiveEntry {
                name: entry.name().to_string(),
                size: entry.size(),
                is_dir: entry.is_dir(),
            });
        }
        Ok(entries)
    }

    fn unpack_entry(&mut self, index: usize, target: &Path) -> Result<u64, ExtractError> {
        let mut entry = self
            .archive
            .by_index(index)
            .map_err(|e| ExtractError::corrupted("<zip entry>", e.to_string()))?;
        let mut file = File::create(target).map_err(|e| ExtractError::io(target, e))?;
        let written =
            io::copy(&mut entry, &mut file).map_err(|e| ExtractError::io(target, e))?;
        Ok(written)
    }
}
