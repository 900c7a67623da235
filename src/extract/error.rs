//! Error types for archive extraction.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while validating or extracting an archive.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// An entry path escapes the extraction root.
    #[error(
        "archive entry escapes the extraction root: {entry}\n  Suggestion: The archive is malformed or hostile; nothing was written"
    )]
    Traversal {
        /// The offending entry name as stored in the archive.
        entry: String,
    },

    /// Declared total size across entries exceeds the aggregate cap.
    #[error("archive declares {total_bytes} bytes, over the {cap_bytes}-byte aggregate cap")]
    TotalSizeExceeded {
        /// Sum of declared entry sizes.
        total_bytes: u64,
        /// The configured aggregate cap.
        cap_bytes: u64,
    },

    /// The archive format has no registered backend.
    #[error("unsupported archive format: {extension}")]
    UnsupportedFormat {
        /// The file extension that failed dispatch.
        extension: String,
    },

    /// The archive could not be parsed.
    #[error("corrupted archive {path}: {message}")]
    Corrupted {
        /// Path of the archive file.
        path: PathBuf,
        /// Backend-reported parse failure.
        message: String,
    },

    /// Filesystem error during staging or the final swap.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl ExtractError {
    /// Creates a traversal error.
    pub fn traversal(entry: impl Into<String>) -> Self {
        Self::Traversal {
            entry: entry.into(),
        }
    }

    /// Creates an unsupported format error.
    pub fn unsupported(extension: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            extension: extension.into(),
        }
    }

    /// Creates a corrupted archive error.
    pub fn corrupted(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Corrupted {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
