//! Harvest run configuration.
//!
//! A run is described by a small JSON file: the categories to walk and the
//! link patterns the default extractor uses to recognize item and pagination
//! links on that catalog's markup.
//!
//! ```json
//! {
//!   "categories": [
//!     { "name": "mods", "url": "https://example.com/mods" }
//!   ],
//!   "item_link_pattern": "<a class=\"item\" href=\"([^\"]+)\"",
//!   "next_link_pattern": "<a rel=\"next\" href=\"([^\"]+)\""
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading a harvest configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// The config file path.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON for the expected shape.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// The config file path.
        path: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The config parsed but describes an unusable run.
    #[error("invalid config: {message}")]
    Invalid {
        /// What is wrong.
        message: String,
    },
}

/// One category to crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    /// Category name, used for grouping and output directories.
    pub name: String,
    /// First listing page URL.
    pub url: String,
}

/// Top-level harvest configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Categories to walk, in order.
    pub categories: Vec<Category>,
    /// Regex with the item href in capture group 1.
    pub item_link_pattern: String,
    /// Regex with the next-page href in capture group 1.
    /// Defaults to a `rel="next"` match when absent.
    #[serde(default)]
    pub next_link_pattern: Option<String>,
}

impl HarvestConfig {
    /// Loads and validates a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the file cannot be read, does not parse,
    /// or names no categories.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.categories.is_empty() {
            return Err(ConfigError::Invalid {
                message: "at least one category is required".to_string(),
            });
        }
        if self.item_link_pattern.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "item_link_pattern must not be empty".to_string(),
            });
        }
        for category in &self.categories {
            if category.name.trim().is_empty() || category.url.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    message: "every category needs a name and a url".to_string(),
                });
            }
        }
        Ok(())
    }
}
