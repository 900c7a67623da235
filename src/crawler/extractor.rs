//! Page extraction seam for the discovery crawler.
//!
//! Catalog sites differ in markup but not in shape: listing pages link to
//! item pages, item pages carry metadata and a download link, and a "next"
//! link chains the listing. [`PageExtractor`] captures exactly that shape;
//! [`RegexExtractor`] is the configurable default implementation.

use regex::Regex;
use tracing::debug;
use url::Url;

/// Metadata scraped from a single item page.
///
/// Fields the extractor cannot find stay empty; the ledger stores them as-is.
#[derive(Debug, Clone, Default)]
pub struct ItemDetails {
    pub title: String,
    pub author: String,
    pub description: String,
    pub download_url: String,
    pub file_size: String,
    pub downloads_count: String,
    pub rating: String,
    pub tags: Vec<String>,
    pub screenshots: Vec<String>,
    pub created_date: String,
    pub updated_date: String,
    pub version: String,
    pub compatibility: String,
}

/// Parses listing and item pages into navigation and metadata.
///
/// Implementations are pure HTML parsing; all fetching, pacing, and ledger
/// writes stay in the crawler.
pub trait PageExtractor: Send + Sync {
    /// Item page URLs linked from a listing page, resolved against `base`.
    fn item_urls(&self, html: &str, base: &Url) -> Vec<Url>;

    /// The next listing page, when the listing continues.
    fn next_page(&self, html: &str, current: &Url) -> Option<Url>;

    /// Metadata from an item page.
    fn item_details(&self, html: &str, url: &Url) -> ItemDetails;
}

/// Default regex-driven extractor configured per catalog.
pub struct RegexExtractor {
    item_link: Regex,
    next_link: Regex,
    title: Regex,
    download_link: Regex,
    description: Regex,
}

/// Fallback pattern recognizing `rel="next"` pagination links.
const DEFAULT_NEXT_LINK_PATTERN: &str = r#"<a[^>]+rel="next"[^>]+href="([^"]+)""#;

impl RegexExtractor {
    /// Builds an extractor from configured link patterns.
    ///
    /// `item_link_pattern` must capture the item href in group 1.
    /// `next_link_pattern` falls back to a `rel="next"` match when absent.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error for an invalid pattern.
    pub fn from_patterns(
        item_link_pattern: &str,
        next_link_pattern: Option<&str>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            item_link: Regex::new(item_link_pattern)?,
            next_link: Regex::new(next_link_pattern.unwrap_or(DEFAULT_NEXT_LINK_PATTERN))?,
            title: Regex::new(r"<h1[^>]*>\s*([^<]+?)\s*</h1>")?,
            download_link: Regex::new(
                r#"href="([^"]+\.(?:zip|rar|7z)(?:\?[^"]*)?)""#,
            )?,
            description: Regex::new(r#"<meta\s+name="description"\s+content="([^"]*)""#)?,
        })
    }

    fn capture_join(regex: &Regex, html: &str, base: &Url) -> Vec<Url> {
        regex
            .captures_iter(html)
            .filter_map(|caps| caps.get(1))
            .filter_map(|href| base.join(href.as_str()).ok())
            .collect()
    }
}

impl PageExtractor for RegexExtractor {
    fn item_urls(&self, html: &str, base: &Url) -> Vec<Url> {
        let mut urls = Self::capture_join(&self.item_link, html, base);
        urls.dedup();
        debug!(count = urls.len(), "extracted item links");
        urls
    }

    fn next_page(&self, html: &str, current: &Url) -> Option<Url> {
        let next = Self::capture_join(&self.next_link, html, current)
            .into_iter()
            .find(|url| url != current);
        debug!(next = ?next.as_ref().map(Url::as_str), "resolved next page");
        next
    }

    fn item_details(&self, html: &str, url: &Url) -> ItemDetails {
        let title = self
            .title
            .captures(html)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        let download_url = self
            .download_link
            .captures(html)
            .and_then(|caps| caps.get(1))
            .and_then(|href| url.join(href.as_str()).ok())
            .map(String::from)
            .unwrap_or_default();
        let description = self
            .description
            .captures(html)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        ItemDetails {
            title,
            download_url,
            description,
            ..ItemDetails::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn extractor() -> RegexExtractor {
        RegexExtractor::from_patterns(r#"<a class="item" href="([^"]+)""#, None).unwrap()
    }

    #[test]
    fn test_item_urls_resolved_against_base() {
        let base = Url::parse("https://example.com/mods?page=1").unwrap();
        let html = r#"
            <a class="item" href="/mods/alpha">Alpha</a>
            <a class="item" href="https://example.com/mods/beta">Beta</a>
            <a class="other" href="/ignored">Nope</a>
        "#;
        let urls = extractor().item_urls(html, &base);
        assert_eq!(
            urls,
            vec![
                Url::parse("https://example.com/mods/alpha").unwrap(),
                Url::parse("https://example.com/mods/beta").unwrap(),
            ]
        );
    }

    #[test]
    fn test_next_page_rel_next_default() {
        let current = Url::parse("https://example.com/mods?page=1").unwrap();
        let html = r#"<a class="pager" rel="next" href="?page=2">Next</a>"#;
        let next = extractor().next_page(html, &current).unwrap();
        assert_eq!(next.as_str(), "https://example.com/mods?page=2");
    }

    #[test]
    fn test_next_page_absent() {
        let current = Url::parse("https://example.com/mods?page=5").unwrap();
        assert!(extractor().next_page("<p>end of list</p>", &current).is_none());
    }

    #[test]
    fn test_next_page_self_link_ignored() {
        // A pager that marks the current page as "next" must not loop.
        let current = Url::parse("https://example.com/mods?page=3").unwrap();
        let html = r#"<a rel="next" href="?page=3">3</a>"#;
        assert!(extractor().next_page(html, &current).is_none());
    }

    #[test]
    fn test_item_details_title_download_description() {
        let url = Url::parse("https://example.com/mods/alpha").unwrap();
        let html = r#"
            <meta name="description" content="A fine mod">
            <h1> Alpha Pack </h1>
            <a href="/files/alpha-1.2.zip">Download</a>
        "#;
        let details = extractor().item_details(html, &url);
        assert_eq!(details.title, "Alpha Pack");
        assert_eq!(details.download_url, "https://example.com/files/alpha-1.2.zip");
        assert_eq!(details.description, "A fine mod");
    }

    #[test]
    fn test_item_details_missing_download_is_empty() {
        let url = Url::parse("https://example.com/mods/alpha").unwrap();
        let details = extractor().item_details("<h1>Alpha</h1>", &url);
        assert_eq!(details.title, "Alpha");
        assert!(details.download_url.is_empty());
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        assert!(RegexExtractor::from_patterns("([unclosed", None).is_err());
    }
}
