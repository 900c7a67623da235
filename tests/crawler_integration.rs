//! Integration tests for paginated discovery against mock HTTP servers.

use std::sync::Arc;
use std::time::Duration;

use harvester_core::crawler::{Crawler, PageExtractor, RegexExtractor};
use harvester_core::pipeline::CancelFlag;
use harvester_core::{Database, DiscoveredItem, Ledger, RateLimiter};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ITEM_LINK_PATTERN: &str = r#"<a class="item" href="([^"]+)""#;

async fn test_ledger() -> Ledger {
    let db = Database::new_in_memory().await.unwrap();
    Ledger::new(db)
}

fn test_crawler() -> Crawler {
    let limiter = Arc::new(RateLimiter::new(
        Duration::from_millis(1),
        Duration::from_millis(10),
    ));
    let extractor: Arc<dyn PageExtractor> =
        Arc::new(RegexExtractor::from_patterns(ITEM_LINK_PATTERN, None).unwrap());
    Crawler::new(limiter, extractor).unwrap()
}

fn listing_page(items: &[&str], next: Option<&str>) -> String {
    let mut html = String::new();
    for item in items {
        html.push_str(&format!(r#"<a class="item" href="{item}">link</a>"#));
    }
    if let Some(next) = next {
        html.push_str(&format!(r#"<a rel="next" href="{next}">next</a>"#));
    }
    html
}

fn item_page(title: &str, download: &str) -> String {
    format!(r#"<h1>{title}</h1><a href="{download}">Download</a>"#)
}

async fn mount_page(server: &MockServer, page_path: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_crawl_single_page_upserts_items() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/mods",
        listing_page(&["/mods/alpha", "/mods/beta"], None),
    )
    .await;
    mount_page(&server, "/mods/alpha", item_page("Alpha", "/files/alpha.zip")).await;
    mount_page(&server, "/mods/beta", item_page("Beta", "/files/beta.zip")).await;

    let ledger = test_ledger().await;
    let stats = test_crawler()
        .crawl_category(
            &ledger,
            "mods",
            &format!("{}/mods", server.uri()),
            &CancelFlag::new(),
        )
        .await
        .expect("crawl should succeed");

    assert_eq!(stats.pages_visited, 1);
    assert_eq!(stats.items_discovered, 2);
    assert_eq!(stats.items_skipped_known, 0);

    let alpha = ledger
        .get(&format!("{}/mods/alpha", server.uri()))
        .await
        .unwrap()
        .expect("alpha should be in the ledger");
    assert_eq!(alpha.title, "Alpha");
    assert_eq!(alpha.category, "mods");
    assert_eq!(alpha.page_number, 1);
    assert_eq!(
        alpha.download_url.unwrap(),
        format!("{}/files/alpha.zip", server.uri())
    );
    assert_eq!(
        alpha.download_filename.as_deref(),
        Some("alpha.zip"),
        "the suggested payload name comes from the download URL"
    );
}

#[tokio::test]
async fn test_crawl_follows_pagination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mods"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(listing_page(&["/mods/beta"], None)),
        )
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/mods",
        listing_page(&["/mods/alpha"], Some("/mods?page=2")),
    )
    .await;
    mount_page(&server, "/mods/alpha", item_page("Alpha", "/files/alpha.zip")).await;
    mount_page(&server, "/mods/beta", item_page("Beta", "/files/beta.zip")).await;

    let ledger = test_ledger().await;
    let stats = test_crawler()
        .crawl_category(
            &ledger,
            "mods",
            &format!("{}/mods", server.uri()),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(stats.pages_visited, 2);
    assert_eq!(stats.items_discovered, 2);
    let beta = ledger
        .get(&format!("{}/mods/beta", server.uri()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(beta.page_number, 2, "second-page item records page 2");
}

#[tokio::test]
async fn test_crawl_page_cap_stops_infinite_pagination() {
    let server = MockServer::start().await;
    // Every page links to itself as "next" with a changing query so the
    // self-link guard doesn't stop the walk; only the cap can.
    for page in 1..=10 {
        let next = format!("/mods?page={}", page + 1);
        Mock::given(method("GET"))
            .and(path("/mods"))
            .and(query_param("page", page.to_string()))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(listing_page(&[], Some(&next))),
            )
            .mount(&server)
            .await;
    }

    let ledger = test_ledger().await;
    let stats = test_crawler()
        .with_max_pages(3)
        .crawl_category(
            &ledger,
            "mods",
            &format!("{}/mods?page=1", server.uri()),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(stats.pages_visited, 3, "walk must stop at the page cap");
}

#[tokio::test]
async fn test_crawl_skips_known_urls_without_detail_fetch() {
    let server = MockServer::start().await;
    mount_page(&server, "/mods", listing_page(&["/mods/alpha"], None)).await;
    // No mock for /mods/alpha detail: a fetch attempt would 404 and count as
    // a detail failure, so a clean skip proves no fetch happened.

    let ledger = test_ledger().await;
    ledger
        .upsert(&DiscoveredItem {
            url: format!("{}/mods/alpha", server.uri()),
            title: "Already Known".to_string(),
            category: "mods".to_string(),
            ..DiscoveredItem::default()
        })
        .await
        .unwrap();

    let stats = test_crawler()
        .crawl_category(
            &ledger,
            "mods",
            &format!("{}/mods", server.uri()),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(stats.items_skipped_known, 1);
    assert_eq!(stats.items_discovered, 0);
    assert_eq!(stats.detail_failures, 0);
}

#[tokio::test]
async fn test_crawl_detail_failure_skips_item_and_continues() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/mods",
        listing_page(&["/mods/broken", "/mods/good"], None),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/mods/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_page(&server, "/mods/good", item_page("Good", "/files/good.zip")).await;

    let ledger = test_ledger().await;
    let stats = test_crawler()
        .crawl_category(
            &ledger,
            "mods",
            &format!("{}/mods", server.uri()),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(stats.detail_failures, 1);
    assert_eq!(stats.items_discovered, 1);
    assert!(
        ledger
            .contains(&format!("{}/mods/good", server.uri()))
            .await
            .unwrap(),
        "later items on the page must still be scraped"
    );
}

#[tokio::test]
async fn test_crawl_listing_failure_aborts_category() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mods"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let ledger = test_ledger().await;
    let result = test_crawler()
        .crawl_category(
            &ledger,
            "mods",
            &format!("{}/mods", server.uri()),
            &CancelFlag::new(),
        )
        .await;

    assert!(result.is_err(), "a failed listing page must abort the walk");
}

#[tokio::test]
async fn test_crawl_item_without_download_link_is_no_download_url() {
    let server = MockServer::start().await;
    mount_page(&server, "/mods", listing_page(&["/mods/nolink"], None)).await;
    mount_page(
        &server,
        "/mods/nolink",
        "<h1>No Link</h1><p>download removed</p>".to_string(),
    )
    .await;

    let ledger = test_ledger().await;
    test_crawler()
        .crawl_category(
            &ledger,
            "mods",
            &format!("{}/mods", server.uri()),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    let stored = ledger
        .get(&format!("{}/mods/nolink", server.uri()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status_str, "no_download_url");
}

#[tokio::test]
async fn test_crawl_honors_cancellation() {
    let server = MockServer::start().await;
    mount_page(&server, "/mods", listing_page(&["/mods/alpha"], None)).await;

    let cancel = CancelFlag::new();
    cancel.cancel();

    let ledger = test_ledger().await;
    let stats = test_crawler()
        .crawl_category(&ledger, "mods", &format!("{}/mods", server.uri()), &cancel)
        .await
        .unwrap();

    assert_eq!(stats.pages_visited, 0, "pre-cancelled crawl fetches nothing");
}
