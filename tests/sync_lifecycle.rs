//! Integration tests for the sync lifecycle: register, fetch, revalidate, remove.
//!
//! Each test creates its own in-memory SQLite database and a wiremock
//! server standing in for the feed host.

use feedbird::feed::{sync_all, FetcherOptions, HttpFetcher, SyncOptions};
use feedbird::storage::{Database, DatabaseError};
use pretty_assertions::assert_eq;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED_V1: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Example</title>
    <item>
        <title>A</title>
        <link>https://example.com/a</link>
        <pubDate>Fri, 15 Mar 2024 10:00:00 GMT</pubDate>
        <description><![CDATA[<p><img src="https://example.com/a.png"></p>]]></description>
    </item>
    <item>
        <title>B</title>
        <link>https://example.com/b</link>
    </item>
</channel></rss>"#;

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(
        reqwest::Client::new(),
        FetcherOptions {
            timeout: Duration::from_secs(5),
            max_retries: 0,
            retry_base_delay: Duration::from_millis(10),
            ..FetcherOptions::default()
        },
    )
}

/// Serves `FEED_V1` with validators, and 304 to requests presenting them.
async fn mount_cached_feed(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rss"))
        .and(header("if-none-match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(FEED_V1)
                .insert_header("ETag", "\"v1\"")
                .insert_header("Last-Modified", "Fri, 15 Mar 2024 10:00:00 GMT"),
        )
        .with_priority(2)
        .mount(server)
        .await;
}

// ============================================================================
// Sync Tests
// ============================================================================

#[tokio::test]
async fn test_second_sync_is_not_modified() {
    let server = MockServer::start().await;
    mount_cached_feed(&server).await;

    let db = test_db().await;
    let feed = db
        .register_feed(&format!("{}/rss", server.uri()))
        .await
        .unwrap();

    let first = sync_all(&db, &fetcher(), &SyncOptions::default()).await.unwrap();
    assert_eq!(first.new_entries, 2);

    let stored = db.feed_by_url(&feed.url).await.unwrap().unwrap();
    assert_eq!(stored.etag.as_deref(), Some("\"v1\""));
    assert_eq!(stored.modified, Some(1710496800));

    let second = sync_all(&db, &fetcher(), &SyncOptions::default()).await.unwrap();
    assert_eq!(second.not_modified, 1);
    assert_eq!(second.new_entries, 0);
    assert_eq!(db.entries_for_feed(feed.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_entries_carry_link_image_and_date() {
    let server = MockServer::start().await;
    mount_cached_feed(&server).await;

    let db = test_db().await;
    let feed = db
        .register_feed(&format!("{}/rss", server.uri()))
        .await
        .unwrap();
    sync_all(&db, &fetcher(), &SyncOptions::default()).await.unwrap();

    let entries = db.entries_for_feed(feed.id).await.unwrap();
    assert_eq!(entries[0].title, "A");
    assert_eq!(entries[0].link.as_deref(), Some("https://example.com/a"));
    assert_eq!(entries[0].image.as_deref(), Some("https://example.com/a.png"));
    assert_eq!(entries[0].discovered_at, 1710496800);
    assert!(!entries[0].published);

    assert_eq!(entries[1].title, "B");
    assert_eq!(entries[1].image, None);
    // Undated items are stamped with the fetch time
    assert!(entries[1].discovered_at > 1710496800);
}

#[tokio::test]
async fn test_same_title_across_feeds_stored_once() {
    let server = MockServer::start().await;
    for route in ["/one", "/two"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED_V1))
            .mount(&server)
            .await;
    }

    let db = test_db().await;
    db.register_feed(&format!("{}/one", server.uri())).await.unwrap();
    db.register_feed(&format!("{}/two", server.uri())).await.unwrap();

    let report = sync_all(&db, &fetcher(), &SyncOptions::default()).await.unwrap();
    assert_eq!(report.synced, 2);
    assert_eq!(report.new_entries, 2);
    assert_eq!(db.entry_counts().await.unwrap().total, 2);
}

#[tokio::test]
async fn test_unreachable_feed_reported_and_others_synced() {
    let server = MockServer::start().await;
    mount_cached_feed(&server).await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let db = test_db().await;
    db.register_feed(&format!("{}/rss", server.uri())).await.unwrap();
    let gone = db
        .register_feed(&format!("{}/gone", server.uri()))
        .await
        .unwrap();

    let report = sync_all(&db, &fetcher(), &SyncOptions::default()).await.unwrap();
    assert_eq!(report.feeds, 2);
    assert_eq!(report.synced, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].url, gone.url);
    assert!(report.failures[0].reason.contains("410"));

    let stored = db.feed_by_url(&gone.url).await.unwrap().unwrap();
    assert!(stored.validators().is_empty());
    assert!(stored.last_synced.is_none());
}

// ============================================================================
// Remove Tests
// ============================================================================

#[tokio::test]
async fn test_remove_feed_after_sync() {
    let server = MockServer::start().await;
    mount_cached_feed(&server).await;

    let db = test_db().await;
    let url = format!("{}/rss", server.uri());
    db.register_feed(&url).await.unwrap();
    sync_all(&db, &fetcher(), &SyncOptions::default()).await.unwrap();

    assert_eq!(db.deregister_feed(&url).await.unwrap(), 2);
    assert_eq!(db.entry_counts().await.unwrap().total, 0);
    assert!(db.list_feeds().await.unwrap().is_empty());

    assert!(matches!(
        db.deregister_feed(&url).await,
        Err(DatabaseError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_remove_with_same_input_as_add() {
    let db = test_db().await;

    for input in ["https://Example.com", "  https://example.com/a b/RSS \n"] {
        feedbird::util::validate_feed_url(input).unwrap();
        let feed = db.register_feed(input).await.unwrap();
        assert_eq!(feed.url, input.trim().to_lowercase());

        assert_eq!(db.deregister_feed(input).await.unwrap(), 0);
    }
    assert!(db.list_feeds().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_file_database_keeps_state_between_runs() {
    let server = MockServer::start().await;
    mount_cached_feed(&server).await;

    let dir = tempfile::TempDir::new().unwrap();
    let db_path = dir.path().join("feedbird.db");
    let db_path = db_path.to_str().unwrap();
    let url = format!("{}/rss", server.uri());

    {
        let db = Database::open(db_path).await.unwrap();
        db.register_feed(&url).await.unwrap();
        sync_all(&db, &fetcher(), &SyncOptions::default()).await.unwrap();
    }

    let db = Database::open(db_path).await.unwrap();
    let report = sync_all(&db, &fetcher(), &SyncOptions::default()).await.unwrap();
    assert_eq!(report.not_modified, 1);
    assert_eq!(db.entry_counts().await.unwrap().total, 2);
}
