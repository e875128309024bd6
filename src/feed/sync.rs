use futures::{stream, StreamExt, TryStreamExt};
use std::time::Duration;

use super::fetcher::{ConditionalFetcher, FetchError, FetchOutcome, FetchedFeed};
use super::parser::RawItem;
use super::thumbnail::first_image;
use crate::storage::{Database, DatabaseError, Feed, NewEntry};

/// Tuning for a sync cycle.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Feeds fetched at the same time
    pub concurrency: usize,
    /// Upper bound on one feed's fetch, retries included
    pub fetch_timeout: Duration,
    /// Items kept per feed per cycle, in delivered order (at least one)
    pub max_items_per_feed: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            fetch_timeout: Duration::from_secs(30),
            max_items_per_feed: 500,
        }
    }
}

/// What happened to one feed during a cycle.
#[derive(Debug)]
pub enum FeedSyncOutcome {
    /// Body changed; validators advanced and `new_entries` were recorded
    Updated { new_entries: usize },
    /// Upstream reported no change; nothing was written
    NotModified,
    /// Fetch failed; validators untouched, error recorded on the feed
    Failed(FetchError),
    /// Feed was deregistered while its fetch was in flight
    Removed,
}

/// A feed that could not be fetched this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFailure {
    pub url: String,
    pub reason: String,
}

/// Totals for one sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub feeds: usize,
    pub synced: usize,
    pub not_modified: usize,
    pub new_entries: usize,
    pub failures: Vec<FeedFailure>,
}

impl SyncReport {
    fn record(&mut self, url: String, outcome: FeedSyncOutcome) {
        match outcome {
            FeedSyncOutcome::Updated { new_entries } => {
                self.synced += 1;
                self.new_entries += new_entries;
            }
            FeedSyncOutcome::NotModified => self.not_modified += 1,
            FeedSyncOutcome::Failed(e) => self.failures.push(FeedFailure {
                url,
                reason: e.to_string(),
            }),
            FeedSyncOutcome::Removed => {}
        }
    }
}

/// Synchronizes every registered feed.
///
/// Feeds are fetched concurrently, at most `options.concurrency` at a time,
/// and each commits in its own transaction. Fetch failures are reported per
/// feed in the returned [`SyncReport`]. A store error aborts the cycle:
/// feeds that already committed stay committed, the rest are left as they
/// were.
pub async fn sync_all<F>(
    db: &Database,
    fetcher: &F,
    options: &SyncOptions,
) -> Result<SyncReport, DatabaseError>
where
    F: ConditionalFetcher + ?Sized,
{
    let feeds = db.list_feeds().await?;
    let mut report = SyncReport {
        feeds: feeds.len(),
        ..SyncReport::default()
    };

    if feeds.is_empty() {
        tracing::info!("No feeds registered");
        return Ok(report);
    }

    let outcomes: Vec<(String, FeedSyncOutcome)> = stream::iter(feeds)
        .map(|feed| async move {
            let outcome = sync_one(db, fetcher, &feed, options).await?;
            Ok::<_, DatabaseError>((feed.url, outcome))
        })
        .buffer_unordered(options.concurrency.max(1))
        .try_collect()
        .await?;

    for (url, outcome) in outcomes {
        report.record(url, outcome);
    }

    tracing::info!(
        feeds = report.feeds,
        synced = report.synced,
        not_modified = report.not_modified,
        failed = report.failures.len(),
        new_entries = report.new_entries,
        "Sync cycle complete"
    );
    Ok(report)
}

/// Synchronizes a single feed against its stored validators.
pub async fn sync_one<F>(
    db: &Database,
    fetcher: &F,
    feed: &Feed,
    options: &SyncOptions,
) -> Result<FeedSyncOutcome, DatabaseError>
where
    F: ConditionalFetcher + ?Sized,
{
    let validators = feed.validators();
    let fetched = tokio::time::timeout(options.fetch_timeout, fetcher.fetch(&feed.url, &validators))
        .await
        .unwrap_or(Err(FetchError::Timeout));

    let fetched = match fetched {
        Ok(FetchOutcome::NotModified) => {
            tracing::debug!(feed = %feed.url, "Feed not modified");
            return Ok(FeedSyncOutcome::NotModified);
        }
        Ok(FetchOutcome::Modified(fetched)) => fetched,
        Err(e) => {
            tracing::warn!(feed = %feed.url, error = %e, "Feed fetch failed");
            db.record_feed_error(feed.id, &e.to_string()).await?;
            return Ok(FeedSyncOutcome::Failed(e));
        }
    };

    // A zero cap would advance validators past items never recorded
    let entries = new_entries(feed, &fetched, options.max_items_per_feed.max(1));
    match db
        .apply_feed_sync(feed.id, &fetched.validators(), &entries)
        .await
    {
        Ok(new_entries) => {
            tracing::debug!(feed = %feed.url, new_entries = new_entries, "Feed synced");
            Ok(FeedSyncOutcome::Updated { new_entries })
        }
        Err(DatabaseError::NotFound(_)) => {
            tracing::debug!(feed = %feed.url, "Feed removed during sync");
            Ok(FeedSyncOutcome::Removed)
        }
        Err(e) => Err(e),
    }
}

fn new_entries(feed: &Feed, fetched: &FetchedFeed, max_items: usize) -> Vec<NewEntry> {
    let dropped = fetched.items.len().saturating_sub(max_items);
    if dropped > 0 {
        tracing::warn!(
            feed = %feed.url,
            kept = max_items,
            dropped = dropped,
            "Feed delivered more items than the per-cycle limit"
        );
    }

    let fetched_at = chrono::Utc::now().timestamp();
    fetched
        .items
        .iter()
        .take(max_items)
        .map(|item| to_new_entry(feed.id, item, fetched_at))
        .collect()
}

fn to_new_entry(feed_id: i64, item: &RawItem, fetched_at: i64) -> NewEntry {
    NewEntry {
        feed_id,
        title: item.title.clone(),
        link: item.link.clone(),
        image: item.summary_html.as_deref().and_then(first_image),
        discovered_at: item.published_at.unwrap_or(fetched_at),
    }
}
