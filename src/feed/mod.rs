//! Feed synchronization: conditional fetching, parsing and incremental sync.
//!
//! - [`fetcher`] - conditional HTTP retrieval honoring `ETag` / `Last-Modified`
//! - [`parser`] - RSS/Atom parsing using the `feed-rs` crate
//! - [`thumbnail`] - first-image extraction from item summaries
//! - [`sync`] - bounded-concurrency refresh of every registered feed
//!
//! # Example
//!
//! ```ignore
//! use feedbird::feed::{sync_all, FetcherOptions, HttpFetcher, SyncOptions};
//!
//! let fetcher = HttpFetcher::new(client, FetcherOptions::default());
//! let report = sync_all(&db, &fetcher, &SyncOptions::default()).await?;
//! println!("{} new entries", report.new_entries);
//! ```

pub mod fetcher;
pub mod parser;
pub mod sync;
pub mod thumbnail;

pub use fetcher::{ConditionalFetcher, FetchError, FetchOutcome, FetchedFeed, FetcherOptions, HttpFetcher};
pub use parser::{parse_items, ParseResult, RawItem};
pub use sync::{sync_all, sync_one, FeedFailure, FeedSyncOutcome, SyncOptions, SyncReport};
pub use thumbnail::first_image;
