use anyhow::{Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use reqwest::redirect::Policy;
use std::path::PathBuf;

use feedbird::config::Config;
use feedbird::feed::{sync_all, HttpFetcher};
use feedbird::publish::{import_credentials, run_publish, TwitterPublisher};
use feedbird::storage::{Database, DatabaseError};
use feedbird::util::validate_feed_url;

#[derive(Parser, Debug)]
#[command(name = "feedbird", version, about = "Sync RSS/Atom feeds and post new items to Twitter")]
struct Args {
    /// SQLite database file
    #[arg(long, value_name = "PATH", default_value = "feedbird.db")]
    db: PathBuf,

    /// Config file (default: ~/.config/feedbird/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch every registered feed and record new entries
    Update,
    /// Post every pending entry
    Publish,
    /// Register a feed
    Add { url: String },
    /// Deregister a feed and delete its entries
    Remove { url: String },
    /// Show registered feeds and entry counts
    List,
    /// Import Twitter credentials from a JSON object file
    ImportCredentials { path: PathBuf },
}

fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 5 {
            return attempt.error("Too many redirects (max 5)");
        }

        let url = attempt.url();
        for prev in attempt.previous() {
            if prev.as_str() == url.as_str() {
                return attempt.error("Redirect loop detected");
            }
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

fn http_client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .redirect(create_redirect_policy())
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(std::time::Duration::from_secs(30))
        .tcp_keepalive(std::time::Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")
}

fn format_time(secs: Option<i64>) -> String {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

async fn open_database(path: &std::path::Path) -> Result<Database> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(path_str).await {
        Ok(db) => Ok(db),
        Err(e @ DatabaseError::InstanceLocked) => Err(e.into()),
        Err(e) => Err(anyhow::Error::new(e)
            .context(format!("Failed to open database '{}'", path.display()))),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match args.config.clone().or_else(Config::default_path) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => Config::default(),
    };

    let db = open_database(&args.db).await?;

    match args.command {
        Command::Update => {
            let fetcher = HttpFetcher::new(http_client(&config)?, config.fetcher_options());
            let report = sync_all(&db, &fetcher, &config.sync_options())
                .await
                .context("Sync aborted")?;
            for failure in &report.failures {
                eprintln!("  failed: {} ({})", failure.url, failure.reason);
            }
            println!(
                "Synced {} feeds: {} updated, {} not modified, {} failed, {} new entries",
                report.feeds,
                report.synced,
                report.not_modified,
                report.failures.len(),
                report.new_entries
            );
        }
        Command::Publish => {
            let client = http_client(&config)?;
            let endpoints = config.twitter_endpoints();
            let report = run_publish(&db, config.publish_options(), |credentials| {
                TwitterPublisher::new(client, credentials, endpoints)
            })
            .await
            .context("Publish aborted")?;
            println!(
                "Published {} of {} entries ({} failed, {} abandoned)",
                report.published, report.attempted, report.failed, report.abandoned
            );
        }
        Command::Add { url } => {
            // Stored under the trimmed, lowercased input, not the parsed form,
            // so `remove` with the same string finds it.
            validate_feed_url(&url).with_context(|| format!("Cannot add '{}'", url))?;
            let feed = db.register_feed(&url).await?;
            println!("Registered {} (id {})", feed.url, feed.id);
        }
        Command::Remove { url } => {
            let removed = db
                .deregister_feed(&url)
                .await
                .with_context(|| format!("Cannot remove '{}'", url))?;
            println!("Removed {} and {} entries", url.trim(), removed);
        }
        Command::List => {
            let feeds = db.list_feeds().await?;
            if feeds.is_empty() {
                println!("No feeds registered. Add one with `feedbird add <url>`.");
            }
            for feed in &feeds {
                println!("{:>4}  {}", feed.id, feed.url);
                println!(
                    "      etag: {}  modified: {}  last synced: {}",
                    feed.etag.as_deref().unwrap_or("-"),
                    format_time(feed.modified),
                    format_time(feed.last_synced)
                );
                if let Some(error) = &feed.error {
                    println!("      last error: {}", error);
                }
            }
            let counts = db.entry_counts().await?;
            println!(
                "Entries: {} total, {} published, {} pending, {} abandoned",
                counts.total, counts.published, counts.pending, counts.abandoned
            );
        }
        Command::ImportCredentials { path } => {
            let written = import_credentials(&db, &path).await?;
            println!("Imported {} credential keys", written);
        }
    }

    Ok(())
}
