use sqlx::{Sqlite, Transaction};
use std::collections::HashSet;

use super::schema::Database;
use super::types::{DatabaseError, Feed, NewEntry, Validators};
use crate::util::normalize_feed_url;

const FEED_COLUMNS: &str = "id, url, etag, modified, last_synced, error";

impl Database {
    // ========================================================================
    // Feed Registration
    // ========================================================================

    /// Register a feed, normalizing its URL (trim, lowercase).
    ///
    /// Idempotent: registering a URL that is already present changes
    /// nothing and returns the existing feed.
    pub async fn register_feed(&self, url: &str) -> Result<Feed, DatabaseError> {
        let url = normalize_feed_url(url);
        {
            let _guard = self.write_gate.lock().await;
            sqlx::query("INSERT OR IGNORE INTO feeds (url) VALUES (?)")
                .bind(&url)
                .execute(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;
        }

        self.feed_by_url(&url)
            .await?
            .ok_or(DatabaseError::NotFound(url))
    }

    /// Deregister a feed and every entry that references it.
    ///
    /// Both deletions run in one transaction, so either the feed and all of
    /// its entries remain or none of them do. Returns the number of entries
    /// removed.
    pub async fn deregister_feed(&self, url: &str) -> Result<usize, DatabaseError> {
        let url = normalize_feed_url(url);
        let _guard = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM feeds WHERE url = ?")
            .bind(&url)
            .fetch_optional(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        let Some((feed_id,)) = row else {
            return Err(DatabaseError::NotFound(url));
        };

        let removed = delete_feed_rows(&mut tx, feed_id).await?;
        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        tracing::info!(feed = %url, entries = removed, "Feed removed");
        Ok(removed)
    }

    // ========================================================================
    // Feed Queries
    // ========================================================================

    /// All registered feeds with their validator state, ordered by id
    pub async fn list_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let feeds = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(feeds)
    }

    /// Look up a feed by URL (normalized before comparison)
    pub async fn feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"
        ))
        .bind(normalize_feed_url(url))
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(feed)
    }

    /// Titles already recorded for a feed
    pub async fn known_titles(&self, feed_id: i64) -> Result<HashSet<String>, DatabaseError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT title FROM entries WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(rows.into_iter().map(|(title,)| title).collect())
    }

    // ========================================================================
    // Feed Mutations
    // ========================================================================

    /// Partially update a feed's validators; `None` fields keep their value.
    pub async fn update_feed_validators(
        &self,
        url: &str,
        etag: Option<&str>,
        modified: Option<i64>,
    ) -> Result<(), DatabaseError> {
        let url = normalize_feed_url(url);
        let _guard = self.write_gate.lock().await;
        let result = sqlx::query(
            "UPDATE feeds SET etag = COALESCE(?, etag), modified = COALESCE(?, modified) WHERE url = ?",
        )
        .bind(etag)
        .bind(modified)
        .bind(&url)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(url));
        }
        Ok(())
    }

    /// Record a fetch failure message. Validators are left untouched.
    pub async fn record_feed_error(&self, feed_id: i64, error: &str) -> Result<(), DatabaseError> {
        let _guard = self.write_gate.lock().await;
        sqlx::query("UPDATE feeds SET error = ? WHERE id = ?")
            .bind(error)
            .bind(feed_id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    /// Commit one feed's sync result atomically: advance validators, stamp
    /// `last_synced`, clear the error, and insert every entry whose title
    /// is not already stored.
    ///
    /// Titles are unique across all feeds, so an entry whose title was
    /// recorded by another feed is skipped without error. Returns the number
    /// of entries inserted.
    pub async fn apply_feed_sync(
        &self,
        feed_id: i64,
        validators: &Validators,
        entries: &[NewEntry],
    ) -> Result<usize, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let _guard = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let result = sqlx::query(
            r#"
            UPDATE feeds SET
                etag = COALESCE(?, etag),
                modified = COALESCE(?, modified),
                last_synced = ?,
                error = NULL
            WHERE id = ?
        "#,
        )
        .bind(validators.etag.as_deref())
        .bind(validators.modified)
        .bind(now)
        .bind(feed_id)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            // Feed was removed while its fetch was in flight
            return Err(DatabaseError::NotFound(format!("feed id {}", feed_id)));
        }

        let known: HashSet<String> = sqlx::query_as::<_, (String,)>(
            "SELECT title FROM entries WHERE feed_id = ?",
        )
        .bind(feed_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .into_iter()
        .map(|(title,)| title)
        .collect();

        let mut inserted = 0;
        for entry in entries.iter().filter(|e| !known.contains(&e.title)) {
            if insert_entry(&mut tx, entry).await? {
                inserted += 1;
            }
        }

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(inserted)
    }
}

/// Insert an entry unless its title is already stored; returns whether a
/// row was written.
pub(crate) async fn insert_entry(
    tx: &mut Transaction<'_, Sqlite>,
    entry: &NewEntry,
) -> Result<bool, DatabaseError> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO entries (feed_id, title, link, image, discovered_at, published)
        VALUES (?, ?, ?, ?, ?, 0)
    "#,
    )
    .bind(entry.feed_id)
    .bind(&entry.title)
    .bind(&entry.link)
    .bind(&entry.image)
    .bind(entry.discovered_at)
    .execute(&mut **tx)
    .await
    .map_err(DatabaseError::from_sqlx)?;
    Ok(result.rows_affected() > 0)
}

/// Delete a feed's entries, then the feed row. Callers own the transaction.
async fn delete_feed_rows(
    tx: &mut Transaction<'_, Sqlite>,
    feed_id: i64,
) -> Result<usize, DatabaseError> {
    // Explicit delete so the count is known and removal does not depend on
    // the connection's foreign_keys setting
    let entries = sqlx::query("DELETE FROM entries WHERE feed_id = ?")
        .bind(feed_id)
        .execute(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

    sqlx::query("DELETE FROM feeds WHERE id = ?")
        .bind(feed_id)
        .execute(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

    Ok(entries.rows_affected() as usize)
}
