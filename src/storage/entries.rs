use super::feeds::insert_entry;
use super::schema::Database;
use super::types::{DatabaseError, Entry, EntryCounts, NewEntry, PublishFailure};

const ENTRY_COLUMNS: &str = "id, feed_id, title, link, image, discovered_at, published, \
                             publish_attempts, abandoned, last_error";

impl Database {
    // ========================================================================
    // Entry Mutations
    // ========================================================================

    /// Insert an entry only if its title is not stored anywhere yet.
    ///
    /// Returns whether an insert occurred. Duplicate inserts are no-ops, so
    /// the call is safe to retry.
    pub async fn insert_entry_if_new(&self, entry: &NewEntry) -> Result<bool, DatabaseError> {
        let _guard = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;
        let inserted = insert_entry(&mut tx, entry).await?;
        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(inserted)
    }

    /// Mark an entry published (idempotent), returns whether it was changed
    ///
    /// `WHERE published = 0` makes the transition one-way: a published entry
    /// is never rewritten.
    pub async fn mark_published(&self, entry_id: i64) -> Result<bool, DatabaseError> {
        let _guard = self.write_gate.lock().await;
        let result = sqlx::query(
            "UPDATE entries SET published = 1, last_error = NULL WHERE id = ? AND published = 0",
        )
        .bind(entry_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    /// Count a failed publish attempt and store its error.
    ///
    /// With `max_attempts > 0`, the entry is abandoned once its attempt
    /// count reaches the limit and drops out of [`Database::unpublished_entries`].
    /// `max_attempts == 0` retries forever. Published entries are untouched.
    pub async fn record_publish_failure(
        &self,
        entry_id: i64,
        error: &str,
        max_attempts: u32,
    ) -> Result<PublishFailure, DatabaseError> {
        let _guard = self.write_gate.lock().await;
        let row: Option<(i64, bool)> = sqlx::query_as(
            r#"
            UPDATE entries SET
                publish_attempts = publish_attempts + 1,
                last_error = ?,
                abandoned = CASE
                    WHEN ? > 0 AND publish_attempts + 1 >= ? THEN 1
                    ELSE abandoned
                END
            WHERE id = ? AND published = 0
            RETURNING publish_attempts, abandoned
        "#,
        )
        .bind(error)
        .bind(max_attempts)
        .bind(max_attempts)
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let (attempts, abandoned) =
            row.ok_or_else(|| DatabaseError::NotFound(format!("unpublished entry {}", entry_id)))?;
        Ok(PublishFailure {
            attempts,
            abandoned,
        })
    }

    // ========================================================================
    // Entry Queries
    // ========================================================================

    /// Entries waiting to be published, oldest first (ascending id)
    pub async fn unpublished_entries(&self) -> Result<Vec<Entry>, DatabaseError> {
        let entries = sqlx::query_as::<_, Entry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE published = 0 AND abandoned = 0 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(entries)
    }

    /// Entries recorded for a feed, ascending id
    pub async fn entries_for_feed(&self, feed_id: i64) -> Result<Vec<Entry>, DatabaseError> {
        let entries = sqlx::query_as::<_, Entry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE feed_id = ? ORDER BY id"
        ))
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(entries)
    }

    /// Entry totals across all feeds
    pub async fn entry_counts(&self) -> Result<EntryCounts, DatabaseError> {
        let (total, published, pending, abandoned): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(CASE WHEN published = 1 THEN 1 END),
                COUNT(CASE WHEN published = 0 AND abandoned = 0 THEN 1 END),
                COUNT(CASE WHEN published = 0 AND abandoned = 1 THEN 1 END)
            FROM entries
        "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(EntryCounts {
            total,
            published,
            pending,
            abandoned,
        })
    }
}
