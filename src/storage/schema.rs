use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::types::DatabaseError;

/// How long a second invocation against the same file waits for the write
/// lock before failing with `InstanceLocked`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
    /// Held for the duration of every write transaction (SQLite allows a
    /// single writer).
    pub(crate) write_gate: Arc<Mutex<()>>,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// `":memory:"` opens a private in-memory database backed by a single
    /// pooled connection, so every operation sees the same data.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process keeps the
    /// database locked beyond the busy timeout, `DatabaseError::Migration`
    /// if the schema cannot be created, and `DatabaseError::Unavailable` for
    /// other failures.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        Self::open_with_busy_timeout(path, BUSY_TIMEOUT).await
    }

    pub(crate) async fn open_with_busy_timeout(
        path: &str,
        busy_timeout: Duration,
    ) -> Result<Self, DatabaseError> {
        let in_memory = path == ":memory:";
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .foreign_keys(true)
            .busy_timeout(busy_timeout);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .acquire_timeout(Duration::from_secs(10));
        if in_memory {
            // The database lives only as long as its one connection
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let db = Self {
            pool,
            write_gate: Arc::new(Mutex::new(())),
        };
        db.migrate().await.map_err(|e| match DatabaseError::from_sqlx(e) {
            DatabaseError::Unavailable(e) => DatabaseError::Migration(e.to_string()),
            other => other,
        })?;
        tracing::debug!(path = %path, "Database opened");
        Ok(db)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let _guard = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                id INTEGER PRIMARY KEY,
                url TEXT UNIQUE NOT NULL,
                etag TEXT,
                modified INTEGER,
                last_synced INTEGER,
                error TEXT
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Title is the de-duplication key across all feeds
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY,
                feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                title TEXT NOT NULL UNIQUE,
                link TEXT,
                image TEXT,
                discovered_at INTEGER NOT NULL,
                published INTEGER NOT NULL DEFAULT 0,
                publish_attempts INTEGER NOT NULL DEFAULT 0,
                abandoned INTEGER NOT NULL DEFAULT 0,
                last_error TEXT
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_feed ON entries(feed_id)")
            .execute(&mut *tx)
            .await?;

        // Partial index for the publish queue
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_entries_pending ON entries(id) WHERE published = 0 AND abandoned = 0",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                category TEXT NOT NULL,
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_settings_category ON settings(category)")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
