use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock past the busy timeout
    #[error("Database is locked by another feedbird process. Wait for it to finish and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// The operation referenced a feed that is not registered
    #[error("Feed not found: {0}")]
    NotFound(String),

    /// The store could not be read or written
    #[error("Database unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Unavailable(err)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Cache validators presented on a conditional fetch.
///
/// `modified` is the upstream `Last-Modified` time as Unix seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub etag: Option<String>,
    pub modified: Option<i64>,
}

impl Validators {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.modified.is_none()
    }
}

/// A registered feed
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub url: String,
    pub etag: Option<String>,
    pub modified: Option<i64>,
    /// Unix time of the last successful (modified or not) sync
    pub last_synced: Option<i64>,
    /// Message of the most recent fetch failure, cleared on success
    pub error: Option<String>,
}

impl Feed {
    pub fn validators(&self) -> Validators {
        Validators {
            etag: self.etag.clone(),
            modified: self.modified,
        }
    }
}

/// An entry about to be recorded by the sync engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub feed_id: i64,
    pub title: String,
    pub link: Option<String>,
    pub image: Option<String>,
    pub discovered_at: i64,
}

/// A stored entry
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Entry {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub link: Option<String>,
    pub image: Option<String>,
    pub discovered_at: i64,
    pub published: bool,
    pub publish_attempts: i64,
    pub abandoned: bool,
    pub last_error: Option<String>,
}

/// Outcome of recording a failed publish attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishFailure {
    pub attempts: i64,
    pub abandoned: bool,
}

/// Entry totals by publish state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryCounts {
    pub total: i64,
    pub published: i64,
    pub pending: i64,
    pub abandoned: i64,
}
