use std::time::Duration;

use super::{Message, PublishError, Publisher};
use crate::storage::{Database, DatabaseError, Entry};

/// Tuning for a publish run.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Upper bound on a single publish call
    pub timeout: Duration,
    /// Failed attempts before an entry is abandoned; 0 retries forever
    pub max_attempts: u32,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

/// Totals for one publish run.
///
/// `abandoned` counts entries that reached the attempt limit during this
/// run; they are also included in `failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub attempted: usize,
    pub published: usize,
    pub failed: usize,
    pub abandoned: usize,
}

/// Publishes pending entries one at a time, oldest first.
pub struct PublishEngine<P> {
    publisher: P,
    options: PublishOptions,
}

impl<P: Publisher> PublishEngine<P> {
    pub fn new(publisher: P, options: PublishOptions) -> Self {
        Self { publisher, options }
    }

    #[cfg(test)]
    pub(crate) fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Publishes every unpublished entry.
    ///
    /// An entry is marked published only after the publisher reports
    /// success. Failures are recorded on the entry and the run moves on;
    /// only store errors end the run early.
    pub async fn run(&self, db: &Database) -> Result<PublishReport, DatabaseError> {
        let entries = db.unpublished_entries().await?;
        let mut report = PublishReport::default();

        for entry in &entries {
            report.attempted += 1;
            match self.publish_one(entry).await {
                Ok(()) => {
                    if db.mark_published(entry.id).await? {
                        report.published += 1;
                    } else {
                        tracing::debug!(entry_id = entry.id, "Entry was already published");
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    if self.record_failure(db, entry, &e).await? {
                        report.abandoned += 1;
                    }
                }
            }
        }

        tracing::info!(
            attempted = report.attempted,
            published = report.published,
            failed = report.failed,
            abandoned = report.abandoned,
            "Publish run complete"
        );
        Ok(report)
    }

    async fn publish_one(&self, entry: &Entry) -> Result<(), PublishError> {
        let message = Message::for_entry(entry);
        tokio::time::timeout(self.options.timeout, self.publisher.publish(&message))
            .await
            .unwrap_or(Err(PublishError::Timeout))
    }

    /// Returns whether the entry was abandoned by this failure.
    async fn record_failure(
        &self,
        db: &Database,
        entry: &Entry,
        error: &PublishError,
    ) -> Result<bool, DatabaseError> {
        let failure = match db
            .record_publish_failure(entry.id, &error.to_string(), self.options.max_attempts)
            .await
        {
            Ok(failure) => failure,
            // Published or removed by another run in the meantime
            Err(DatabaseError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        if failure.abandoned {
            tracing::error!(
                entry_id = entry.id,
                title = %entry.title,
                attempts = failure.attempts,
                error = %error,
                "Giving up on entry after repeated publish failures"
            );
        } else {
            tracing::warn!(
                entry_id = entry.id,
                attempts = failure.attempts,
                error = %error,
                "Publish failed, will retry next run"
            );
        }
        Ok(failure.abandoned)
    }
}
