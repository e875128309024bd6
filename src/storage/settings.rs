use std::collections::BTreeMap;

use super::schema::Database;
use super::types::DatabaseError;

impl Database {
    // ========================================================================
    // Settings Operations
    // ========================================================================

    /// Get every key/value pair stored under a category.
    ///
    /// Returns an empty map if the category has no settings.
    pub async fn get_settings(
        &self,
        category: &str,
    ) -> Result<BTreeMap<String, String>, DatabaseError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM settings WHERE category = ? ORDER BY key")
                .bind(category)
                .fetch_all(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;

        Ok(rows.into_iter().collect())
    }

    /// Upsert each pair under a category in one transaction.
    ///
    /// Keys are unique across categories: writing an existing key replaces
    /// its value and moves it to `category`.
    pub async fn put_settings(
        &self,
        category: &str,
        settings: &BTreeMap<String, String>,
    ) -> Result<(), DatabaseError> {
        if settings.is_empty() {
            return Ok(());
        }

        let _guard = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;
        for (key, value) in settings {
            sqlx::query(
                r#"
                INSERT INTO settings (category, key, value)
                VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET category = excluded.category, value = excluded.value
            "#,
            )
            .bind(category)
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        }
        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }
}
