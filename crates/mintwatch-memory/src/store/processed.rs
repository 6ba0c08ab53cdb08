//! The processed set: mentions whose pipeline has terminated.

use super::{now_ts, Store};
use mintwatch_core::error::MintError;

impl Store {
    /// Record a mention as resolved. Idempotent; the first outcome wins.
    pub async fn mark_processed(&self, mention_id: &str, outcome: &str) -> Result<(), MintError> {
        sqlx::query(
            "INSERT INTO processed_mentions (mention_id, outcome, processed_at) VALUES (?, ?, ?) \
             ON CONFLICT(mention_id) DO NOTHING",
        )
        .bind(mention_id)
        .bind(outcome)
        .bind(now_ts())
        .execute(&self.pool)
        .await
        .map_err(|e| MintError::Store(format!("mark processed failed: {e}")))?;
        Ok(())
    }

    pub async fn is_processed(&self, mention_id: &str) -> Result<bool, MintError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM processed_mentions WHERE mention_id = ?")
                .bind(mention_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| MintError::Store(format!("processed lookup failed: {e}")))?;
        Ok(row.is_some())
    }

    /// Outcome recorded for a processed mention.
    pub async fn processed_outcome(&self, mention_id: &str) -> Result<Option<String>, MintError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT outcome FROM processed_mentions WHERE mention_id = ?")
                .bind(mention_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| MintError::Store(format!("processed lookup failed: {e}")))?;
        Ok(row.map(|(o,)| o))
    }

    pub async fn processed_count(&self) -> Result<i64, MintError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM processed_mentions")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MintError::Store(format!("processed count failed: {e}")))?;
        Ok(count)
    }
}
