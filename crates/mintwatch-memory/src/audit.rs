//! Launch audit log: every stage transition and reply attempt.

use mintwatch_core::error::MintError;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

/// Kinds of audited events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    Claimed,
    Resumed,
    AssetReady,
    Published,
    IssuanceStarted,
    Issued,
    Failed,
    ReplySent,
    ReplyFailed,
    Ignored,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claimed => "claimed",
            Self::Resumed => "resumed",
            Self::AssetReady => "asset_ready",
            Self::Published => "published",
            Self::IssuanceStarted => "issuance_started",
            Self::Issued => "issued",
            Self::Failed => "failed",
            Self::ReplySent => "reply_sent",
            Self::ReplyFailed => "reply_failed",
            Self::Ignored => "ignored",
        }
    }
}

/// Audit logger backed by SQLite.
#[derive(Clone)]
pub struct AuditLogger {
    pool: SqlitePool,
}

impl AuditLogger {
    /// Create a new audit logger sharing the given pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an event for a mention.
    pub async fn log(
        &self,
        mention_id: &str,
        event: AuditEvent,
        detail: Option<&str>,
    ) -> Result<(), MintError> {
        sqlx::query(
            "INSERT INTO launch_audit (id, mention_id, event, detail, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(mention_id)
        .bind(event.as_str())
        .bind(detail)
        .bind(crate::store::now_ts())
        .execute(&self.pool)
        .await
        .map_err(|e| MintError::Store(format!("audit log write failed: {e}")))?;

        debug!(
            "audit: {mention_id} {} {}",
            event.as_str(),
            detail.unwrap_or_default()
        );
        Ok(())
    }

    /// Event names for a mention in the order they were written.
    pub async fn history(&self, mention_id: &str) -> Result<Vec<String>, MintError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT event FROM launch_audit WHERE mention_id = ? \
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(mention_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MintError::Store(format!("audit history failed: {e}")))?;
        Ok(rows.into_iter().map(|(e,)| e).collect())
    }
}
