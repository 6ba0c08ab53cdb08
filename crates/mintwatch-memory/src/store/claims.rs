//! Launch claim lifecycle.
//!
//! Every write is a single statement, so each stage transition is atomic
//! per mention id. Status updates carry a `status_rank < ?` guard: a claim
//! never moves backwards and a stale writer cannot overwrite a later stage.

use super::{now_ts, Store};
use chrono::{DateTime, Utc};
use mintwatch_core::{
    error::MintError,
    launch::{ClaimStatus, FailureReason, LaunchClaim, LaunchRequest, LaunchStage},
    mention::Mention,
    traits::IssuanceReceipt,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

const CLAIM_COLUMNS: &str = "mention_id, status, failed_stage, failure_reason, mention_json, \
     request_json, image_cid, metadata_uri, issuance_address, issuance_signature, authority, \
     issuance_started_at, reply_delivered, created_at, updated_at";

/// Result of trying to claim a mention.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// This call created the claim.
    Created(LaunchClaim),
    /// A claim already existed; resume from its status.
    Existing(LaunchClaim),
}

impl ClaimOutcome {
    pub fn claim(&self) -> &LaunchClaim {
        match self {
            Self::Created(c) | Self::Existing(c) => c,
        }
    }

    pub fn into_claim(self) -> LaunchClaim {
        match self {
            Self::Created(c) | Self::Existing(c) => c,
        }
    }
}

impl Store {
    /// Atomically create a `Claimed` row for the mention, or return the
    /// existing one.
    pub async fn try_claim(
        &self,
        mention: &Mention,
        request: &LaunchRequest,
    ) -> Result<ClaimOutcome, MintError> {
        let now = now_ts();
        let mention_json = serde_json::to_string(mention)?;
        let request_json = serde_json::to_string(request)?;

        let result = sqlx::query(
            "INSERT INTO launch_claims \
             (mention_id, status, status_rank, mention_json, request_json, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(mention_id) DO NOTHING",
        )
        .bind(&mention.id)
        .bind(ClaimStatus::Claimed.as_str())
        .bind(ClaimStatus::Claimed.rank())
        .bind(&mention_json)
        .bind(&request_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| MintError::Store(format!("claim insert failed: {e}")))?;

        let claim = self.get_claim(&mention.id).await?.ok_or_else(|| {
            MintError::Store(format!("claim {} vanished after insert", mention.id))
        })?;

        if result.rows_affected() == 1 {
            Ok(ClaimOutcome::Created(claim))
        } else {
            tracing::info!("claim {} already exists at {}", mention.id, claim.status);
            Ok(ClaimOutcome::Existing(claim))
        }
    }

    /// Fetch a claim by mention id.
    pub async fn get_claim(&self, mention_id: &str) -> Result<Option<LaunchClaim>, MintError> {
        let row = sqlx::query(&format!(
            "SELECT {CLAIM_COLUMNS} FROM launch_claims WHERE mention_id = ?"
        ))
        .bind(mention_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MintError::Store(format!("get claim failed: {e}")))?;

        row.map(|r| claim_from_row(&r)).transpose()
    }

    /// Whether any claim exists for the mention, whatever its status.
    pub async fn is_claimed(&self, mention_id: &str) -> Result<bool, MintError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM launch_claims WHERE mention_id = ?")
                .bind(mention_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| MintError::Store(format!("claim lookup failed: {e}")))?;
        Ok(row.is_some())
    }

    /// Claimed → AssetReady, recording the image content id.
    pub async fn mark_asset_ready(
        &self,
        mention_id: &str,
        image_cid: &str,
    ) -> Result<bool, MintError> {
        let status = ClaimStatus::AssetReady;
        let result = sqlx::query(
            "UPDATE launch_claims SET status = ?, status_rank = ?, image_cid = ?, updated_at = ? \
             WHERE mention_id = ? AND status_rank < ?",
        )
        .bind(status.as_str())
        .bind(status.rank())
        .bind(image_cid)
        .bind(now_ts())
        .bind(mention_id)
        .bind(status.rank())
        .execute(&self.pool)
        .await
        .map_err(|e| MintError::Store(format!("mark asset_ready failed: {e}")))?;
        Ok(result.rows_affected() == 1)
    }

    /// AssetReady → Published, recording the metadata URI.
    pub async fn mark_published(
        &self,
        mention_id: &str,
        metadata_uri: &str,
    ) -> Result<bool, MintError> {
        let status = ClaimStatus::Published;
        let result = sqlx::query(
            "UPDATE launch_claims SET status = ?, status_rank = ?, metadata_uri = ?, \
             updated_at = ? WHERE mention_id = ? AND status_rank < ?",
        )
        .bind(status.as_str())
        .bind(status.rank())
        .bind(metadata_uri)
        .bind(now_ts())
        .bind(mention_id)
        .bind(status.rank())
        .execute(&self.pool)
        .await
        .map_err(|e| MintError::Store(format!("mark published failed: {e}")))?;
        Ok(result.rows_affected() == 1)
    }

    /// Record that the issuance call is about to leave the process.
    ///
    /// Succeeds only once per claim and only from `Published`. A `false`
    /// return means an earlier run already started issuance, so the outcome
    /// of that attempt is unknown.
    pub async fn mark_issuance_started(
        &self,
        mention_id: &str,
        authority: &str,
    ) -> Result<bool, MintError> {
        let result = sqlx::query(
            "UPDATE launch_claims SET issuance_started_at = ?, authority = ?, updated_at = ? \
             WHERE mention_id = ? AND status = ? AND issuance_started_at IS NULL",
        )
        .bind(now_ts())
        .bind(authority)
        .bind(now_ts())
        .bind(mention_id)
        .bind(ClaimStatus::Published.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| MintError::Store(format!("mark issuance_started failed: {e}")))?;
        Ok(result.rows_affected() == 1)
    }

    /// Published → Issued, recording the issuance receipt.
    pub async fn mark_issued(
        &self,
        mention_id: &str,
        receipt: &IssuanceReceipt,
    ) -> Result<bool, MintError> {
        let status = ClaimStatus::Issued;
        let result = sqlx::query(
            "UPDATE launch_claims SET status = ?, status_rank = ?, issuance_address = ?, \
             issuance_signature = ?, updated_at = ? \
             WHERE mention_id = ? AND status_rank < ?",
        )
        .bind(status.as_str())
        .bind(status.rank())
        .bind(&receipt.address)
        .bind(&receipt.signature)
        .bind(now_ts())
        .bind(mention_id)
        .bind(status.rank())
        .execute(&self.pool)
        .await
        .map_err(|e| MintError::Store(format!("mark issued failed: {e}")))?;
        Ok(result.rows_affected() == 1)
    }

    /// Issued → Replied (terminal), whatever the reply delivery outcome.
    pub async fn mark_replied(&self, mention_id: &str, delivered: bool) -> Result<bool, MintError> {
        let status = ClaimStatus::Replied;
        let result = sqlx::query(
            "UPDATE launch_claims SET status = ?, status_rank = ?, reply_delivered = ?, \
             updated_at = ? WHERE mention_id = ? AND status_rank < ?",
        )
        .bind(status.as_str())
        .bind(status.rank())
        .bind(delivered)
        .bind(now_ts())
        .bind(mention_id)
        .bind(status.rank())
        .execute(&self.pool)
        .await
        .map_err(|e| MintError::Store(format!("mark replied failed: {e}")))?;
        Ok(result.rows_affected() == 1)
    }

    /// Move a claim to `Failed`. Refused once the claim has reached
    /// `Issued`: an issued token is never hidden behind a failure.
    pub async fn fail_claim(
        &self,
        mention_id: &str,
        stage: LaunchStage,
        reason: FailureReason,
    ) -> Result<bool, MintError> {
        let status = ClaimStatus::Failed { stage, reason };
        let result = sqlx::query(
            "UPDATE launch_claims SET status = ?, status_rank = ?, failed_stage = ?, \
             failure_reason = ?, updated_at = ? \
             WHERE mention_id = ? AND status_rank < ?",
        )
        .bind(status.as_str())
        .bind(status.rank())
        .bind(stage.as_str())
        .bind(reason.as_str())
        .bind(now_ts())
        .bind(mention_id)
        .bind(ClaimStatus::Issued.rank())
        .execute(&self.pool)
        .await
        .map_err(|e| MintError::Store(format!("fail claim failed: {e}")))?;
        Ok(result.rows_affected() == 1)
    }

    /// Record whether the failure reply for a failed claim got through.
    pub async fn record_reply_delivery(
        &self,
        mention_id: &str,
        delivered: bool,
    ) -> Result<(), MintError> {
        sqlx::query(
            "UPDATE launch_claims SET reply_delivered = ?, updated_at = ? WHERE mention_id = ?",
        )
        .bind(delivered)
        .bind(now_ts())
        .bind(mention_id)
        .execute(&self.pool)
        .await
        .map_err(|e| MintError::Store(format!("record reply delivery failed: {e}")))?;
        Ok(())
    }

    /// Claims whose pipeline has not finished, oldest first: non-terminal
    /// ones, plus terminal ones that never made it into the processed set.
    pub async fn pending_claims(&self) -> Result<Vec<LaunchClaim>, MintError> {
        let rows = sqlx::query(&format!(
            "SELECT {CLAIM_COLUMNS} FROM launch_claims \
             WHERE status_rank < ? \
                OR mention_id NOT IN (SELECT mention_id FROM processed_mentions) \
             ORDER BY created_at ASC"
        ))
        .bind(ClaimStatus::Replied.rank())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MintError::Store(format!("pending claims failed: {e}")))?;

        rows.iter().map(claim_from_row).collect()
    }

    /// Failed claims, most recent first.
    pub async fn failed_claims(&self, limit: i64) -> Result<Vec<LaunchClaim>, MintError> {
        let rows = sqlx::query(&format!(
            "SELECT {CLAIM_COLUMNS} FROM launch_claims \
             WHERE status = 'failed' ORDER BY updated_at DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MintError::Store(format!("failed claims query failed: {e}")))?;

        rows.iter().map(claim_from_row).collect()
    }

    /// Number of claims per status column value.
    pub async fn claim_counts(&self) -> Result<Vec<(String, i64)>, MintError> {
        sqlx::query_as(
            "SELECT status, COUNT(*) FROM launch_claims GROUP BY status ORDER BY MIN(status_rank)",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MintError::Store(format!("claim counts failed: {e}")))
    }
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>, MintError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MintError::Store(format!("bad timestamp {value:?}: {e}")))
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, MintError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| MintError::Store(format!("bad column {name}: {e}")))
}

fn claim_from_row(row: &SqliteRow) -> Result<LaunchClaim, MintError> {
    let mention_id: String = column(row, "mention_id")?;
    let status_raw: String = column(row, "status")?;
    let stage: Option<String> = column(row, "failed_stage")?;
    let reason: Option<String> = column(row, "failure_reason")?;
    let status = ClaimStatus::from_columns(&status_raw, stage.as_deref(), reason.as_deref())
        .ok_or_else(|| {
            MintError::Store(format!("claim {mention_id} has unknown status {status_raw:?}"))
        })?;

    let mention_json: String = column(row, "mention_json")?;
    let request_json: String = column(row, "request_json")?;
    let started: Option<String> = column(row, "issuance_started_at")?;
    let created: String = column(row, "created_at")?;
    let updated: String = column(row, "updated_at")?;

    Ok(LaunchClaim {
        status,
        mention: serde_json::from_str(&mention_json)?,
        request: serde_json::from_str(&request_json)?,
        image_cid: column(row, "image_cid")?,
        metadata_uri: column(row, "metadata_uri")?,
        issuance_address: column(row, "issuance_address")?,
        issuance_signature: column(row, "issuance_signature")?,
        authority: column(row, "authority")?,
        issuance_started_at: started.as_deref().map(parse_ts).transpose()?,
        reply_delivered: column(row, "reply_delivered")?,
        created_at: parse_ts(&created)?,
        updated_at: parse_ts(&updated)?,
        mention_id,
    })
}
