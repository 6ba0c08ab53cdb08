use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A parsed launch command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    /// Upper-cased ticker, at most [`crate::command::MAX_SYMBOL_LEN`] chars.
    pub symbol: String,
    /// Display name as the requester wrote it.
    pub name: String,
    pub mention_id: String,
}

/// Pipeline stage, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchStage {
    Claim,
    AssetFetch,
    AssetPublish,
    Issuance,
    Confirm,
}

impl LaunchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claim => "claim",
            Self::AssetFetch => "asset_fetch",
            Self::AssetPublish => "asset_publish",
            Self::Issuance => "issuance",
            Self::Confirm => "confirm",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "claim" => Some(Self::Claim),
            "asset_fetch" => Some(Self::AssetFetch),
            "asset_publish" => Some(Self::AssetPublish),
            "issuance" => Some(Self::Issuance),
            "confirm" => Some(Self::Confirm),
            _ => None,
        }
    }
}

impl std::fmt::Display for LaunchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure class, which decides the reply text and whether an operator
/// has to reconcile the claim by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The post carried no usable image.
    NoImage,
    /// Retries exhausted on a transient error.
    Exhausted,
    /// A service rejected the request outright.
    Rejected,
    /// Outcome unknown; needs external reconciliation.
    Ambiguous,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoImage => "no_image",
            Self::Exhausted => "exhausted",
            Self::Rejected => "rejected",
            Self::Ambiguous => "ambiguous",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "no_image" => Some(Self::NoImage),
            "exhausted" => Some(Self::Exhausted),
            "rejected" => Some(Self::Rejected),
            "ambiguous" => Some(Self::Ambiguous),
            _ => None,
        }
    }
}

/// Durable status of a launch claim.
///
/// Non-failed statuses are totally ordered by [`ClaimStatus::rank`] and a
/// claim only ever moves to a higher rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimStatus {
    Claimed,
    AssetReady,
    Published,
    Issued,
    Replied,
    Failed {
        stage: LaunchStage,
        reason: FailureReason,
    },
}

impl ClaimStatus {
    /// Column value for the `status` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claimed => "claimed",
            Self::AssetReady => "asset_ready",
            Self::Published => "published",
            Self::Issued => "issued",
            Self::Replied => "replied",
            Self::Failed { .. } => "failed",
        }
    }

    /// Ordering used for forward-only updates. Failed sits above every
    /// in-flight status so it can be entered from any of them, and below
    /// nothing, so it is never left.
    pub fn rank(&self) -> i64 {
        match self {
            Self::Claimed => 0,
            Self::AssetReady => 1,
            Self::Published => 2,
            Self::Issued => 3,
            Self::Replied => 4,
            Self::Failed { .. } => 5,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Replied | Self::Failed { .. })
    }

    /// Rebuild from the stored columns.
    pub fn from_columns(status: &str, stage: Option<&str>, reason: Option<&str>) -> Option<Self> {
        match status {
            "claimed" => Some(Self::Claimed),
            "asset_ready" => Some(Self::AssetReady),
            "published" => Some(Self::Published),
            "issued" => Some(Self::Issued),
            "replied" => Some(Self::Replied),
            "failed" => Some(Self::Failed {
                stage: stage.and_then(LaunchStage::parse)?,
                reason: reason.and_then(FailureReason::parse)?,
            }),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed { stage, reason } => {
                write!(f, "failed({}, {})", stage.as_str(), reason.as_str())
            }
            other => f.write_str(other.as_str()),
        }
    }
}

/// The durable idempotency record for one mention.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchClaim {
    pub mention_id: String,
    pub status: ClaimStatus,
    pub mention: crate::mention::Mention,
    pub request: LaunchRequest,
    pub image_cid: Option<String>,
    pub metadata_uri: Option<String>,
    /// Set once issuance has succeeded.
    pub issuance_address: Option<String>,
    pub issuance_signature: Option<String>,
    pub authority: Option<String>,
    /// Written immediately before the issuance call leaves the process.
    pub issuance_started_at: Option<DateTime<Utc>>,
    pub reply_delivered: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
