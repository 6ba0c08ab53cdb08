//! Launch orchestrator. Drives one claim through the five stages.
//!
//! ```text
//! Claimed ─► AssetReady ─► Published ─► Issued ─► Replied
//!    │            │            │
//!    └────────────┴────────────┴──► Failed(stage, reason)
//! ```
//!
//! The claim row is re-read before every stage, so each stage acts on the
//! durable status rather than on what this process believes.

use super::{messages, Gateway};
use mintwatch_core::{
    error::MintError,
    launch::{ClaimStatus, FailureReason, LaunchClaim, LaunchRequest, LaunchStage},
    mention::Mention,
    retry::with_retry,
    traits::{IssuanceRequest, TokenMetadata},
};
use mintwatch_memory::{audit::AuditEvent, ClaimOutcome};
use tracing::{error, info, warn};

/// Outcome label written to the processed set.
pub(super) const OUTCOME_LAUNCHED: &str = "launched";
pub(super) const OUTCOME_FAILED: &str = "failed";
pub(super) const OUTCOME_IGNORED: &str = "ignored";

/// Why a stage stopped.
enum StageError {
    /// Terminal for this claim.
    Failed(LaunchStage, FailureReason, String),
    /// Leave the claim where it is and surface the error.
    Abort(MintError),
}

impl StageError {
    /// Classify a service error raised during `stage`.
    fn at(stage: LaunchStage) -> impl Fn(MintError) -> StageError {
        move |e| match e {
            MintError::Ambiguous(msg) => Self::Failed(stage, FailureReason::Ambiguous, msg),
            MintError::Transient(msg) | MintError::SessionExpired(msg) => {
                Self::Failed(stage, FailureReason::Exhausted, msg)
            }
            MintError::Permanent(msg) | MintError::Config(msg) => {
                Self::Failed(stage, FailureReason::Rejected, msg)
            }
            other => Self::Abort(other),
        }
    }
}

/// Store errors leave the claim for the next recovery pass.
impl From<MintError> for StageError {
    fn from(e: MintError) -> Self {
        Self::Abort(e)
    }
}

type StageResult = Result<(), StageError>;

impl Gateway {
    /// Claim a freshly interpreted mention and run it to a terminal status
    /// (or until shutdown).
    pub(super) async fn launch(
        &self,
        mention: &Mention,
        request: &LaunchRequest,
    ) -> Result<ClaimStatus, MintError> {
        info!(
            "launch: ${} ({}) requested by @{} in {}",
            request.symbol, request.name, mention.author, mention.id
        );
        let claim = match self.memory.try_claim(mention, request).await? {
            ClaimOutcome::Created(claim) => {
                self.audit_event(&claim.mention_id, AuditEvent::Claimed, None)
                    .await;
                claim
            }
            ClaimOutcome::Existing(claim) => {
                self.audit_event(
                    &claim.mention_id,
                    AuditEvent::Resumed,
                    Some(claim.status.as_str()),
                )
                .await;
                claim
            }
        };
        self.drive(claim).await
    }

    /// Resume a claim loaded from the store.
    pub(super) async fn resume(&self, claim: LaunchClaim) -> Result<ClaimStatus, MintError> {
        info!("resume: {} at {}", claim.mention_id, claim.status);
        self.audit_event(
            &claim.mention_id,
            AuditEvent::Resumed,
            Some(claim.status.as_str()),
        )
        .await;
        self.drive(claim).await
    }

    /// Advance the claim stage by stage.
    async fn drive(&self, mut claim: LaunchClaim) -> Result<ClaimStatus, MintError> {
        let id = claim.mention_id.clone();
        loop {
            let outcome = match claim.status {
                ClaimStatus::Replied => Some(OUTCOME_LAUNCHED),
                ClaimStatus::Failed { reason, .. } => {
                    // A crash between the failure write and the reply.
                    if claim.reply_delivered.is_none() {
                        self.failure_reply(&claim, reason).await?;
                    }
                    Some(OUTCOME_FAILED)
                }
                _ => None,
            };
            if let Some(outcome) = outcome {
                self.memory.mark_processed(&id, outcome).await?;
                return Ok(claim.status);
            }
            if self.stopping() {
                info!("launch: {id} paused at {} for shutdown", claim.status);
                return Ok(claim.status);
            }

            let result = match claim.status {
                ClaimStatus::Claimed => self.stage_asset(&claim).await,
                ClaimStatus::AssetReady => self.stage_metadata(&claim).await,
                ClaimStatus::Published => self.stage_issue(&claim).await,
                ClaimStatus::Issued => self.stage_confirm(&claim).await,
                ClaimStatus::Replied | ClaimStatus::Failed { .. } => unreachable!(),
            };

            match result {
                Ok(()) => {}
                Err(StageError::Failed(stage, reason, detail)) => {
                    self.fail(&claim, stage, reason, &detail).await?;
                }
                Err(StageError::Abort(e)) => {
                    warn!("launch: {id} stopped at {}: {e}", claim.status);
                    return Err(e);
                }
            }

            let before = claim.status;
            claim = self
                .memory
                .get_claim(&id)
                .await?
                .ok_or_else(|| MintError::Store(format!("claim {id} disappeared")))?;
            if claim.status == before && !self.stopping() {
                return Err(MintError::Store(format!(
                    "claim {id} did not advance past {before}"
                )));
            }
        }
    }

    /// Claimed → AssetReady: download the first attachment and pin it.
    async fn stage_asset(&self, claim: &LaunchClaim) -> StageResult {
        let Some(url) = claim.mention.primary_image() else {
            return Err(StageError::Failed(
                LaunchStage::AssetFetch,
                FailureReason::NoImage,
                "mention has no image attachment".into(),
            ));
        };

        // Permanent on a non-image, so no retry envelope.
        let asset = match self.launch.assets.fetch_image(url).await {
            Ok(asset) => asset,
            Err(MintError::Permanent(msg)) => {
                return Err(StageError::Failed(
                    LaunchStage::AssetFetch,
                    FailureReason::NoImage,
                    msg,
                ));
            }
            Err(e) => return Err(StageError::at(LaunchStage::AssetFetch)(e)),
        };

        let cid = with_retry("image upload", &self.policies.publish, || {
            self.launch.pins.upload_image(&asset)
        })
        .await
        .map_err(StageError::at(LaunchStage::AssetPublish))?;
        if self.memory.mark_asset_ready(&claim.mention_id, &cid).await? {
            self.audit_event(&claim.mention_id, AuditEvent::AssetReady, Some(&cid))
                .await;
        }
        Ok(())
    }

    /// AssetReady → Published: pin the metadata document.
    async fn stage_metadata(&self, claim: &LaunchClaim) -> StageResult {
        let cid = claim.image_cid.as_deref().ok_or_else(|| {
            StageError::Abort(MintError::Store(format!(
                "claim {} is asset_ready without an image cid",
                claim.mention_id
            )))
        })?;
        let metadata = TokenMetadata {
            name: claim.request.name.clone(),
            symbol: claim.request.symbol.clone(),
            description: format!(
                "{} launched by @{} via @{}",
                claim.request.name, claim.mention.author, self.handle
            ),
            image: self.launch.pins.uri_for(cid),
            external_url: claim.mention.permalink.clone(),
        };

        let uri = with_retry("metadata upload", &self.policies.publish, || {
            self.launch.pins.upload_metadata(&metadata)
        })
        .await
        .map_err(StageError::at(LaunchStage::AssetPublish))?;
        if self.memory.mark_published(&claim.mention_id, &uri).await? {
            self.audit_event(&claim.mention_id, AuditEvent::Published, Some(&uri))
                .await;
        }
        Ok(())
    }

    /// Published → Issued. Runs at most once per claim.
    async fn stage_issue(&self, claim: &LaunchClaim) -> StageResult {
        let id = &claim.mention_id;
        if claim.issuance_started_at.is_some() {
            return Err(StageError::Failed(
                LaunchStage::Issuance,
                FailureReason::Ambiguous,
                "issuance was started by an earlier run with unknown outcome".into(),
            ));
        }
        let metadata_uri = claim.metadata_uri.clone().ok_or_else(|| {
            StageError::Abort(MintError::Store(format!(
                "claim {id} is published without a metadata uri"
            )))
        })?;

        // Pool keys are consumed when drawn; once drawn, one is used.
        if self.stopping() {
            return Ok(());
        }
        let keypair = with_retry("authority key", &self.policies.issuance, || {
            self.launch.keys.next_keypair()
        })
        .await
        .map_err(StageError::at(LaunchStage::Issuance))?;

        if !self.memory.mark_issuance_started(id, &keypair.public).await? {
            return Err(StageError::Failed(
                LaunchStage::Issuance,
                FailureReason::Ambiguous,
                "issuance already started for this claim".into(),
            ));
        }
        self.audit_event(id, AuditEvent::IssuanceStarted, Some(&keypair.public))
            .await;

        let request = IssuanceRequest {
            name: claim.request.name.clone(),
            symbol: claim.request.symbol.clone(),
            metadata_uri,
            authority: keypair.public.clone(),
            client_ref: id.clone(),
        };
        let receipt = with_retry("issuance", &self.policies.issuance, || {
            self.launch.issuer.issue(&request, &keypair)
        })
        .await
        .map_err(StageError::at(LaunchStage::Issuance))?;

        if self.memory.mark_issued(id, &receipt).await? {
            self.audit_event(id, AuditEvent::Issued, Some(&receipt.address))
                .await;
        }
        Ok(())
    }

    /// Issued → Replied, whether or not the reply got through.
    async fn stage_confirm(&self, claim: &LaunchClaim) -> StageResult {
        let id = &claim.mention_id;
        let address = claim.issuance_address.as_deref().unwrap_or("unknown");
        let text = messages::launched(&claim.request, address);

        let delivered = self.replies.reply(&claim.mention, &text).await;
        let event = if delivered {
            AuditEvent::ReplySent
        } else {
            AuditEvent::ReplyFailed
        };
        self.audit_event(id, event, None).await;
        self.memory.mark_replied(id, delivered).await?;
        Ok(())
    }

    /// Move to Failed and send the best-effort failure reply.
    async fn fail(
        &self,
        claim: &LaunchClaim,
        stage: LaunchStage,
        reason: FailureReason,
        detail: &str,
    ) -> Result<(), MintError> {
        let id = &claim.mention_id;
        if !self.memory.fail_claim(id, stage, reason).await? {
            warn!("launch: {id} could not be failed from {}", claim.status);
            return Ok(());
        }
        if reason == FailureReason::Ambiguous {
            error!("launch: {id} needs reconciliation ({stage}): {detail}");
        } else {
            warn!("launch: {id} failed at {stage} ({}): {detail}", reason.as_str());
        }
        let status = ClaimStatus::Failed { stage, reason }.to_string();
        self.audit_event(id, AuditEvent::Failed, Some(&status)).await;
        self.failure_reply(claim, reason).await
    }

    /// Best-effort failure reply; the delivery outcome is recorded.
    async fn failure_reply(
        &self,
        claim: &LaunchClaim,
        reason: FailureReason,
    ) -> Result<(), MintError> {
        let id = &claim.mention_id;
        let delivered = self
            .replies
            .reply(&claim.mention, messages::failed(reason))
            .await;
        let event = if delivered {
            AuditEvent::ReplySent
        } else {
            AuditEvent::ReplyFailed
        };
        self.audit_event(id, event, None).await;
        self.memory.record_reply_delivery(id, delivered).await
    }

    /// Audit writes never stop the pipeline.
    pub(super) async fn audit_event(&self, id: &str, event: AuditEvent, detail: Option<&str>) {
        if let Err(e) = self.audit.log(id, event, detail).await {
            warn!("audit: {e}");
        }
    }
}
