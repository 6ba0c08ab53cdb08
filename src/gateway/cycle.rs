//! One poll cycle: recovery, scan, dedup, interpret, launch.

use super::pipeline::OUTCOME_IGNORED;
use super::Gateway;
use mintwatch_core::{error::MintError, launch::ClaimStatus};
use mintwatch_memory::audit::AuditEvent;
use std::fmt;
use tracing::{debug, info, warn};

/// What a cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Another cycle held the guard; nothing ran.
    pub skipped: bool,
    pub resumed: usize,
    pub scanned: usize,
    pub fresh: usize,
    pub ignored: usize,
    pub launched: usize,
    pub failed: usize,
    /// Claims left non-terminal (shutdown or store trouble).
    pub pending: usize,
}

impl CycleReport {
    fn record(&mut self, status: &ClaimStatus) {
        match status {
            ClaimStatus::Replied => self.launched += 1,
            ClaimStatus::Failed { .. } => self.failed += 1,
            _ => self.pending += 1,
        }
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.skipped {
            return f.write_str("skipped (previous cycle still running)");
        }
        write!(
            f,
            "resumed {}, scanned {}, new {}, ignored {}, launched {}, failed {}, pending {}",
            self.resumed,
            self.scanned,
            self.fresh,
            self.ignored,
            self.launched,
            self.failed,
            self.pending
        )
    }
}

impl Gateway {
    /// Run one cycle. Only fatal and store errors surface; per-mention
    /// failures end up on the claim.
    pub async fn run_cycle(&self) -> Result<CycleReport, MintError> {
        let Some(_guard) = self.try_begin_cycle() else {
            debug!("cycle: previous cycle still running, skipping");
            return Ok(CycleReport {
                skipped: true,
                ..Default::default()
            });
        };
        let mut report = CycleReport::default();

        self.session.ensure_authenticated().await?;

        // Recovery before scanning: dedup hides claimed ids from new scans.
        for claim in self.memory.pending_claims().await? {
            if self.stopping() {
                return Ok(report);
            }
            report.resumed += 1;
            let id = claim.mention_id.clone();
            match self.resume(claim).await {
                Ok(status) => report.record(&status),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("cycle: resume of {id} failed: {e}");
                    report.pending += 1;
                }
            }
        }

        let scanned = self.scanner.scan().await?;
        report.scanned = scanned.len();
        let fresh = self.dedup.dedup(scanned).await?;
        report.fresh = fresh.len();

        for mention in &fresh {
            if self.stopping() {
                info!("cycle: shutdown requested, leaving remaining mentions");
                break;
            }
            let Some(request) = self.interpreter.interpret(&mention.text, &mention.id) else {
                debug!("cycle: {} is not a launch command", mention.id);
                self.memory.mark_processed(&mention.id, OUTCOME_IGNORED).await?;
                self.audit_event(&mention.id, AuditEvent::Ignored, None).await;
                report.ignored += 1;
                continue;
            };
            match self.launch(mention, &request).await {
                Ok(status) => report.record(&status),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("cycle: launch for {} interrupted: {e}", mention.id);
                    report.pending += 1;
                }
            }
        }

        Ok(report)
    }
}
