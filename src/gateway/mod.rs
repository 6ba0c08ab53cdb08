//! Gateway: the poll loop connecting the feed, the launch pipeline, and
//! the store.
//!
//! One cycle: resume unfinished claims, scan both feed views, drop known
//! mentions, then interpret and launch the rest newest first.

mod cycle;
mod messages;
mod pipeline;

use mintwatch_core::{
    command::CommandInterpreter,
    retry::RetryPolicy,
    traits::{AssetSource, AssetStore, IssuanceService, KeyProvider},
};
use mintwatch_feed::{Deduplicator, FeedScanner, ReplyDispatcher, SessionManager};
use mintwatch_memory::{AuditLogger, Store};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// External services the launch pipeline calls.
pub struct LaunchServices {
    pub assets: Arc<dyn AssetSource>,
    pub pins: Arc<dyn AssetStore>,
    pub keys: Arc<dyn KeyProvider>,
    pub issuer: Arc<dyn IssuanceService>,
}

/// Retry budgets for the pipeline stages that retry.
#[derive(Debug, Clone, Copy)]
pub struct StagePolicies {
    pub publish: RetryPolicy,
    pub issuance: RetryPolicy,
}

/// The poll loop and everything it drives.
pub struct Gateway {
    pub(super) session: Arc<SessionManager>,
    pub(super) scanner: FeedScanner,
    pub(super) dedup: Deduplicator,
    pub(super) interpreter: CommandInterpreter,
    pub(super) replies: ReplyDispatcher,
    pub(super) launch: LaunchServices,
    pub(super) memory: Store,
    pub(super) audit: AuditLogger,
    pub(super) policies: StagePolicies,
    pub(super) handle: String,
    poll_interval: Duration,
    /// Held for the duration of a cycle.
    cycle_lock: Mutex<()>,
    shutdown: CancellationToken,
}

impl Gateway {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: Arc<SessionManager>,
        scanner: FeedScanner,
        replies: ReplyDispatcher,
        launch: LaunchServices,
        memory: Store,
        handle: &str,
        policies: StagePolicies,
        poll_interval: Duration,
    ) -> Self {
        let audit = AuditLogger::new(memory.pool().clone());
        Self {
            session,
            scanner,
            dedup: Deduplicator::new(memory.clone()),
            interpreter: CommandInterpreter::new(handle),
            replies,
            launch,
            memory,
            audit,
            policies,
            handle: handle.to_string(),
            poll_interval,
            cycle_lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub(super) fn stopping(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Run cycles until shutdown or a fatal error.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        info!(
            "mintwatch gateway running | handle: @{} | poll: {}s | keys: {}",
            self.handle,
            self.poll_interval.as_secs(),
            self.launch.keys.name()
        );
        install_signal_handlers(self.shutdown.clone());

        loop {
            if self.stopping() {
                break;
            }
            match self.run_cycle().await {
                Ok(report) => info!("cycle done: {report}"),
                Err(e) if e.is_fatal() => {
                    error!("halting: {e}");
                    self.shutdown.cancel();
                    return Err(anyhow::anyhow!("gateway halted: {e}"));
                }
                Err(e) => warn!("cycle failed: {e}"),
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Shutdown complete.");
        Ok(())
    }

    /// Guard against overlapping cycles; `None` when one is running.
    pub(super) fn try_begin_cycle(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        self.cycle_lock.try_lock().ok()
    }
}

/// Cancel `token` on Ctrl+C or SIGTERM.
fn install_signal_handlers(token: CancellationToken) {
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, finishing the current step before exit");
            ctrl_c.cancel();
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            sigterm.recv().await;
            info!("Received SIGTERM, finishing the current step before exit");
            token.cancel();
        }
    });
}
