//! Reply delivery.

use crate::session::SessionManager;
use mintwatch_core::{
    error::MintError,
    mention::Mention,
    retry::{with_retry, RetryPolicy},
    traits::ReplySurface,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Posts outcome messages under mentions. Never fails: delivery problems
/// are logged and reported as `false`.
pub struct ReplyDispatcher {
    surface: Arc<dyn ReplySurface>,
    session: Arc<SessionManager>,
    policy: RetryPolicy,
}

impl ReplyDispatcher {
    pub fn new(
        surface: Arc<dyn ReplySurface>,
        session: Arc<SessionManager>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            surface,
            session,
            policy,
        }
    }

    /// Whether the reply was confirmed as posted.
    pub async fn reply(&self, mention: &Mention, message: &str) -> bool {
        match self.deliver(mention, message).await {
            Ok(()) => {
                info!("reply: delivered to {}", mention.id);
                true
            }
            Err(e) => {
                warn!("reply: giving up on {}: {e}", mention.id);
                false
            }
        }
    }

    async fn deliver(&self, mention: &Mention, message: &str) -> Result<(), MintError> {
        self.session.ensure_authenticated().await?;
        match self.attempt(mention, message).await {
            Err(e) if e.is_session_expired() => {
                self.session.invalidate().await;
                self.session.ensure_authenticated().await?;
                self.attempt(mention, message).await
            }
            other => other,
        }
    }

    async fn attempt(&self, mention: &Mention, message: &str) -> Result<(), MintError> {
        let label = format!("reply {}", mention.id);
        with_retry(&label, &self.policy, || {
            self.surface.submit_reply(mention, message)
        })
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::scanner::tests::mention;
    use crate::session::tests::MockAuth;
    use async_trait::async_trait;
    use mintwatch_core::mention::SourceTag;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    /// Records replies; pops scripted errors first.
    #[derive(Default)]
    pub(crate) struct RecordingSurface {
        pub errors: Mutex<Vec<MintError>>,
        pub sent: Mutex<Vec<(String, String)>>,
        pub attempts: Mutex<u32>,
    }

    #[async_trait]
    impl ReplySurface for RecordingSurface {
        async fn submit_reply(&self, mention: &Mention, text: &str) -> Result<(), MintError> {
            *self.attempts.lock().unwrap() += 1;
            let mut errors = self.errors.lock().unwrap();
            if !errors.is_empty() {
                return Err(errors.remove(0));
            }
            self.sent
                .lock()
                .unwrap()
                .push((mention.id.clone(), text.to_string()));
            Ok(())
        }
    }

    fn dispatcher(surface: Arc<RecordingSurface>, auth: Arc<MockAuth>) -> ReplyDispatcher {
        let session = Arc::new(SessionManager::new(auth, RetryPolicy::immediate(2)));
        ReplyDispatcher::new(surface, session, RetryPolicy::immediate(3))
    }

    #[tokio::test]
    async fn test_reply_retries_transient_failures() {
        let surface = Arc::new(RecordingSurface::default());
        surface
            .errors
            .lock()
            .unwrap()
            .push(MintError::Transient("toast missing".into()));
        let d = dispatcher(surface.clone(), Arc::new(MockAuth::working()));

        assert!(d.reply(&mention("1", SourceTag::Search, 0), "hi").await);
        assert_eq!(*surface.attempts.lock().unwrap(), 2);
        assert_eq!(
            *surface.sent.lock().unwrap(),
            vec![("1".to_string(), "hi".to_string())]
        );
    }

    #[tokio::test]
    async fn test_exhaustion_returns_false() {
        let surface = Arc::new(RecordingSurface::default());
        surface
            .errors
            .lock()
            .unwrap()
            .extend((0..5).map(|_| MintError::Transient("toast missing".into())));
        let d = dispatcher(surface.clone(), Arc::new(MockAuth::working()));

        assert!(!d.reply(&mention("1", SourceTag::Search, 0), "hi").await);
        assert_eq!(*surface.attempts.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_session_loss_reauthenticates_and_delivers() {
        let surface = Arc::new(RecordingSurface::default());
        surface
            .errors
            .lock()
            .unwrap()
            .push(MintError::SessionExpired("logged out".into()));
        let auth = Arc::new(MockAuth::working());
        let d = dispatcher(surface.clone(), auth.clone());

        assert!(d.reply(&mention("1", SourceTag::Search, 0), "hi").await);
        assert_eq!(auth.submissions.load(Ordering::SeqCst), 2);
        assert_eq!(surface.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_degraded_session_returns_false() {
        let surface = Arc::new(RecordingSurface::default());
        let d = dispatcher(surface.clone(), Arc::new(MockAuth::default()));
        assert!(!d.reply(&mention("1", SourceTag::Search, 0), "hi").await);
        assert_eq!(*surface.attempts.lock().unwrap(), 0);
    }
}
