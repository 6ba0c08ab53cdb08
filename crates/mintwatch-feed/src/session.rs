//! Feed session state machine.
//!
//! ```text
//! LoggedOut ──► Authenticating ──► Authenticated
//!                    │   ▲                │
//!                    │   └── invalidate ──┘
//!                    ▼
//!                 Degraded (sticky, fatal)
//! ```

use mintwatch_core::{
    error::MintError,
    retry::{with_retry, RetryPolicy},
    traits::AuthProvider,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// How many transitions are kept for `/status`-style inspection.
const HISTORY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    LoggedOut,
    Authenticating,
    Authenticated,
    Degraded,
}

/// Login strategies, tried in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthStrategy {
    StoredSession,
    Credentials,
}

impl AuthStrategy {
    fn label(&self) -> &'static str {
        match self {
            Self::StoredSession => "auth (stored session)",
            Self::Credentials => "auth (credentials)",
        }
    }
}

struct SessionState {
    phase: SessionPhase,
    history: Vec<SessionPhase>,
}

impl SessionState {
    fn set(&mut self, phase: SessionPhase) {
        if self.phase == phase {
            return;
        }
        info!("session: {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        if self.history.len() == HISTORY_LEN {
            self.history.remove(0);
        }
        self.history.push(phase);
    }
}

/// Owns the authentication state for the whole process.
pub struct SessionManager {
    auth: Arc<dyn AuthProvider>,
    policy: RetryPolicy,
    state: Mutex<SessionState>,
}

impl SessionManager {
    /// `policy` bounds the attempts spent on each strategy.
    pub fn new(auth: Arc<dyn AuthProvider>, policy: RetryPolicy) -> Self {
        Self {
            auth,
            policy,
            state: Mutex::new(SessionState {
                phase: SessionPhase::LoggedOut,
                history: vec![SessionPhase::LoggedOut],
            }),
        }
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase
    }

    /// Phases entered so far, oldest first.
    pub async fn history(&self) -> Vec<SessionPhase> {
        self.state.lock().await.history.clone()
    }

    /// Return once authenticated. Idempotent; a no-op when already
    /// authenticated. Fails with [`MintError::Fatal`] once every strategy
    /// is exhausted, and keeps failing afterwards.
    pub async fn ensure_authenticated(&self) -> Result<(), MintError> {
        let mut state = self.state.lock().await;
        match state.phase {
            SessionPhase::Authenticated => return Ok(()),
            SessionPhase::Degraded => {
                return Err(MintError::Fatal("feed session degraded".into()));
            }
            SessionPhase::LoggedOut | SessionPhase::Authenticating => {}
        }

        state.set(SessionPhase::Authenticating);

        for strategy in [AuthStrategy::StoredSession, AuthStrategy::Credentials] {
            match with_retry(strategy.label(), &self.policy, || self.attempt(strategy)).await {
                Ok(true) => {
                    if let Err(e) = self.auth.persist_session().await {
                        warn!("session: could not persist session material: {e}");
                    }
                    state.set(SessionPhase::Authenticated);
                    return Ok(());
                }
                Ok(false) => info!("session: {} not usable", strategy.label()),
                Err(e) if e.is_fatal() => {
                    state.set(SessionPhase::Degraded);
                    return Err(e);
                }
                Err(e) => warn!("session: {} failed: {e}", strategy.label()),
            }
        }

        error!("session: all authentication strategies exhausted");
        state.set(SessionPhase::Degraded);
        Err(MintError::Fatal("authentication exhausted all strategies".into()))
    }

    /// Report evidence of session loss. The next `ensure_authenticated`
    /// logs in again. Has no effect once degraded.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        if state.phase == SessionPhase::Authenticated {
            warn!("session: invalidated by downstream call");
            state.set(SessionPhase::Authenticating);
        }
    }

    async fn attempt(&self, strategy: AuthStrategy) -> Result<bool, MintError> {
        match strategy {
            AuthStrategy::StoredSession => {
                if !self.auth.restore_session().await? {
                    return Ok(false);
                }
                self.auth.verify_session().await
            }
            AuthStrategy::Credentials => {
                self.auth.submit_credentials().await?;
                if self.auth.verify_session().await? {
                    Ok(true)
                } else {
                    Err(MintError::Transient("post-login marker not found".into()))
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Scriptable auth provider.
    #[derive(Default)]
    pub(crate) struct MockAuth {
        pub has_stored: AtomicBool,
        pub stored_valid: AtomicBool,
        pub credentials_ok: AtomicBool,
        pub logged_in: AtomicBool,
        pub restores: AtomicU32,
        pub submissions: AtomicU32,
        pub persists: AtomicU32,
    }

    impl MockAuth {
        pub(crate) fn working() -> Self {
            let auth = Self::default();
            auth.credentials_ok.store(true, Ordering::SeqCst);
            auth
        }
    }

    #[async_trait]
    impl AuthProvider for MockAuth {
        async fn restore_session(&self) -> Result<bool, MintError> {
            self.restores.fetch_add(1, Ordering::SeqCst);
            let has = self.has_stored.load(Ordering::SeqCst);
            if has && self.stored_valid.load(Ordering::SeqCst) {
                self.logged_in.store(true, Ordering::SeqCst);
            }
            Ok(has)
        }

        async fn submit_credentials(&self) -> Result<(), MintError> {
            self.submissions.fetch_add(1, Ordering::SeqCst);
            if self.credentials_ok.load(Ordering::SeqCst) {
                self.logged_in.store(true, Ordering::SeqCst);
                Ok(())
            } else {
                Err(MintError::Transient("login form rejected".into()))
            }
        }

        async fn verify_session(&self) -> Result<bool, MintError> {
            Ok(self.logged_in.load(Ordering::SeqCst))
        }

        async fn persist_session(&self) -> Result<(), MintError> {
            self.persists.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_credentials_login_and_idempotent_ensure() {
        let auth = Arc::new(MockAuth::working());
        let session = SessionManager::new(auth.clone(), RetryPolicy::immediate(2));

        session.ensure_authenticated().await.unwrap();
        session.ensure_authenticated().await.unwrap();

        assert_eq!(session.phase().await, SessionPhase::Authenticated);
        assert_eq!(auth.submissions.load(Ordering::SeqCst), 1);
        assert_eq!(auth.persists.load(Ordering::SeqCst), 1);
        assert_eq!(
            session.history().await,
            vec![
                SessionPhase::LoggedOut,
                SessionPhase::Authenticating,
                SessionPhase::Authenticated
            ]
        );
    }

    #[tokio::test]
    async fn test_stored_session_preferred_over_credentials() {
        let auth = Arc::new(MockAuth::working());
        auth.has_stored.store(true, Ordering::SeqCst);
        auth.stored_valid.store(true, Ordering::SeqCst);
        let session = SessionManager::new(auth.clone(), RetryPolicy::immediate(2));

        session.ensure_authenticated().await.unwrap();
        assert_eq!(auth.restores.load(Ordering::SeqCst), 1);
        assert_eq!(auth.submissions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_stored_session_falls_back_to_credentials() {
        let auth = Arc::new(MockAuth::working());
        auth.has_stored.store(true, Ordering::SeqCst);
        let session = SessionManager::new(auth.clone(), RetryPolicy::immediate(2));

        session.ensure_authenticated().await.unwrap();
        assert_eq!(auth.submissions.load(Ordering::SeqCst), 1);
        assert_eq!(session.phase().await, SessionPhase::Authenticated);
    }

    #[tokio::test]
    async fn test_exhaustion_degrades_and_stays_degraded() {
        let auth = Arc::new(MockAuth::default());
        let session = SessionManager::new(auth.clone(), RetryPolicy::immediate(3));

        let err = session.ensure_authenticated().await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(session.phase().await, SessionPhase::Degraded);
        assert_eq!(auth.submissions.load(Ordering::SeqCst), 3);

        // Sticky: no further attempts.
        assert!(session.ensure_authenticated().await.unwrap_err().is_fatal());
        assert_eq!(auth.submissions.load(Ordering::SeqCst), 3);

        // Invalidate does not revive a degraded session.
        session.invalidate().await;
        assert_eq!(session.phase().await, SessionPhase::Degraded);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reauthentication() {
        let auth = Arc::new(MockAuth::working());
        let session = SessionManager::new(auth.clone(), RetryPolicy::immediate(2));
        session.ensure_authenticated().await.unwrap();

        auth.logged_in.store(false, Ordering::SeqCst);
        session.invalidate().await;
        assert_eq!(session.phase().await, SessionPhase::Authenticating);

        session.ensure_authenticated().await.unwrap();
        assert_eq!(auth.submissions.load(Ordering::SeqCst), 2);
        let history = session.history().await;
        assert_eq!(
            &history[history.len() - 3..],
            &[
                SessionPhase::Authenticated,
                SessionPhase::Authenticating,
                SessionPhase::Authenticated
            ]
        );
    }
}
