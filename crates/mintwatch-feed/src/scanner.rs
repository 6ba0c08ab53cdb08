//! Pulls mentions from both feed views.

use crate::session::SessionManager;
use mintwatch_core::{
    error::MintError,
    mention::{Mention, SourceTag},
    retry::{with_retry, RetryPolicy},
    traits::FeedSource,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Scans notifications and live search, keeping the session alive.
pub struct FeedScanner {
    source: Arc<dyn FeedSource>,
    session: Arc<SessionManager>,
    policy: RetryPolicy,
    search_query: String,
}

impl FeedScanner {
    pub fn new(
        source: Arc<dyn FeedSource>,
        session: Arc<SessionManager>,
        policy: RetryPolicy,
        search_query: impl Into<String>,
    ) -> Self {
        Self {
            source,
            session,
            policy,
            search_query: search_query.into(),
        }
    }

    pub async fn scan_notifications(&self) -> Result<Vec<Mention>, MintError> {
        self.scan_source(SourceTag::Notifications).await
    }

    pub async fn scan_search(&self) -> Result<Vec<Mention>, MintError> {
        self.scan_source(SourceTag::Search).await
    }

    /// Both views, concatenated. A failing view is logged and skipped so
    /// the other still contributes; only fatal errors abort the scan.
    pub async fn scan(&self) -> Result<Vec<Mention>, MintError> {
        let mut all = Vec::new();
        for tag in [SourceTag::Notifications, SourceTag::Search] {
            match self.scan_source(tag).await {
                Ok(mut found) => {
                    info!("scan: {} mentions from {tag}", found.len());
                    all.append(&mut found);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("scan: {tag} failed: {e}"),
            }
        }
        Ok(all)
    }

    /// One view with retries. A session loss triggers a single
    /// re-authentication and one more pass.
    async fn scan_source(&self, tag: SourceTag) -> Result<Vec<Mention>, MintError> {
        self.session.ensure_authenticated().await?;
        match self.fetch(tag).await {
            Err(e) if e.is_session_expired() => {
                warn!("scan: session lost while reading {tag}: {e}");
                self.session.invalidate().await;
                self.session.ensure_authenticated().await?;
                self.fetch(tag).await
            }
            other => other,
        }
    }

    async fn fetch(&self, tag: SourceTag) -> Result<Vec<Mention>, MintError> {
        let label = format!("scan {tag}");
        with_retry(&label, &self.policy, || self.read(tag)).await
    }

    async fn read(&self, tag: SourceTag) -> Result<Vec<Mention>, MintError> {
        match tag {
            SourceTag::Notifications => self.source.notifications().await,
            SourceTag::Search => self.source.search(&self.search_query).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::session::tests::MockAuth;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    pub(crate) fn mention(id: &str, source: SourceTag, images: usize) -> Mention {
        Mention {
            id: id.into(),
            author: "alice".into(),
            text: format!("@LaunchBonkOnX $T{id} + Token {id}"),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
                + chrono::Duration::seconds(id.parse::<i64>().unwrap_or(0)),
            source,
            images: (0..images)
                .map(|i| format!("https://img.test/{id}/{i}.png"))
                .collect(),
            permalink: None,
        }
    }

    /// Feed with scripted failures per view.
    #[derive(Default)]
    pub(crate) struct ScriptedFeed {
        pub notifications: Mutex<Vec<Mention>>,
        pub search: Mutex<Vec<Mention>>,
        /// Errors returned before the lists, consumed in order.
        pub notification_errors: Mutex<Vec<MintError>>,
        pub search_errors: Mutex<Vec<MintError>>,
        pub calls: AtomicU32,
        pub queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FeedSource for ScriptedFeed {
        async fn notifications(&self) -> Result<Vec<Mention>, MintError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut errors = self.notification_errors.lock().unwrap();
            if !errors.is_empty() {
                return Err(errors.remove(0));
            }
            Ok(self.notifications.lock().unwrap().clone())
        }

        async fn search(&self, query: &str) -> Result<Vec<Mention>, MintError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.to_string());
            let mut errors = self.search_errors.lock().unwrap();
            if !errors.is_empty() {
                return Err(errors.remove(0));
            }
            Ok(self.search.lock().unwrap().clone())
        }
    }

    fn scanner(feed: Arc<ScriptedFeed>, auth: Arc<MockAuth>) -> FeedScanner {
        let session = Arc::new(SessionManager::new(auth, RetryPolicy::immediate(2)));
        FeedScanner::new(feed, session, RetryPolicy::immediate(3), "@LaunchBonkOnX")
    }

    #[tokio::test]
    async fn test_scan_concatenates_both_views() {
        let feed = Arc::new(ScriptedFeed::default());
        feed.notifications
            .lock()
            .unwrap()
            .push(mention("1", SourceTag::Notifications, 1));
        feed.search
            .lock()
            .unwrap()
            .push(mention("2", SourceTag::Search, 0));
        let s = scanner(feed.clone(), Arc::new(MockAuth::working()));

        let found = s.scan().await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(*feed.queries.lock().unwrap(), vec!["@LaunchBonkOnX".to_string()]);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let feed = Arc::new(ScriptedFeed::default());
        feed.notification_errors
            .lock()
            .unwrap()
            .extend([
                MintError::Transient("slow".into()),
                MintError::Transient("slow".into()),
            ]);
        feed.notifications
            .lock()
            .unwrap()
            .push(mention("1", SourceTag::Notifications, 1));
        let s = scanner(feed.clone(), Arc::new(MockAuth::working()));

        assert_eq!(s.scan_notifications().await.unwrap().len(), 1);
        assert_eq!(feed.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failing_view_does_not_hide_the_other() {
        let feed = Arc::new(ScriptedFeed::default());
        feed.notification_errors
            .lock()
            .unwrap()
            .push(MintError::Permanent("layout changed".into()));
        feed.search
            .lock()
            .unwrap()
            .push(mention("2", SourceTag::Search, 1));
        let s = scanner(feed, Arc::new(MockAuth::working()));

        let found = s.scan().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "2");
    }

    #[tokio::test]
    async fn test_session_expiry_reauthenticates_once() {
        let feed = Arc::new(ScriptedFeed::default());
        feed.notification_errors
            .lock()
            .unwrap()
            .push(MintError::SessionExpired("redirected".into()));
        feed.notifications
            .lock()
            .unwrap()
            .push(mention("1", SourceTag::Notifications, 1));
        let auth = Arc::new(MockAuth::working());
        let s = scanner(feed, auth.clone());

        assert_eq!(s.scan_notifications().await.unwrap().len(), 1);
        assert_eq!(auth.submissions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_degraded_session_aborts_scan() {
        let feed = Arc::new(ScriptedFeed::default());
        let s = scanner(feed.clone(), Arc::new(MockAuth::default()));
        assert!(s.scan().await.unwrap_err().is_fatal());
        assert_eq!(feed.calls.load(Ordering::SeqCst), 0);
    }
}
