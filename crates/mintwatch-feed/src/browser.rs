//! Browser-driven feed adapter.
//!
//! Reads mentions from the notifications and live-search pages, posts
//! replies, and handles login and cookie persistence, all through a
//! [`UiDriver`] and the role-based [`ElementLocator`].

use crate::locator::{Cookie, ElementLocator, ElementRole, UiDriver};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mintwatch_core::{
    config::{shellexpand, AuthConfig, BrowserConfig},
    error::MintError,
    mention::{Mention, SourceTag},
    traits::{AuthProvider, FeedSource, ReplySurface},
};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Collects the visible posts on the current page.
const EXTRACT_SCRIPT: &str = r#"
const out = [];
for (const art of document.querySelectorAll('article[data-testid="tweet"]')) {
  const time = art.querySelector('time');
  const link = time ? time.closest('a') : null;
  const href = link ? link.getAttribute('href') : null;
  const m = href ? href.match(/^\/([^\/]+)\/status\/(\d+)/) : null;
  if (!m) continue;
  const text = art.querySelector('[data-testid="tweetText"]');
  out.push({
    id: m[2],
    author: m[1],
    text: text ? text.innerText : '',
    timestamp: time.getAttribute('datetime'),
    images: Array.from(art.querySelectorAll('[data-testid="tweetPhoto"] img')).map(i => i.src),
    permalink: new URL(href, location.origin).toString(),
  });
}
return out;
"#;

/// A post as the extraction script reports it.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawPost {
    pub id: String,
    pub author: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub permalink: Option<String>,
}

impl RawPost {
    /// Convert to a mention. Posts without an id or a parseable timestamp
    /// are dropped.
    pub(crate) fn into_mention(self, source: SourceTag) -> Option<Mention> {
        if self.id.is_empty() {
            return None;
        }
        let timestamp = self
            .timestamp
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())?
            .with_timezone(&Utc);
        Some(Mention {
            id: self.id,
            author: self.author.trim_start_matches('@').to_string(),
            text: self.text,
            timestamp,
            source,
            images: self
                .images
                .into_iter()
                .filter(|u| u.starts_with("http"))
                .collect(),
            permalink: self.permalink,
        })
    }
}

/// Decode the extraction result. Posts that don't parse are skipped; a
/// result that isn't a list is transient.
pub(crate) fn decode_posts(value: Value, source: SourceTag) -> Result<Vec<RawPost>, MintError> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(MintError::Transient(format!(
                "{source}: extraction returned {other} instead of a list"
            )));
        }
    };
    let mut posts = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<RawPost>(item) {
            Ok(post) => posts.push(post),
            Err(e) => warn!("{source}: skipping malformed post: {e}"),
        }
    }
    Ok(posts)
}

/// Feed adapter over a browser session.
pub struct BrowserFeed {
    driver: Arc<dyn UiDriver>,
    locator: ElementLocator,
    feed_url: String,
    username: String,
    password: String,
    session_file: PathBuf,
    wait_attempts: u32,
    wait_interval: Duration,
}

impl BrowserFeed {
    pub fn new(driver: Arc<dyn UiDriver>, browser: &BrowserConfig, auth: &AuthConfig) -> Self {
        Self {
            driver,
            locator: ElementLocator::default(),
            feed_url: browser.feed_url.trim_end_matches('/').to_string(),
            username: auth.username.clone(),
            password: auth.password.clone(),
            session_file: PathBuf::from(shellexpand(&auth.session_file)),
            wait_attempts: 10,
            wait_interval: Duration::from_millis(500),
        }
    }

    /// Replace the element locator.
    pub fn with_locator(mut self, locator: ElementLocator) -> Self {
        self.locator = locator;
        self
    }

    /// How long element lookups poll before giving up.
    pub fn with_wait(mut self, attempts: u32, interval: Duration) -> Self {
        self.wait_attempts = attempts;
        self.wait_interval = interval;
        self
    }

    /// Fail with `SessionExpired` if the page bounced to a login flow.
    async fn check_session(&self) -> Result<(), MintError> {
        let url = self.driver.current_url().await?;
        if url.contains("/login") || url.contains("/i/flow/") || url.contains("/logout") {
            return Err(MintError::SessionExpired(format!("redirected to {url}")));
        }
        Ok(())
    }

    async fn collect(&self, url: &str, source: SourceTag) -> Result<Vec<Mention>, MintError> {
        self.driver.navigate(url).await?;
        self.check_session().await?;

        let article = self
            .locator
            .wait_for(
                self.driver.as_ref(),
                ElementRole::Article,
                self.wait_attempts,
                self.wait_interval,
            )
            .await?;
        if article.is_none() {
            debug!("{source}: no posts visible");
            return Ok(Vec::new());
        }

        let value = self.driver.execute(EXTRACT_SCRIPT, Vec::new()).await?;
        let posts = decode_posts(value, source)?;
        let own = self.username.trim_start_matches('@');

        let mentions: Vec<Mention> = posts
            .into_iter()
            .filter(|p| own.is_empty() || !p.author.eq_ignore_ascii_case(own))
            .filter_map(|p| p.into_mention(source))
            .collect();
        debug!("{source}: {} posts extracted", mentions.len());
        Ok(mentions)
    }

    fn permalink(&self, mention: &Mention) -> String {
        mention.permalink.clone().unwrap_or_else(|| {
            format!("{}/{}/status/{}", self.feed_url, mention.author, mention.id)
        })
    }
}

#[async_trait]
impl FeedSource for BrowserFeed {
    async fn notifications(&self) -> Result<Vec<Mention>, MintError> {
        let url = format!("{}/notifications/mentions", self.feed_url);
        self.collect(&url, SourceTag::Notifications).await
    }

    async fn search(&self, query: &str) -> Result<Vec<Mention>, MintError> {
        let mut url = reqwest::Url::parse(&format!("{}/search", self.feed_url))
            .map_err(|e| MintError::Config(format!("invalid feed url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("src", "typed_query")
            .append_pair("f", "live");
        self.collect(url.as_str(), SourceTag::Search).await
    }
}

#[async_trait]
impl ReplySurface for BrowserFeed {
    async fn submit_reply(&self, mention: &Mention, text: &str) -> Result<(), MintError> {
        let driver = self.driver.as_ref();
        let (attempts, interval) = (self.wait_attempts, self.wait_interval);

        driver.navigate(&self.permalink(mention)).await?;
        self.check_session().await?;

        if let Some(button) = self
            .locator
            .acquire(driver, ElementRole::ReplyButton)
            .await?
        {
            driver.click(&button).await?;
        }
        let textbox = self
            .locator
            .require(driver, ElementRole::ReplyTextbox, attempts, interval)
            .await?;
        driver.click(&textbox).await?;
        driver.type_text(&textbox, text).await?;

        let submit = self
            .locator
            .require(driver, ElementRole::ReplySubmit, attempts, interval)
            .await?;
        driver.click(&submit).await?;

        let posted = self
            .locator
            .wait_for(driver, ElementRole::ReplyPosted, attempts, interval)
            .await?;
        if posted.is_none() {
            return Err(MintError::Transient(format!(
                "reply to {} not confirmed",
                mention.id
            )));
        }
        info!("reply posted to {}", mention.id);
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for BrowserFeed {
    async fn restore_session(&self) -> Result<bool, MintError> {
        let raw = match tokio::fs::read_to_string(&self.session_file).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let cookies: Vec<Cookie> = match serde_json::from_str(&raw) {
            Ok(c) => c,
            Err(e) => {
                warn!("session file {} unreadable: {e}", self.session_file.display());
                return Ok(false);
            }
        };
        if cookies.is_empty() {
            return Ok(false);
        }

        // Cookies can only be set for the domain currently loaded.
        self.driver.navigate(&self.feed_url).await?;
        let mut applied = 0;
        for cookie in &cookies {
            if self.driver.add_cookie(cookie).await.is_ok() {
                applied += 1;
            }
        }
        info!("restored {applied}/{} session cookies", cookies.len());
        self.driver
            .navigate(&format!("{}/home", self.feed_url))
            .await?;
        Ok(applied > 0)
    }

    async fn submit_credentials(&self) -> Result<(), MintError> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(MintError::Fatal(
                "no feed credentials configured (FEED_USERNAME / FEED_PASSWORD)".into(),
            ));
        }
        let driver = self.driver.as_ref();
        let (attempts, interval) = (self.wait_attempts, self.wait_interval);

        driver
            .navigate(&format!("{}/i/flow/login", self.feed_url))
            .await?;
        let user = self
            .locator
            .require(driver, ElementRole::LoginUsername, attempts, interval)
            .await?;
        driver.type_text(&user, &self.username).await?;
        let next = self
            .locator
            .require(driver, ElementRole::LoginNext, attempts, interval)
            .await?;
        driver.click(&next).await?;

        let password = self
            .locator
            .require(driver, ElementRole::LoginPassword, attempts, interval)
            .await?;
        driver.type_text(&password, &self.password).await?;
        let submit = self
            .locator
            .require(driver, ElementRole::LoginSubmit, attempts, interval)
            .await?;
        driver.click(&submit).await?;
        info!("submitted credentials for @{}", self.username);
        Ok(())
    }

    async fn verify_session(&self) -> Result<bool, MintError> {
        let marker = self
            .locator
            .wait_for(
                self.driver.as_ref(),
                ElementRole::LoggedInMarker,
                self.wait_attempts,
                self.wait_interval,
            )
            .await?;
        Ok(marker.is_some())
    }

    async fn persist_session(&self) -> Result<(), MintError> {
        let cookies = self.driver.cookies().await?;
        if let Some(parent) = self.session_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&cookies)?;
        tokio::fs::write(&self.session_file, json).await?;
        debug!(
            "saved {} cookies to {}",
            cookies.len(),
            self.session_file.display()
        );
        Ok(())
    }
}
