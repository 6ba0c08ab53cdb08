//! Element acquisition by role.
//!
//! The feed UI changes markup often, so each role maps to an ordered list
//! of probes. [`ElementLocator::acquire`] tries them in priority order and
//! returns the first element found.

use async_trait::async_trait;
use mintwatch_core::error::MintError;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Opaque reference to an element inside the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(pub String);

/// A browser cookie, as saved between runs.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, rename = "httpOnly", skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
}

/// Minimal browser capability the feed adapter needs.
#[async_trait]
pub trait UiDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), MintError>;

    async fn current_url(&self) -> Result<String, MintError>;

    /// `Ok(None)` when nothing matches.
    async fn find(&self, probe: &Probe) -> Result<Option<ElementHandle>, MintError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), MintError>;

    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<(), MintError>;

    /// Run a synchronous script and return its JSON result.
    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, MintError>;

    async fn cookies(&self) -> Result<Vec<Cookie>, MintError>;

    async fn add_cookie(&self, cookie: &Cookie) -> Result<(), MintError>;
}

/// One way of finding an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// `data-testid` attribute.
    TestId(String),
    /// `aria-label` attribute.
    AriaLabel(String),
    Css(String),
    /// Element whose normalized text equals the given string.
    Text(String),
}

/// Query a probe resolves to in the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Css(String),
    XPath(String),
}

impl Probe {
    pub fn selector(&self) -> Selector {
        match self {
            Self::TestId(id) => Selector::Css(format!("[data-testid=\"{id}\"]")),
            Self::AriaLabel(label) => Selector::Css(format!("[aria-label=\"{label}\"]")),
            Self::Css(css) => Selector::Css(css.clone()),
            Self::Text(text) => Selector::XPath(format!(
                "//*[normalize-space(text())={}]",
                xpath_literal(text)
            )),
        }
    }
}

/// Quote a string for XPath 1.0, which has no escape sequences.
fn xpath_literal(s: &str) -> String {
    if !s.contains('"') {
        format!("\"{s}\"")
    } else if !s.contains('\'') {
        format!("'{s}'")
    } else {
        let parts: Vec<String> = s.split('"').map(|p| format!("\"{p}\"")).collect();
        format!("concat({})", parts.join(", '\"', "))
    }
}

/// UI elements the adapter interacts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementRole {
    LoginUsername,
    LoginNext,
    LoginPassword,
    LoginSubmit,
    /// Only present when logged in.
    LoggedInMarker,
    ReplyButton,
    ReplyTextbox,
    ReplySubmit,
    /// Toast shown after a reply is posted.
    ReplyPosted,
    Article,
}

/// Role → ordered probes.
#[derive(Debug, Clone)]
pub struct ElementLocator {
    strategies: HashMap<ElementRole, Vec<Probe>>,
}

impl Default for ElementLocator {
    fn default() -> Self {
        use ElementRole::*;
        use Probe::*;
        let s = |v: &str| v.to_string();
        let strategies = HashMap::from([
            (
                LoginUsername,
                vec![
                    Css(s("input[autocomplete=\"username\"]")),
                    Css(s("input[name=\"text\"]")),
                ],
            ),
            (
                LoginNext,
                vec![Text(s("Next")), Css(s("button[role=\"button\"]:not([disabled])"))],
            ),
            (
                LoginPassword,
                vec![
                    Css(s("input[name=\"password\"]")),
                    Css(s("input[type=\"password\"]")),
                ],
            ),
            (
                LoginSubmit,
                vec![TestId(s("LoginForm_Login_Button")), Text(s("Log in"))],
            ),
            (
                LoggedInMarker,
                vec![
                    TestId(s("SideNav_AccountSwitcher_Button")),
                    TestId(s("AppTabBar_Home_Link")),
                    AriaLabel(s("Account menu")),
                ],
            ),
            (
                ReplyButton,
                vec![TestId(s("reply")), AriaLabel(s("Reply"))],
            ),
            (
                ReplyTextbox,
                vec![
                    TestId(s("tweetTextarea_0")),
                    Css(s("div[role=\"textbox\"][contenteditable=\"true\"]")),
                ],
            ),
            (
                ReplySubmit,
                vec![TestId(s("tweetButton")), TestId(s("tweetButtonInline")), Text(s("Reply"))],
            ),
            (
                ReplyPosted,
                vec![TestId(s("toast")), Css(s("[role=\"alert\"]"))],
            ),
            (
                Article,
                vec![TestId(s("tweet")), Css(s("article"))],
            ),
        ]);
        Self { strategies }
    }
}

impl ElementLocator {
    /// Replace the probes for one role.
    pub fn with_probes(mut self, role: ElementRole, probes: Vec<Probe>) -> Self {
        self.strategies.insert(role, probes);
        self
    }

    pub fn probes(&self, role: ElementRole) -> &[Probe] {
        self.strategies.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First element matched by any probe for `role`, in priority order.
    pub async fn acquire(
        &self,
        driver: &dyn UiDriver,
        role: ElementRole,
    ) -> Result<Option<ElementHandle>, MintError> {
        for probe in self.probes(role) {
            if let Some(handle) = driver.find(probe).await? {
                debug!("locator: {role:?} matched {probe:?}");
                return Ok(Some(handle));
            }
        }
        Ok(None)
    }

    /// Poll [`acquire`](Self::acquire) until the element shows up or
    /// `attempts` polls have been made.
    pub async fn wait_for(
        &self,
        driver: &dyn UiDriver,
        role: ElementRole,
        attempts: u32,
        interval: Duration,
    ) -> Result<Option<ElementHandle>, MintError> {
        for attempt in 0..attempts.max(1) {
            if attempt > 0 {
                tokio::time::sleep(interval).await;
            }
            if let Some(handle) = self.acquire(driver, role).await? {
                return Ok(Some(handle));
            }
        }
        Ok(None)
    }

    /// Like [`wait_for`](Self::wait_for) but a missing element is a
    /// transient error.
    pub async fn require(
        &self,
        driver: &dyn UiDriver,
        role: ElementRole,
        attempts: u32,
        interval: Duration,
    ) -> Result<ElementHandle, MintError> {
        self.wait_for(driver, role, attempts, interval)
            .await?
            .ok_or_else(|| MintError::Transient(format!("element {role:?} not found")))
    }
}
