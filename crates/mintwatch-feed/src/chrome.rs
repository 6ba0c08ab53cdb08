//! Chrome driver over the DevTools protocol.
//!
//! Implements [`UiDriver`] with `headless_chrome`. Its API is blocking, so
//! every call runs on the blocking pool. A failed call is transient unless
//! the browser itself stopped answering, which is fatal: nothing downstream
//! can recover it without restarting the process.

use crate::locator::{Cookie, ElementHandle, Probe, Selector, UiDriver};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Network::{self, CookieParam};
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use mintwatch_core::{
    config::{shellexpand, BrowserConfig},
    error::MintError,
};
use serde_json::{json, Value};
use std::ffi::OsStr;
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Chrome exits after this long without a DevTools command; the poll
/// interval must stay well below it.
const IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// One browser process with a single tab.
pub struct ChromeDriver {
    browser: Arc<Browser>,
    tab: Arc<Tab>,
}

impl ChromeDriver {
    /// Launch Chrome and open the working tab.
    pub async fn launch(cfg: &BrowserConfig) -> Result<Self, MintError> {
        let headless = cfg.headless;
        let sandbox = cfg.sandbox;
        let path = (!cfg.chrome_path.is_empty())
            .then(|| PathBuf::from(shellexpand(&cfg.chrome_path)));

        let (browser, tab) = tokio::task::spawn_blocking(move || {
            let options = LaunchOptions::default_builder()
                .headless(headless)
                .sandbox(sandbox)
                .path(path)
                .window_size(Some((1280, 1600)))
                .idle_browser_timeout(IDLE_TIMEOUT)
                .args(vec![
                    OsStr::new("--disable-blink-features=AutomationControlled"),
                    OsStr::new("--lang=en-US"),
                ])
                .build()
                .map_err(|e| MintError::Config(format!("chrome launch options: {e}")))?;
            let browser = Browser::new(options)
                .map_err(|e| MintError::Fatal(format!("chrome launch failed: {e}")))?;
            let tab = browser
                .new_tab()
                .map_err(|e| MintError::Fatal(format!("chrome tab failed: {e}")))?;
            Ok::<_, MintError>((browser, tab))
        })
        .await
        .map_err(|e| MintError::Fatal(format!("chrome launch task failed: {e}")))??;

        info!("Chrome started (headless: {headless})");
        Ok(Self {
            browser: Arc::new(browser),
            tab,
        })
    }

    /// Close the working tab. The browser process exits when dropped.
    pub async fn close(&self) -> Result<(), MintError> {
        self.run("close", |tab| tab.close(true).map(|_| ())).await?;
        info!("Chrome tab closed");
        Ok(())
    }

    /// Run a blocking tab operation on the blocking pool.
    async fn run<T, E, F>(&self, what: &'static str, op: F) -> Result<T, MintError>
    where
        T: Send + 'static,
        E: Display + Send + 'static,
        F: FnOnce(&Tab) -> Result<T, E> + Send + 'static,
    {
        let tab = self.tab.clone();
        let result = tokio::task::spawn_blocking(move || op(&tab))
            .await
            .map_err(|e| MintError::Transient(format!("chrome {what}: task failed: {e}")))?;
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                let message = e.to_string();
                Err(self.classify(what, message).await)
            }
        }
    }

    /// Fatal only when the browser no longer answers a version query.
    async fn classify(&self, what: &str, message: String) -> MintError {
        let browser = self.browser.clone();
        let alive = tokio::task::spawn_blocking(move || browser.get_version().is_ok())
            .await
            .unwrap_or(false);
        if alive {
            MintError::Transient(format!("chrome {what}: {message}"))
        } else {
            MintError::Fatal(format!("browser connection lost during {what}: {message}"))
        }
    }
}

/// JS expression evaluating to the first node matched, or `null`.
pub(crate) fn lookup_expression(selector: &Selector) -> String {
    match selector {
        Selector::Css(css) => format!("document.querySelector({})", Value::from(css.as_str())),
        Selector::XPath(xpath) => format!(
            "document.evaluate({}, document, null, \
             XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
            Value::from(xpath.as_str())
        ),
    }
}

/// Wrap a function body so its return value comes back as a JSON string.
pub(crate) fn wrap_script(script: &str, args: Vec<Value>) -> String {
    format!(
        "JSON.stringify((function() {{ {script} }}).apply(null, {}))",
        Value::Array(args)
    )
}

/// Handles carry the selector; elements are re-resolved on every action.
pub(crate) fn handle_for(selector: &Selector) -> ElementHandle {
    match selector {
        Selector::Css(css) => ElementHandle(format!("css:{css}")),
        Selector::XPath(xpath) => ElementHandle(format!("xpath:{xpath}")),
    }
}

pub(crate) fn selector_of(handle: &ElementHandle) -> Result<Selector, MintError> {
    match handle.0.split_once(':') {
        Some(("css", css)) => Ok(Selector::Css(css.to_string())),
        Some(("xpath", xpath)) => Ok(Selector::XPath(xpath.to_string())),
        _ => Err(MintError::Permanent(format!(
            "unknown element handle {}",
            handle.0
        ))),
    }
}

pub(crate) fn cookie_param(cookie: &Cookie) -> Result<CookieParam, MintError> {
    Ok(serde_json::from_value(json!({
        "name": cookie.name,
        "value": cookie.value,
        "domain": cookie.domain,
        "path": cookie.path,
        "secure": cookie.secure,
        "httpOnly": cookie.http_only,
        "expires": cookie.expiry,
    }))?)
}

fn saved_cookie(cookie: Network::Cookie) -> Cookie {
    Cookie {
        name: cookie.name,
        value: cookie.value,
        domain: Some(cookie.domain),
        path: Some(cookie.path),
        secure: Some(cookie.secure),
        http_only: Some(cookie.http_only),
        // Session cookies report -1.
        expiry: (cookie.expires > 0.0).then_some(cookie.expires as u64),
    }
}

fn locate<'a>(tab: &'a Tab, selector: &Selector) -> anyhow::Result<Element<'a>> {
    match selector {
        Selector::Css(css) => tab.find_element(css),
        Selector::XPath(xpath) => tab.find_element_by_xpath(xpath),
    }
}

#[async_trait]
impl UiDriver for ChromeDriver {
    async fn navigate(&self, url: &str) -> Result<(), MintError> {
        debug!("chrome: navigate {url}");
        let url = url.to_string();
        self.run("navigate", move |tab| {
            tab.navigate_to(&url)
                .and_then(|tab| tab.wait_until_navigated())
                .map(|_| ())
        })
        .await
    }

    async fn current_url(&self) -> Result<String, MintError> {
        Ok(self.tab.get_url())
    }

    async fn find(&self, probe: &Probe) -> Result<Option<ElementHandle>, MintError> {
        let selector = probe.selector();
        let expression = format!("{} !== null", lookup_expression(&selector));
        let found = self
            .run("find", move |tab| tab.evaluate(&expression, false))
            .await?;
        Ok((found.value == Some(Value::Bool(true))).then(|| handle_for(&selector)))
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), MintError> {
        let selector = selector_of(element)?;
        self.run("click", move |tab| {
            locate(tab, &selector).and_then(|el| el.click().map(|_| ()))
        })
        .await
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<(), MintError> {
        let selector = selector_of(element)?;
        let text = text.to_string();
        self.run("type", move |tab| {
            locate(tab, &selector).and_then(|el| el.type_into(&text).map(|_| ()))
        })
        .await
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, MintError> {
        let expression = wrap_script(script, args);
        let result = self
            .run("script", move |tab| tab.evaluate(&expression, false))
            .await?;
        match result.value {
            Some(Value::String(json)) => Ok(serde_json::from_str(&json)?),
            _ => Ok(Value::Null),
        }
    }

    async fn cookies(&self) -> Result<Vec<Cookie>, MintError> {
        let cookies = self.run("cookies", |tab| tab.get_cookies()).await?;
        Ok(cookies.into_iter().map(saved_cookie).collect())
    }

    async fn add_cookie(&self, cookie: &Cookie) -> Result<(), MintError> {
        let param = cookie_param(cookie)?;
        if let Err(e) = self
            .run("set cookie", move |tab| tab.set_cookies(vec![param]))
            .await
        {
            warn!("chrome: cookie {} rejected: {e}", cookie.name);
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_carries_selector() {
        for selector in [
            Selector::Css("[data-testid=\"tweet\"]".into()),
            Selector::XPath("//*[normalize-space(text())=\"Log in\"]".into()),
            Selector::Css("a:not([disabled])".into()),
        ] {
            let handle = handle_for(&selector);
            assert_eq!(selector_of(&handle).unwrap(), selector);
        }
        assert!(selector_of(&ElementHandle("bogus".into())).is_err());
    }

    #[test]
    fn test_lookup_expression_quotes_selector() {
        let css = lookup_expression(&Probe::TestId("reply".into()).selector());
        assert_eq!(css, r#"document.querySelector("[data-testid=\"reply\"]")"#);

        let xpath = lookup_expression(&Probe::Text("Next".into()).selector());
        assert!(xpath.starts_with(r#"document.evaluate("//*[normalize-space(text())=\"Next\"]""#));
        assert!(xpath.ends_with(".singleNodeValue"));
    }

    #[test]
    fn test_wrap_script_passes_args() {
        let wrapped = wrap_script("return arguments[0] + 1;", vec![json!(41)]);
        assert_eq!(
            wrapped,
            "JSON.stringify((function() { return arguments[0] + 1; }).apply(null, [41]))"
        );
    }

    #[test]
    fn test_cookie_param_keeps_domain_and_flags() {
        let cookie = Cookie {
            name: "auth_token".into(),
            value: "abc".into(),
            domain: Some(".feed.test".into()),
            path: Some("/".into()),
            secure: Some(true),
            http_only: Some(true),
            expiry: Some(1_900_000_000),
        };
        let param = cookie_param(&cookie).unwrap();
        assert_eq!(param.name, "auth_token");
        assert_eq!(param.value, "abc");
        assert_eq!(param.domain.as_deref(), Some(".feed.test"));
        assert_eq!(param.http_only, Some(true));
    }
}
