mod defaults;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::MintError;
use crate::retry::RetryPolicy;
use defaults::*;

/// Top-level mintwatch configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub assets: AssetConfig,
    #[serde(default)]
    pub issuance: IssuanceConfig,
    #[serde(default)]
    pub key_pool: KeyPoolConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// General bot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Handle the bot answers to, without the leading `@`.
    #[serde(default = "default_handle")]
    pub handle: String,
    /// Keyword query for the search source.
    #[serde(default = "default_search_query")]
    pub search_query: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            handle: default_handle(),
            search_query: default_search_query(),
            poll_interval_secs: default_poll_interval(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Browser driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Chrome/Chromium binary; empty means auto-detect.
    #[serde(default)]
    pub chrome_path: String,
    /// Base URL of the social feed.
    #[serde(default = "default_feed_url")]
    pub feed_url: String,
    #[serde(default = "default_true")]
    pub headless: bool,
    /// Disable only when running as root inside a container.
    #[serde(default = "default_true")]
    pub sandbox: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: String::new(),
            feed_url: default_feed_url(),
            headless: true,
            sandbox: true,
        }
    }
}

/// Feed account credentials and session persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    /// Where cookies are saved between runs.
    #[serde(default = "default_session_file")]
    pub session_file: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            session_file: default_session_file(),
        }
    }
}

/// Per-stage attempt limits and the shared backoff schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_auth_attempts")]
    pub auth_attempts: u32,
    #[serde(default = "default_scan_attempts")]
    pub scan_attempts: u32,
    #[serde(default = "default_publish_attempts")]
    pub publish_attempts: u32,
    #[serde(default = "default_issuance_attempts")]
    pub issuance_attempts: u32,
    #[serde(default = "default_reply_attempts")]
    pub reply_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            auth_attempts: default_auth_attempts(),
            scan_attempts: default_scan_attempts(),
            publish_attempts: default_publish_attempts(),
            issuance_attempts: default_issuance_attempts(),
            reply_attempts: default_reply_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Jittered policy for the given attempt budget.
    pub fn policy(&self, attempts: u32) -> RetryPolicy {
        RetryPolicy::jittered(attempts, self.base_delay_ms, self.max_delay_ms)
    }
}

/// Content-addressed asset store (Pinata-compatible API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    #[serde(default = "default_assets_api_url")]
    pub api_url: String,
    #[serde(default = "default_assets_gateway_url")]
    pub gateway_url: String,
    #[serde(default, skip_serializing)]
    pub jwt: String,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            api_url: default_assets_api_url(),
            gateway_url: default_assets_gateway_url(),
            jwt: String::new(),
            timeout_secs: default_request_timeout(),
        }
    }
}

/// Token-launch service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuanceConfig {
    #[serde(default = "default_issuance_endpoint")]
    pub endpoint: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// Draw authority keys from the pre-provisioned pool instead of
    /// generating them locally.
    #[serde(default)]
    pub use_key_pool: bool,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_issuance_endpoint(),
            api_key: String::new(),
            use_key_pool: false,
            timeout_secs: default_request_timeout(),
        }
    }
}

/// Pre-provisioned key pool (REST document store).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyPoolConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
}

/// Persistence store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Config {
    /// Apply `MINTWATCH_*` and credential environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<(), MintError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), MintError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("MINTWATCH_BOT_HANDLE") {
            self.bot.handle = v.trim().trim_start_matches('@').to_string();
        }
        if let Some(v) = get("MINTWATCH_SEARCH_QUERY") {
            self.bot.search_query = v;
        }
        if let Some(v) = get("MINTWATCH_POLL_INTERVAL_SECS") {
            self.bot.poll_interval_secs = parse_env("MINTWATCH_POLL_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("MINTWATCH_HEADLESS") {
            self.browser.headless = parse_bool("MINTWATCH_HEADLESS", &v)?;
        }
        if let Some(v) = get("MINTWATCH_CHROME_PATH") {
            self.browser.chrome_path = v;
        }
        if let Some(v) = get("MINTWATCH_USE_KEY_POOL") {
            self.issuance.use_key_pool = parse_bool("MINTWATCH_USE_KEY_POOL", &v)?;
        }
        if let Some(v) = get("MINTWATCH_AUTH_ATTEMPTS") {
            self.retry.auth_attempts = parse_env("MINTWATCH_AUTH_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("MINTWATCH_SCAN_ATTEMPTS") {
            self.retry.scan_attempts = parse_env("MINTWATCH_SCAN_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("MINTWATCH_PUBLISH_ATTEMPTS") {
            self.retry.publish_attempts = parse_env("MINTWATCH_PUBLISH_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("MINTWATCH_ISSUANCE_ATTEMPTS") {
            self.retry.issuance_attempts = parse_env("MINTWATCH_ISSUANCE_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("MINTWATCH_REPLY_ATTEMPTS") {
            self.retry.reply_attempts = parse_env("MINTWATCH_REPLY_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("FEED_USERNAME") {
            self.auth.username = v;
        }
        if let Some(v) = get("FEED_PASSWORD") {
            self.auth.password = v;
        }
        if let Some(v) = get("PINATA_JWT") {
            self.assets.jwt = v;
        }
        if let Some(v) = get("ISSUANCE_API_KEY") {
            self.issuance.api_key = v;
        }
        if let Some(v) = get("KEY_POOL_API_KEY") {
            self.key_pool.api_key = v;
        }
        Ok(())
    }

    /// Reject settings the poll loop cannot run with.
    pub fn validate(&self) -> Result<(), MintError> {
        if self.bot.handle.trim().is_empty() {
            return Err(MintError::Config("bot.handle is empty".into()));
        }
        if self.bot.poll_interval_secs == 0 {
            return Err(MintError::Config(
                "bot.poll_interval_secs must be > 0".into(),
            ));
        }
        let r = &self.retry;
        for (name, value) in [
            ("auth_attempts", r.auth_attempts),
            ("scan_attempts", r.scan_attempts),
            ("publish_attempts", r.publish_attempts),
            ("issuance_attempts", r.issuance_attempts),
            ("reply_attempts", r.reply_attempts),
        ] {
            if value == 0 {
                return Err(MintError::Config(format!("retry.{name} must be > 0")));
            }
        }
        if self.issuance.use_key_pool && self.key_pool.endpoint.is_empty() {
            return Err(MintError::Config(
                "issuance.use_key_pool is set but key_pool.endpoint is empty".into(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, MintError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| MintError::Config(format!("invalid {key}={value}: {e}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, MintError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(MintError::Config(format!(
            "invalid {key}={other}: expected true/false"
        ))),
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, MintError> {
    let path = Path::new(path);
    if !path.exists() {
        info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| MintError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| MintError::Config(format!("failed to parse config: {}", e)))?;

    Ok(config)
}
