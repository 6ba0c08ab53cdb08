use super::*;
use std::collections::HashMap;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_defaults_are_valid() {
    let cfg = Config::default();
    assert_eq!(cfg.bot.handle, "LaunchBonkOnX");
    assert_eq!(cfg.bot.poll_interval_secs, 60);
    assert!(cfg.browser.headless);
    assert!(cfg.browser.sandbox);
    assert!(cfg.browser.chrome_path.is_empty());
    assert!(!cfg.issuance.use_key_pool);
    assert_eq!(cfg.retry.issuance_attempts, 2);
    cfg.validate().unwrap();
}

#[test]
fn test_partial_toml_fills_defaults() {
    let toml_str = r#"
        [bot]
        handle = "MyBot"
        poll_interval_secs = 15

        [retry]
        publish_attempts = 7
    "#;
    let cfg: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(cfg.bot.handle, "MyBot");
    assert_eq!(cfg.bot.poll_interval_secs, 15);
    assert_eq!(cfg.bot.search_query, "@LaunchBonkOnX");
    assert_eq!(cfg.retry.publish_attempts, 7);
    assert_eq!(cfg.retry.scan_attempts, 3);
    assert_eq!(cfg.memory.db_path, "~/.mintwatch/data/mintwatch.db");
}

#[test]
fn test_env_overrides_apply() {
    let mut cfg = Config::default();
    cfg.apply_overrides_from(lookup(&[
        ("MINTWATCH_BOT_HANDLE", "@OtherBot"),
        ("MINTWATCH_POLL_INTERVAL_SECS", "5"),
        ("MINTWATCH_HEADLESS", "false"),
        ("MINTWATCH_CHROME_PATH", "/usr/bin/chromium"),
        ("MINTWATCH_USE_KEY_POOL", "yes"),
        ("MINTWATCH_ISSUANCE_ATTEMPTS", "1"),
        ("FEED_PASSWORD", "hunter2"),
    ]))
    .unwrap();
    assert_eq!(cfg.bot.handle, "OtherBot");
    assert_eq!(cfg.bot.poll_interval_secs, 5);
    assert!(!cfg.browser.headless);
    assert_eq!(cfg.browser.chrome_path, "/usr/bin/chromium");
    assert!(cfg.issuance.use_key_pool);
    assert_eq!(cfg.retry.issuance_attempts, 1);
    assert_eq!(cfg.auth.password, "hunter2");
}

#[test]
fn test_blank_env_values_are_ignored() {
    let mut cfg = Config::default();
    cfg.apply_overrides_from(lookup(&[("MINTWATCH_BOT_HANDLE", "  ")]))
        .unwrap();
    assert_eq!(cfg.bot.handle, "LaunchBonkOnX");
}

#[test]
fn test_bad_env_value_is_config_error() {
    let mut cfg = Config::default();
    let err = cfg
        .apply_overrides_from(lookup(&[("MINTWATCH_HEADLESS", "maybe")]))
        .unwrap_err();
    assert!(matches!(err, MintError::Config(_)));

    let err = cfg
        .apply_overrides_from(lookup(&[("MINTWATCH_SCAN_ATTEMPTS", "-1")]))
        .unwrap_err();
    assert!(matches!(err, MintError::Config(_)));
}

#[test]
fn test_validate_rejects_zero_limits() {
    let mut cfg = Config::default();
    cfg.retry.reply_attempts = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.bot.poll_interval_secs = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn test_validate_key_pool_needs_endpoint() {
    let mut cfg = Config::default();
    cfg.issuance.use_key_pool = true;
    assert!(cfg.validate().is_err());
    cfg.key_pool.endpoint = "https://pool.example/keys".into();
    cfg.validate().unwrap();
}

#[test]
fn test_secrets_are_not_serialized() {
    let mut cfg = Config::default();
    cfg.auth.password = "secret-pw".into();
    cfg.assets.jwt = "secret-jwt".into();
    let out = toml::to_string(&cfg).unwrap();
    assert!(!out.contains("secret-pw"));
    assert!(!out.contains("secret-jwt"));
}

#[test]
fn test_load_missing_file_uses_defaults() {
    let cfg = load("/nonexistent/__mintwatch_config__.toml").unwrap();
    assert_eq!(cfg.bot.handle, "LaunchBonkOnX");
}

#[test]
fn test_shellexpand_home() {
    if let Some(home) = std::env::var_os("HOME") {
        let expanded = shellexpand("~/x/y.db");
        assert_eq!(expanded, format!("{}/x/y.db", home.to_string_lossy()));
    }
    assert_eq!(shellexpand("/abs/path"), "/abs/path");
}
