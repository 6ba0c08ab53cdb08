//! Serde default functions for config fields.

pub(super) fn default_true() -> bool {
    true
}
pub(super) fn default_handle() -> String {
    "LaunchBonkOnX".to_string()
}
pub(super) fn default_search_query() -> String {
    "@LaunchBonkOnX".to_string()
}
pub(super) fn default_poll_interval() -> u64 {
    60
}
pub(super) fn default_data_dir() -> String {
    "~/.mintwatch".to_string()
}
pub(super) fn default_log_level() -> String {
    "info".to_string()
}
pub(super) fn default_feed_url() -> String {
    "https://x.com".to_string()
}
pub(super) fn default_session_file() -> String {
    "~/.mintwatch/data/session.json".to_string()
}
pub(super) fn default_auth_attempts() -> u32 {
    3
}
pub(super) fn default_scan_attempts() -> u32 {
    3
}
pub(super) fn default_publish_attempts() -> u32 {
    4
}
pub(super) fn default_issuance_attempts() -> u32 {
    2
}
pub(super) fn default_reply_attempts() -> u32 {
    3
}
pub(super) fn default_base_delay_ms() -> u64 {
    2_000
}
pub(super) fn default_max_delay_ms() -> u64 {
    30_000
}
pub(super) fn default_assets_api_url() -> String {
    "https://api.pinata.cloud".to_string()
}
pub(super) fn default_assets_gateway_url() -> String {
    "https://gateway.pinata.cloud/ipfs".to_string()
}
pub(super) fn default_issuance_endpoint() -> String {
    "http://127.0.0.1:8787/v1/tokens".to_string()
}
pub(super) fn default_request_timeout() -> u64 {
    60
}
pub(super) fn default_db_path() -> String {
    "~/.mintwatch/data/mintwatch.db".to_string()
}
