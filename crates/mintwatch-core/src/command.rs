//! Launch command grammar.
//!
//! `@<handle> $<TICKER> [sep] <display name>`. The handle and the `$`
//! marker match case-insensitively; the name keeps its case. Anything that
//! does not fit is a non-match, never an error.

use crate::launch::LaunchRequest;
use regex::Regex;

/// Longest ticker the issuance service accepts.
pub const MAX_SYMBOL_LEN: usize = 7;

/// Longest display name kept, in characters.
pub const MAX_NAME_LEN: usize = 32;

/// Compiled grammar for one bot handle.
#[derive(Debug, Clone)]
pub struct CommandInterpreter {
    pattern: Regex,
    trailing_link: Regex,
}

impl CommandInterpreter {
    /// Compile the grammar for `bot_handle` (with or without a leading `@`).
    pub fn new(bot_handle: &str) -> Self {
        let handle = regex::escape(bot_handle.trim_start_matches('@'));
        // Other @mentions may sit between ours and the ticker (reply chains).
        let pattern = format!(
            r"(?i)(?:^|[^\w@])@{handle}\b(?:\s+@\w+)*\s+\$([A-Za-z0-9]+)[ \t]*(?:[+\-|:\u{{2013}}\u{{2014}}][ \t]*)?([^\r\n]*)"
        );
        Self {
            pattern: Regex::new(&pattern).expect("escaped handle always yields a valid pattern"),
            trailing_link: Regex::new(r"\s*https?://\S+\s*$").expect("static pattern"),
        }
    }

    /// Parse a mention's text into a launch request.
    pub fn interpret(&self, text: &str, mention_id: &str) -> Option<LaunchRequest> {
        let caps = self.pattern.captures(text)?;
        let ticker = caps.get(1)?.as_str();
        let raw_name = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

        let mut name = raw_name.to_string();
        // Media links are appended by the feed, not written by the user.
        while let Some(m) = self.trailing_link.find(&name) {
            name.truncate(m.start());
        }
        let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
        let name: String = name.chars().take(MAX_NAME_LEN).collect();
        let name = name.trim_end().to_string();
        if name.is_empty() {
            return None;
        }

        let symbol: String = ticker
            .chars()
            .take(MAX_SYMBOL_LEN)
            .collect::<String>()
            .to_ascii_uppercase();

        Some(LaunchRequest {
            symbol,
            name,
            mention_id: mention_id.to_string(),
        })
    }
}

/// One-shot helper that compiles the grammar for a single call.
pub fn interpret(text: &str, bot_handle: &str, mention_id: &str) -> Option<LaunchRequest> {
    CommandInterpreter::new(bot_handle).interpret(text, mention_id)
}
