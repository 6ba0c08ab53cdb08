use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which view of the feed produced a mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Notifications,
    Search,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notifications => "notifications",
            Self::Search => "search",
        }
    }
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A post that mentions the bot, as captured by the feed scanner.
///
/// Never mutated after capture; the deduplicator and the interpreter only
/// read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    /// Feed-assigned post id.
    pub id: String,
    /// Author handle without the leading `@`.
    pub author: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub source: SourceTag,
    /// Image URLs attached to the post, in display order.
    #[serde(default)]
    pub images: Vec<String>,
    /// Canonical URL of the post, when the feed exposes one.
    #[serde(default)]
    pub permalink: Option<String>,
}

impl Mention {
    /// The first attached image, which is the one a launch uses.
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}
