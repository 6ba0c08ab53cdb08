use crate::{error::MintError, mention::Mention};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Authentication provider: how the feed session is (re)established.
///
/// The session manager calls these in order: stored material first, then
/// interactive credentials, verifying the post-login marker after each.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Load persisted session material into the driver.
    /// Returns `false` when nothing was stored.
    async fn restore_session(&self) -> Result<bool, MintError>;

    /// Submit username and password through the login form.
    async fn submit_credentials(&self) -> Result<(), MintError>;

    /// Check for the post-login marker.
    async fn verify_session(&self) -> Result<bool, MintError>;

    /// Save the current session material for the next restart.
    async fn persist_session(&self) -> Result<(), MintError>;
}

/// Read side of the feed.
///
/// An empty list is a valid answer. Implementations report session loss
/// with [`MintError::SessionExpired`].
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn notifications(&self) -> Result<Vec<Mention>, MintError>;

    async fn search(&self, query: &str) -> Result<Vec<Mention>, MintError>;
}

/// Write side of the feed.
#[async_trait]
pub trait ReplySurface: Send + Sync {
    /// Post `text` as a reply to `mention`. Returns `Ok` only once the
    /// post-submit marker has been observed.
    async fn submit_reply(&self, mention: &Mention, text: &str) -> Result<(), MintError>;
}

/// A downloaded image ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub file_name: String,
}

/// Downloads the image attached to a mention.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Fails with [`MintError::Permanent`] when the URL does not yield an
    /// image.
    async fn fetch_image(&self, url: &str) -> Result<ImageAsset, MintError>;
}

/// Token metadata document published next to the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub description: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
}

/// Content-addressed storage.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Upload the image, returning its content identifier.
    async fn upload_image(&self, asset: &ImageAsset) -> Result<String, MintError>;

    /// Upload the metadata document, returning a resolvable URI.
    async fn upload_metadata(&self, metadata: &TokenMetadata) -> Result<String, MintError>;

    /// Public URI for a content identifier.
    fn uri_for(&self, cid: &str) -> String;
}

/// Authority key material for one issuance.
#[derive(Clone, PartialEq, Eq)]
pub struct Keypair {
    pub public: String,
    pub secret: Vec<u8>,
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Source of authority keys, either generated locally or drawn from a pool.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn next_keypair(&self) -> Result<Keypair, MintError>;
}

/// What gets issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceRequest {
    pub name: String,
    pub symbol: String,
    pub metadata_uri: String,
    pub authority: String,
    /// Mention id, sent so the service can reject replays on its side too.
    pub client_ref: String,
}

/// Confirmation returned by the issuance service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceReceipt {
    pub address: String,
    pub signature: String,
}

/// Token-launch service.
///
/// Implementations must classify errors strictly: [`MintError::Transient`]
/// only when the request provably never reached the service, otherwise
/// [`MintError::Ambiguous`] or [`MintError::Permanent`].
#[async_trait]
pub trait IssuanceService: Send + Sync {
    async fn issue(
        &self,
        request: &IssuanceRequest,
        keypair: &Keypair,
    ) -> Result<IssuanceReceipt, MintError>;
}
