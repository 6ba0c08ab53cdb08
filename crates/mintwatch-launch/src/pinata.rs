//! Pinata-compatible content-addressed asset store.

use crate::http::{self, send_error, status_error};
use async_trait::async_trait;
use mintwatch_core::{
    config::AssetConfig,
    error::MintError,
    traits::{AssetStore, ImageAsset, TokenMetadata},
};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Uploads images and metadata documents, returning IPFS identifiers.
pub struct PinataAssetStore {
    client: reqwest::Client,
    api_url: String,
    gateway_url: String,
    jwt: String,
}

#[derive(Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

#[derive(Serialize)]
struct PinJsonRequest<'a> {
    #[serde(rename = "pinataContent")]
    content: &'a TokenMetadata,
    #[serde(rename = "pinataMetadata")]
    metadata: PinMetadata,
}

#[derive(Serialize)]
struct PinMetadata {
    name: String,
}

impl PinataAssetStore {
    pub fn from_config(config: &AssetConfig) -> Result<Self, MintError> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            gateway_url: config.gateway_url.trim_end_matches('/').to_string(),
            jwt: config.jwt.clone(),
        })
    }

    async fn pin(&self, what: &str, req: reqwest::RequestBuilder) -> Result<String, MintError> {
        let resp = req
            .bearer_auth(&self.jwt)
            .send()
            .await
            .map_err(|e| send_error(what, e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| MintError::Transient(format!("{what}: reading response: {e}")))?;
        if !status.is_success() {
            return Err(status_error(what, status, &body));
        }

        let parsed: PinResponse = serde_json::from_str(&body).map_err(|e| {
            let snippet = http::truncate(&body, 200);
            MintError::Transient(format!("{what}: unexpected response ({e}): {snippet}"))
        })?;
        if parsed.ipfs_hash.is_empty() {
            return Err(MintError::Transient(format!("{what}: empty IpfsHash")));
        }
        Ok(parsed.ipfs_hash)
    }
}

#[async_trait]
impl AssetStore for PinataAssetStore {
    async fn upload_image(&self, asset: &ImageAsset) -> Result<String, MintError> {
        let part = Part::bytes(asset.bytes.clone())
            .file_name(asset.file_name.clone())
            .mime_str(&asset.content_type)
            .map_err(|e| MintError::Permanent(format!("image upload: bad content type: {e}")))?;
        let form = Form::new().part("file", part);

        let url = format!("{}/pinning/pinFileToIPFS", self.api_url);
        debug!("pinata: POST {url} ({} bytes)", asset.bytes.len());
        let cid = self
            .pin("image upload", self.client.post(&url).multipart(form))
            .await?;
        info!("pinata: image pinned as {cid}");
        Ok(cid)
    }

    async fn upload_metadata(&self, metadata: &TokenMetadata) -> Result<String, MintError> {
        let body = PinJsonRequest {
            content: metadata,
            metadata: PinMetadata {
                name: format!("{}-metadata.json", metadata.symbol),
            },
        };
        let url = format!("{}/pinning/pinJSONToIPFS", self.api_url);
        debug!("pinata: POST {url}");
        let cid = self
            .pin("metadata upload", self.client.post(&url).json(&body))
            .await?;
        info!("pinata: metadata pinned as {cid}");
        Ok(self.uri_for(&cid))
    }

    fn uri_for(&self, cid: &str) -> String {
        format!("{}/{cid}", self.gateway_url)
    }
}
