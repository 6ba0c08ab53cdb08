//! Token issuance over a signed JSON API.
//!
//! Issuance is not idempotent, so errors are classified strictly: only a
//! request that provably never left (connection refused, DNS failure) is
//! transient. Anything that may have reached the service is ambiguous.

use crate::http::{self, truncate};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use mintwatch_core::{
    config::IssuanceConfig,
    error::MintError,
    traits::{IssuanceReceipt, IssuanceRequest, IssuanceService, Keypair},
};
use reqwest::StatusCode;
use sha2::Sha256;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of `payload`, hex-encoded.
pub fn sign(key: &[u8], payload: &[u8]) -> Result<String, MintError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| MintError::Permanent(format!("signing key rejected: {e}")))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Client for the issuance endpoint.
pub struct HttpIssuanceService {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpIssuanceService {
    pub fn from_config(config: &IssuanceConfig) -> Result<Self, MintError> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn classify_send(e: reqwest::Error) -> MintError {
        if e.is_connect() {
            MintError::Transient(format!("issuance unreachable: {e}"))
        } else if e.is_builder() {
            MintError::Permanent(format!("issuance request invalid: {e}"))
        } else {
            MintError::Ambiguous(format!("issuance outcome unknown: {e}"))
        }
    }

    fn classify_status(status: StatusCode, body: &str) -> MintError {
        let body = truncate(body, 200);
        if status.is_server_error() || status == StatusCode::CONFLICT {
            MintError::Ambiguous(format!("issuance HTTP {status}: {body}"))
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            MintError::Transient(format!("issuance rate limited: {body}"))
        } else {
            MintError::Permanent(format!("issuance rejected HTTP {status}: {body}"))
        }
    }
}

#[async_trait]
impl IssuanceService for HttpIssuanceService {
    async fn issue(
        &self,
        request: &IssuanceRequest,
        keypair: &Keypair,
    ) -> Result<IssuanceReceipt, MintError> {
        if keypair.public != request.authority {
            return Err(MintError::Permanent(
                "authority does not match the signing keypair".into(),
            ));
        }
        let body = serde_json::to_vec(request)?;
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let signed = [timestamp.as_bytes(), b".", body.as_slice()].concat();
        let request_sig = sign(self.api_key.as_bytes(), &signed)?;
        let authority_proof = sign(&keypair.secret, &body)?;

        info!(
            "issuance: POST {} ${} for {}",
            self.endpoint, request.symbol, request.client_ref
        );
        let resp = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("X-Api-Key", &self.api_key)
            .header("X-Timestamp", &timestamp)
            .header("X-Signature", request_sig)
            .header("X-Authority-Proof", authority_proof)
            .body(body)
            .send()
            .await
            .map_err(Self::classify_send)?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| MintError::Ambiguous(format!("issuance response unreadable: {e}")))?;
        if !status.is_success() {
            let err = Self::classify_status(status, &text);
            warn!("issuance: {err}");
            return Err(err);
        }

        let receipt: IssuanceReceipt = serde_json::from_str(&text).map_err(|e| {
            MintError::Ambiguous(format!(
                "issuance succeeded with an undecodable body ({e}): {}",
                truncate(&text, 200)
            ))
        })?;
        if receipt.address.is_empty() {
            return Err(MintError::Ambiguous(
                "issuance succeeded without an address".into(),
            ));
        }
        info!("issuance: ${} live at {}", request.symbol, receipt.address);
        Ok(receipt)
    }
}
