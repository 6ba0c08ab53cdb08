//! Authority key providers.

use crate::http::{self, send_error, status_error};
use async_trait::async_trait;
use mintwatch_core::{
    config::KeyPoolConfig,
    error::MintError,
    traits::{KeyProvider, Keypair},
};
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Public identifier derived from secret key material.
pub fn public_id(secret: &[u8]) -> String {
    hex::encode(Sha256::digest(secret))
}

/// Generates a fresh random keypair per launch.
#[derive(Debug, Default)]
pub struct LocalKeyProvider;

#[async_trait]
impl KeyProvider for LocalKeyProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn next_keypair(&self) -> Result<Keypair, MintError> {
        let mut secret = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        let public = public_id(&secret);
        debug!("keys: generated authority {public}");
        Ok(Keypair { public, secret })
    }
}

#[derive(Debug, Deserialize)]
struct PoolEntry {
    id: String,
    #[serde(default)]
    public: Option<String>,
    /// Hex-encoded secret.
    secret: String,
}

/// Draws pre-provisioned keypairs from a REST key pool and marks each one
/// consumed before handing it out.
pub struct PoolKeyProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl PoolKeyProvider {
    pub fn from_config(config: &KeyPoolConfig) -> Result<Self, MintError> {
        if config.endpoint.is_empty() {
            return Err(MintError::Config("key_pool.endpoint is empty".into()));
        }
        Ok(Self {
            client: http::client(30)?,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn fetch_unused(&self) -> Result<PoolEntry, MintError> {
        let url = format!("{}/keys?consumed=false&limit=1", self.endpoint);
        let resp = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| send_error("key pool fetch", e))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| MintError::Transient(format!("key pool fetch: {e}")))?;
        if !status.is_success() {
            return Err(status_error("key pool fetch", status, &body));
        }
        let mut entries: Vec<PoolEntry> = serde_json::from_str(&body)
            .map_err(|e| MintError::Transient(format!("key pool fetch: bad response: {e}")))?;
        if entries.is_empty() {
            return Err(MintError::Permanent("key pool exhausted".into()));
        }
        Ok(entries.swap_remove(0))
    }

    async fn mark_consumed(&self, id: &str) -> Result<(), MintError> {
        let url = format!("{}/keys/{id}", self.endpoint);
        let resp = self
            .client
            .patch(&url)
            .header("X-Api-Key", &self.api_key)
            .json(&serde_json::json!({
                "consumed": true,
                "consumed_at": chrono::Utc::now().to_rfc3339(),
            }))
            .send()
            .await
            .map_err(|e| send_error("key pool consume", e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error("key pool consume", status, &body));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyProvider for PoolKeyProvider {
    fn name(&self) -> &str {
        "pool"
    }

    async fn next_keypair(&self) -> Result<Keypair, MintError> {
        let entry = self.fetch_unused().await?;
        let secret = hex::decode(entry.secret.trim()).map_err(|e| {
            MintError::Permanent(format!("key {} has a bad secret: {e}", entry.id))
        })?;
        let public = entry.public.unwrap_or_else(|| public_id(&secret));

        self.mark_consumed(&entry.id).await?;
        info!("keys: drew authority {public} from pool");
        Ok(Keypair { public, secret })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{serve, Canned};

    fn pool(base: &str) -> PoolKeyProvider {
        PoolKeyProvider::from_config(&KeyPoolConfig {
            endpoint: base.to_string(),
            api_key: "pool-key".into(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_local_keys_are_fresh() {
        let provider = LocalKeyProvider;
        let a = provider.next_keypair().await.unwrap();
        let b = provider.next_keypair().await.unwrap();
        assert_ne!(a.secret, b.secret);
        assert_eq!(a.public, public_id(&a.secret));
        assert_eq!(a.secret.len(), 32);
        assert!(!format!("{a:?}").contains(&hex::encode(&a.secret)));
    }

    #[tokio::test]
    async fn test_pool_fetches_and_marks_consumed() {
        let (base, seen) = serve(vec![
            Canned::json(200, r#"[{"id":"k1","public":"PubOne","secret":"0a0b"}]"#),
            Canned::json(200, "{}"),
        ])
        .await;
        let keypair = pool(&base).next_keypair().await.unwrap();
        assert_eq!(keypair.public, "PubOne");
        assert_eq!(keypair.secret, vec![0x0a, 0x0b]);

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen[0].request_line(),
            "GET /keys?consumed=false&limit=1 HTTP/1.1"
        );
        assert_eq!(seen[0].header("x-api-key").as_deref(), Some("pool-key"));
        assert_eq!(seen[1].request_line(), "PATCH /keys/k1 HTTP/1.1");
        assert!(seen[1].body_text().contains("\"consumed\":true"));
    }

    #[tokio::test]
    async fn test_empty_pool_is_permanent() {
        let (base, _) = serve(vec![Canned::json(200, "[]")]).await;
        let err = pool(&base).next_keypair().await.unwrap_err();
        assert!(matches!(err, MintError::Permanent(_)));
    }

    #[tokio::test]
    async fn test_failed_consume_withholds_key() {
        let (base, _) = serve(vec![
            Canned::json(200, r#"[{"id":"k1","secret":"0a0b"}]"#),
            Canned::json(503, "busy"),
        ])
        .await;
        assert!(pool(&base).next_keypair().await.unwrap_err().is_transient());
    }

    #[test]
    fn test_pool_requires_endpoint() {
        assert!(PoolKeyProvider::from_config(&KeyPoolConfig::default()).is_err());
    }
}
