//! JWKS client for fetching and caching the issuer's Ed25519 public keys.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::ApiError;

/// How long fetched keys stay fresh before a re-fetch (1 hour).
const CACHE_TTL: Duration = Duration::from_secs(3600);

/// Cached decoding keys from the issuer's JWKS endpoint.
#[derive(Clone)]
pub struct JwksClient {
    issuer_url: String,
    http: reqwest::Client,
    cache: Arc<RwLock<KeyCache>>,
}

struct KeyCache {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Option<Instant>,
}

impl KeyCache {
    fn is_fresh(&self) -> bool {
        self.fetched_at.map_or(false, |at| at.elapsed() < CACHE_TTL)
    }
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<JwkEntry>,
}

#[derive(Debug, Deserialize)]
struct JwkEntry {
    kid: Option<String>,
    kty: String,
    crv: Option<String>,
    x: Option<String>,
}

impl JwksClient {
    pub fn new(issuer_url: &str) -> Self {
        Self {
            issuer_url: issuer_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            cache: Arc::new(RwLock::new(KeyCache {
                keys: HashMap::new(),
                fetched_at: None,
            })),
        }
    }

    /// For tests: a client pre-loaded with a known key that never re-fetches.
    pub fn with_static_key(kid: &str, decoding_key: DecodingKey) -> Self {
        let mut keys = HashMap::new();
        keys.insert(kid.to_string(), decoding_key);
        Self {
            issuer_url: String::new(),
            http: reqwest::Client::new(),
            cache: Arc::new(RwLock::new(KeyCache {
                keys,
                fetched_at: Some(Instant::now() + CACHE_TTL * 24),
            })),
        }
    }

    /// Get the decoding key for a given `kid`, re-fetching the JWKS if the
    /// cache is stale or the key is unknown.
    pub async fn get_key(&self, kid: &str) -> Result<DecodingKey, ApiError> {
        {
            let cache = self.cache.read().await;
            if cache.is_fresh() {
                if let Some(key) = cache.keys.get(kid) {
                    return Ok(key.clone());
                }
            }
        }

        self.refresh().await?;

        let cache = self.cache.read().await;
        cache
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Unknown signing key"))
    }

    async fn refresh(&self) -> Result<(), ApiError> {
        let url = format!("{}/.well-known/jwks.json", self.issuer_url);
        tracing::info!(%url, "fetching issuer JWKS");

        let resp: JwksResponse = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(?e, "JWKS fetch failed");
                ApiError::internal("Failed to fetch issuer JWKS")
            })?
            .json()
            .await
            .map_err(|e| {
                tracing::error!(?e, "JWKS parse failed");
                ApiError::internal("Failed to parse issuer JWKS")
            })?;

        let mut keys = HashMap::new();
        for entry in resp.keys {
            // Only Ed25519 OKP keys are accepted; everything else is skipped.
            if entry.kty != "OKP" || entry.crv.as_deref() != Some("Ed25519") {
                continue;
            }
            let (Some(kid), Some(x)) = (entry.kid, entry.x) else {
                continue;
            };

            let public_bytes = URL_SAFE_NO_PAD.decode(&x).map_err(|e| {
                tracing::error!(?e, %kid, "bad JWKS x value");
                ApiError::internal("Invalid JWKS key encoding")
            })?;

            keys.insert(kid, DecodingKey::from_ed_der(&public_bytes));
        }

        let mut cache = self.cache.write().await;
        cache.keys = keys;
        cache.fetched_at = Some(Instant::now());

        Ok(())
    }
}
