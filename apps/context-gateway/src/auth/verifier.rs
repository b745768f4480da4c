//! Token verification strategies.
//!
//! The gate only sees the [`TokenVerifier`] trait; whether tokens are
//! verified against the issuer's JWKS or accepted wholesale in development
//! is decided once, at the composition root.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, Validation};

use super::claims::TokenClaims;
use super::jwks::JwksClient;

/// Verifies a bearer credential presented at connection time.
///
/// Returns the decoded claims, or `None` for a malformed, unsigned, or
/// expired token. Implementations never panic on attacker-controlled input.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Option<TokenClaims>;
}

// ---------------------------------------------------------------------------
// Production: EdDSA JWT against the issuer JWKS
// ---------------------------------------------------------------------------

pub struct JwtVerifier {
    jwks: JwksClient,
    issuer: String,
    audience: String,
}

impl JwtVerifier {
    pub fn new(jwks: JwksClient, issuer: &str, audience: &str) -> Self {
        Self {
            jwks,
            issuer: issuer.to_string(),
            audience: audience.to_string(),
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Option<TokenClaims> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| tracing::debug!(?e, "token header decode failed"))
            .ok()?;
        let kid = header.kid?;

        let key = self
            .jwks
            .get_key(&kid)
            .await
            .map_err(|e| tracing::debug!(code = %e.code, "signing key lookup failed"))
            .ok()?;

        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);

        let data = jsonwebtoken::decode::<TokenClaims>(token, &key, &validation)
            .map_err(|e| tracing::debug!(?e, "token validation failed"))
            .ok()?;
        Some(data.claims)
    }
}

// ---------------------------------------------------------------------------
// Development: any non-empty token is accepted
// ---------------------------------------------------------------------------

/// Fixed identity issued by [`MockVerifier`].
pub const MOCK_USER_ID: &str = "mock-user-001";

/// Accepts any non-empty token and fabricates claims expiring one hour out.
/// Selected only outside production.
pub struct MockVerifier;

#[async_trait]
impl TokenVerifier for MockVerifier {
    async fn verify(&self, token: &str) -> Option<TokenClaims> {
        if token.is_empty() {
            return None;
        }
        let now = Utc::now();
        Some(TokenClaims {
            sub: MOCK_USER_ID.to_string(),
            email: Some("mock-user@example.com".to_string()),
            organization_id: Some("mock-org-001".to_string()),
            exp: (now + Duration::hours(1)).timestamp(),
            iat: now.timestamp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_verifier_accepts_any_non_empty_token() {
        let claims = MockVerifier.verify("whatever").await.unwrap();
        assert_eq!(claims.sub, MOCK_USER_ID);

        let ttl = claims.exp - Utc::now().timestamp();
        assert!((3590..=3610).contains(&ttl), "expiry one hour out, got {ttl}");
    }

    #[tokio::test]
    async fn mock_verifier_rejects_empty_token() {
        assert!(MockVerifier.verify("").await.is_none());
    }

    #[tokio::test]
    async fn jwt_verifier_rejects_garbage() {
        let jwks = JwksClient::with_static_key(
            "k1",
            jsonwebtoken::DecodingKey::from_ed_der(&[0u8; 32]),
        );
        let verifier = JwtVerifier::new(jwks, "https://auth.example.com", "context-gateway");
        assert!(verifier.verify("not-a-jwt").await.is_none());
    }
}
