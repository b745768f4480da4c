//! Claims carried by a connection's bearer token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Decoded bearer-token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the authenticated user ID.
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl TokenClaims {
    /// The token's expiry as a UTC timestamp. An out-of-range `exp` maps to
    /// the epoch, which reads as already expired.
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_default()
    }
}
