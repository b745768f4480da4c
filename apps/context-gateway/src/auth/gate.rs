//! Connection authorization gate for the ingestion channel.
//!
//! A connection attempt walks token-present → token-valid → project-present
//! → has-access. The first failing check rejects the attempt; every
//! rejection is recorded with a redacted token. Authorization is
//! all-or-nothing per attempt.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::access::AccessPolicy;
use super::claims::TokenClaims;
use super::denial_log::DenialLog;
use super::verifier::TokenVerifier;

/// Default window before expiry in which clients are told to refresh.
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// Machine-readable denial reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    NoToken,
    InvalidToken,
    NoProjectId,
    AccessDenied,
}

impl DenialReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoToken => "NO_TOKEN",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::NoProjectId => "NO_PROJECT_ID",
            Self::AccessDenied => "ACCESS_DENIED",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::NoToken => "Authentication token is required",
            Self::InvalidToken => "Invalid or expired token",
            Self::NoProjectId => "Project ID is required",
            Self::AccessDenied => "Access to this project is denied",
        }
    }
}

/// Rejection produced by [`ConnectionGate::authorize`].
#[derive(Debug)]
pub struct GateError {
    pub code: DenialReason,
}

impl GateError {
    pub fn message(&self) -> &'static str {
        self.code.message()
    }
}

/// Handshake metadata presented when a client connects.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub connection_id: String,
    pub token: Option<String>,
    pub project_id: Option<String>,
    pub source_addr: String,
}

/// Session data populated for an authorized connection.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub connection_id: String,
    pub user_id: String,
    pub project_id: String,
    pub role: Option<String>,
    pub token_expiry: DateTime<Utc>,
    pub claims: TokenClaims,
}

pub struct ConnectionGate {
    verifier: Arc<dyn TokenVerifier>,
    access: Arc<dyn AccessPolicy>,
    denials: DenialLog,
    refresh_threshold: chrono::Duration,
}

impl ConnectionGate {
    pub fn new(verifier: Arc<dyn TokenVerifier>, access: Arc<dyn AccessPolicy>) -> Self {
        Self {
            verifier,
            access,
            denials: DenialLog::new(),
            refresh_threshold: chrono::Duration::from_std(DEFAULT_REFRESH_THRESHOLD)
                .unwrap_or_else(|_| chrono::Duration::seconds(300)),
        }
    }

    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = chrono::Duration::from_std(threshold)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        self
    }

    /// Run the full authorization sequence for one connection attempt.
    pub async fn authorize(&self, handshake: &Handshake) -> Result<SessionContext, GateError> {
        let token = match handshake.token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => return Err(self.deny(handshake, DenialReason::NoToken)),
        };

        let claims = match self.verifier.verify(token).await {
            Some(claims) => claims,
            None => return Err(self.deny(handshake, DenialReason::InvalidToken)),
        };

        let project_id = match handshake.project_id.as_deref().filter(|p| !p.is_empty()) {
            Some(project_id) => project_id,
            None => return Err(self.deny(handshake, DenialReason::NoProjectId)),
        };

        let decision = self.access.check_access(&claims.sub, project_id).await;
        if !decision.has_access {
            if let Some(error) = &decision.error {
                tracing::error!(error, project_id, user_id = %claims.sub, "access check failed");
            }
            return Err(self.deny(handshake, DenialReason::AccessDenied));
        }

        tracing::info!(
            connection_id = %handshake.connection_id,
            user_id = %claims.sub,
            project_id,
            role = decision.role.as_deref().unwrap_or("-"),
            "connection authorized"
        );

        Ok(SessionContext {
            connection_id: handshake.connection_id.clone(),
            user_id: claims.sub.clone(),
            project_id: project_id.to_string(),
            role: decision.role,
            token_expiry: claims.expires_at(),
            claims,
        })
    }

    /// Whether `user_id` may subscribe to `project_id`'s channel. Used for
    /// room joins after the initial handshake.
    pub async fn check_project_access(&self, user_id: &str, project_id: &str) -> bool {
        self.access.check_access(user_id, project_id).await.has_access
    }

    /// True when a token with the given expiry should be proactively
    /// refreshed before the connection is force-closed.
    pub fn needs_refresh(&self, expiry: DateTime<Utc>) -> bool {
        expiry - Utc::now() <= self.refresh_threshold
    }

    pub fn denials(&self) -> &DenialLog {
        &self.denials
    }

    fn deny(&self, handshake: &Handshake, reason: DenialReason) -> GateError {
        self.denials.record(
            &handshake.connection_id,
            handshake.project_id.as_deref(),
            handshake.token.as_deref(),
            reason.message(),
            &handshake.source_addr,
        );
        GateError { code: reason }
    }
}
