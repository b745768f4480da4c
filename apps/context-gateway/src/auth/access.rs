//! Project membership checks gating channel subscriptions.

use async_trait::async_trait;
use serde::Deserialize;

/// Outcome of a membership check. `error` carries a diagnostic for logging
/// and never grants access.
#[derive(Debug, Clone)]
pub struct AccessDecision {
    pub has_access: bool,
    pub role: Option<String>,
    pub error: Option<String>,
}

impl AccessDecision {
    pub fn granted(role: &str) -> Self {
        Self {
            has_access: true,
            role: Some(role.to_string()),
            error: None,
        }
    }

    pub fn denied() -> Self {
        Self {
            has_access: false,
            role: None,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            has_access: false,
            role: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait AccessPolicy: Send + Sync {
    async fn check_access(&self, user_id: &str, project_id: &str) -> AccessDecision;
}

// ---------------------------------------------------------------------------
// Development: every authenticated user is a member
// ---------------------------------------------------------------------------

/// Role granted by [`MockAccessPolicy`].
pub const MOCK_ROLE: &str = "member";

pub struct MockAccessPolicy;

#[async_trait]
impl AccessPolicy for MockAccessPolicy {
    async fn check_access(&self, _user_id: &str, _project_id: &str) -> AccessDecision {
        AccessDecision::granted(MOCK_ROLE)
    }
}

// ---------------------------------------------------------------------------
// Production: membership lookup against the platform API
// ---------------------------------------------------------------------------

/// Fails safe: any transport or decode failure denies access.
pub struct HttpMembershipPolicy {
    http: reqwest::Client,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct MembershipResponse {
    role: String,
}

impl HttpMembershipPolicy {
    pub fn new(api_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AccessPolicy for HttpMembershipPolicy {
    async fn check_access(&self, user_id: &str, project_id: &str) -> AccessDecision {
        let url = format!(
            "{}/api/v1/projects/{}/members/{}",
            self.api_url, project_id, user_id
        );

        let resp = match self.http.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!(?e, project_id, "membership lookup failed");
                return AccessDecision::failed("membership lookup unavailable");
            }
        };

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::FORBIDDEN {
            return AccessDecision::denied();
        }
        if !status.is_success() {
            tracing::error!(%status, project_id, "membership lookup returned error");
            return AccessDecision::failed(format!("membership lookup returned {status}"));
        }

        match resp.json::<MembershipResponse>().await {
            Ok(membership) => AccessDecision::granted(&membership.role),
            Err(e) => {
                tracing::error!(?e, project_id, "membership response decode failed");
                AccessDecision::failed("invalid membership response")
            }
        }
    }
}
