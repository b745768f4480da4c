/// Gateway configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deployment environment; the composition root picks real or mock auth
    /// strategies based on this.
    pub environment: Environment,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Token issuer origin (JWKS endpoint lives under it). Required in
    /// production.
    pub auth_issuer: Option<String>,
    /// Expected `aud` claim on connection tokens.
    pub auth_audience: String,
    /// Platform API origin for project membership lookups. Required in
    /// production.
    pub platform_api_url: Option<String>,
    /// Shared secret required on the internal ingestion-report API. When
    /// unset the API is open (private-network deployments).
    pub ingest_token: Option<String>,
    /// Minimum interval between progress emissions per project, in ms.
    pub emit_interval_ms: u64,
    /// Seconds before token expiry at which clients are told to refresh.
    pub token_refresh_threshold_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a variable required for the
    /// selected environment is missing.
    pub fn from_env() -> Self {
        let environment = match std::env::var("APP_ENV").as_deref() {
            Ok("production") => Environment::Production,
            _ => Environment::Development,
        };

        let auth_issuer = optional_var("AUTH_ISSUER");
        let platform_api_url = optional_var("PLATFORM_API_URL");
        if environment.is_production() {
            if auth_issuer.is_none() {
                panic!("AUTH_ISSUER env var is required in production");
            }
            if platform_api_url.is_none() {
                panic!("PLATFORM_API_URL env var is required in production");
            }
        }

        Self {
            environment,
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4010),
            auth_issuer,
            auth_audience: std::env::var("AUTH_AUDIENCE")
                .unwrap_or_else(|_| "context-gateway".to_string()),
            platform_api_url,
            ingest_token: optional_var("INGEST_TOKEN"),
            emit_interval_ms: std::env::var("EMIT_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            token_refresh_threshold_secs: std::env::var("TOKEN_REFRESH_THRESHOLD_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}
