use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use ed25519_dalek::{SigningKey, VerifyingKey};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use sha2::{Digest, Sha256};

use context_gateway::auth::access::{AccessPolicy, MockAccessPolicy};
use context_gateway::auth::claims::TokenClaims;
use context_gateway::auth::gate::ConnectionGate;
use context_gateway::auth::jwks::JwksClient;
use context_gateway::auth::verifier::{JwtVerifier, MockVerifier, TokenVerifier};
use context_gateway::config::{Config, Environment};
use context_gateway::gateway::emitter::IngestionEmitter;
use context_gateway::gateway::rooms::RoomRegistry;
use context_gateway::AppState;

/// Issuer used by JWT-mode tests.
pub const TEST_ISSUER: &str = "https://auth.test.invalid";

/// Test signing keys derived from a fixed seed.
pub struct TestSigningKeys {
    pub kid: String,
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
}

impl TestSigningKeys {
    pub fn from_seed(seed: &str) -> Self {
        let hash = Sha256::digest(seed.as_bytes());
        let mut secret_bytes = [0u8; 32];
        secret_bytes.copy_from_slice(&hash);

        let signing_key = SigningKey::from_bytes(&secret_bytes);
        let verifying_key: VerifyingKey = (&signing_key).into();
        let public_bytes = verifying_key.to_bytes();

        let pkcs8_der = wrap_ed25519_private_pkcs8(&signing_key.to_bytes());
        let encoding = EncodingKey::from_ed_der(&pkcs8_der);
        let decoding = DecodingKey::from_ed_der(&public_bytes);

        let kid_hash = Sha256::digest(public_bytes);
        let kid = format!(
            "auth-{:02x}{:02x}{:02x}{:02x}",
            kid_hash[0], kid_hash[1], kid_hash[2], kid_hash[3]
        );

        Self {
            kid,
            encoding,
            decoding,
        }
    }
}

fn wrap_ed25519_private_pkcs8(secret: &[u8; 32]) -> Vec<u8> {
    let mut der = Vec::with_capacity(48);
    der.extend_from_slice(&[0x30, 0x2e]);
    der.extend_from_slice(&[0x02, 0x01, 0x00]);
    der.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    der.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    der.extend_from_slice(secret);
    der
}

/// Mint a connection token with the given TTL (negative for an expired one).
pub fn mint_token(keys: &TestSigningKeys, user_id: &str, audience: &str, ttl_secs: i64) -> String {
    let now = chrono::Utc::now();
    let claims = TokenClaims {
        sub: user_id.to_string(),
        email: None,
        organization_id: None,
        exp: (now + chrono::Duration::seconds(ttl_secs)).timestamp(),
        iat: (now + chrono::Duration::seconds(ttl_secs.min(0) - 60)).timestamp(),
    };

    // jsonwebtoken validates `iss`/`aud` from the claim map, so splice them in.
    let mut value = serde_json::to_value(&claims).expect("serialize claims");
    value["iss"] = serde_json::Value::String(TEST_ISSUER.to_string());
    value["aud"] = serde_json::Value::String(audience.to_string());

    let mut header = Header::new(Algorithm::EdDSA);
    header.kid = Some(keys.kid.clone());

    jsonwebtoken::encode(&header, &value, &keys.encoding).expect("mint test token")
}

/// Config for tests: development mode, short emit interval, random port.
pub fn test_config() -> Config {
    Config {
        environment: Environment::Development,
        port: 0,
        auth_issuer: None,
        auth_audience: "context-gateway".to_string(),
        platform_api_url: None,
        ingest_token: None,
        emit_interval_ms: 100,
        token_refresh_threshold_secs: 300,
    }
}

/// Build an AppState around the given auth strategies.
pub fn state_with(
    verifier: Arc<dyn TokenVerifier>,
    access: Arc<dyn AccessPolicy>,
    config: Config,
) -> AppState {
    let gate = Arc::new(
        ConnectionGate::new(verifier, access)
            .with_refresh_threshold(Duration::from_secs(config.token_refresh_threshold_secs)),
    );
    let rooms = Arc::new(RoomRegistry::new());
    let emitter = Arc::new(IngestionEmitter::new(Duration::from_millis(
        config.emit_interval_ms,
    )));
    emitter.attach_transport(rooms.clone());

    AppState {
        config: Arc::new(config),
        rooms,
        emitter,
        gate,
    }
}

/// Development-mode state: mock verifier and access policy.
pub fn mock_state() -> AppState {
    state_with(Arc::new(MockVerifier), Arc::new(MockAccessPolicy), test_config())
}

/// JWT-mode state: real verifier against a static test key.
pub fn jwt_state(keys: &TestSigningKeys) -> AppState {
    let jwks = JwksClient::with_static_key(&keys.kid, keys.decoding.clone());
    let verifier = JwtVerifier::new(jwks, TEST_ISSUER, "context-gateway");
    state_with(Arc::new(verifier), Arc::new(MockAccessPolicy), test_config())
}

/// Bind a real TCP listener and serve the app in the background.
pub async fn start_server(state: AppState) -> SocketAddr {
    let app: Router = context_gateway::routes::router().with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    addr
}
