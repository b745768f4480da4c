mod common;

use axum_test::TestServer;
use http::StatusCode;
use tokio::sync::mpsc;

use context_gateway::auth::gate::Handshake;

fn test_server(state: context_gateway::AppState) -> TestServer {
    let app = context_gateway::routes::router().with_state(state);
    TestServer::new(app).expect("test server")
}

#[tokio::test]
async fn health_returns_ok() {
    let server = test_server(common::mock_state());

    let resp = server.get("/health").await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<serde_json::Value>()["status"], "ok");
}

#[tokio::test]
async fn openapi_spec_is_served() {
    let server = test_server(common::mock_state());

    let resp = server.get("/api-docs/openapi.json").await;
    resp.assert_status_ok();
    let spec = resp.json::<serde_json::Value>();
    assert!(spec["paths"]["/api/v1/ingest/{project_id}/progress"].is_object());
}

#[tokio::test]
async fn stats_start_at_zero() {
    let server = test_server(common::mock_state());

    let resp = server.get("/api/v1/realtime/stats").await;
    resp.assert_status_ok();
    let stats = resp.json::<serde_json::Value>();
    assert_eq!(stats["active_connections"], 0);
    assert_eq!(stats["denied_attempts"], 0);
}

#[tokio::test]
async fn progress_report_fans_out_to_subscribers() {
    let state = common::mock_state();
    let server = test_server(state.clone());

    // Subscribe a connection directly through the registry.
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.rooms.register("conn_test", "u1", tx);
    state.rooms.join("conn_test", "ingestion:p1");

    let resp = server
        .post("/api/v1/ingest/p1/progress")
        .json(&serde_json::json!({
            "phase": "embedding",
            "progress_percent": 130.0,
            "metrics": {"chunks": 42}
        }))
        .await;
    resp.assert_status(StatusCode::ACCEPTED);

    let text = rx.recv().await.expect("event delivered");
    let event: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(event["type"], "progress_update");
    assert_eq!(event["progress_percent"], 100.0, "clamped to 100");
    assert_eq!(event["metrics"]["chunks"], 42);
}

#[tokio::test]
async fn phase_and_terminal_reports_are_accepted() {
    let state = common::mock_state();
    let server = test_server(state.clone());

    let resp = server
        .post("/api/v1/ingest/p1/phase")
        .json(&serde_json::json!({
            "phase": "chunking",
            "message": "Splitting documents",
            "total_phases": 3,
            "current_phase_index": 0
        }))
        .await;
    resp.assert_status(StatusCode::ACCEPTED);

    let resp = server
        .post("/api/v1/ingest/p1/error")
        .json(&serde_json::json!({"phase": "chunking", "error": "parser crashed"}))
        .await;
    resp.assert_status(StatusCode::ACCEPTED);

    let resp = server
        .post("/api/v1/ingest/p1/complete")
        .json(&serde_json::json!({"result": {"documents": 10}}))
        .await;
    resp.assert_status(StatusCode::ACCEPTED);
}

#[tokio::test]
async fn ingest_token_is_enforced_when_configured() {
    let mut config = common::test_config();
    config.ingest_token = Some("sekrit".to_string());
    let state = common::state_with(
        std::sync::Arc::new(context_gateway::auth::verifier::MockVerifier),
        std::sync::Arc::new(context_gateway::auth::access::MockAccessPolicy),
        config,
    );
    let server = test_server(state);

    let body = serde_json::json!({"phase": "chunking", "progress_percent": 10.0});

    let resp = server.post("/api/v1/ingest/p1/progress").json(&body).await;
    resp.assert_status(StatusCode::UNAUTHORIZED);

    let resp = server
        .post("/api/v1/ingest/p1/progress")
        .add_header(
            http::HeaderName::from_static("x-ingest-token"),
            http::HeaderValue::from_static("wrong"),
        )
        .json(&body)
        .await;
    resp.assert_status(StatusCode::UNAUTHORIZED);

    let resp = server
        .post("/api/v1/ingest/p1/progress")
        .add_header(
            http::HeaderName::from_static("x-ingest-token"),
            http::HeaderValue::from_static("sekrit"),
        )
        .json(&body)
        .await;
    resp.assert_status(StatusCode::ACCEPTED);
}

#[tokio::test]
async fn denial_audit_is_exposed() {
    let state = common::mock_state();
    let server = test_server(state.clone());

    let handshake = Handshake {
        connection_id: "conn_audit".to_string(),
        token: None,
        project_id: Some("p1".to_string()),
        source_addr: "203.0.113.9".to_string(),
    };
    state.gate.authorize(&handshake).await.unwrap_err();

    let resp = server.get("/api/v1/realtime/denials").await;
    resp.assert_status_ok();
    let body = resp.json::<serde_json::Value>();
    let denials = body["denials"].as_array().unwrap();
    assert_eq!(denials.len(), 1);
    assert_eq!(denials[0]["reason"], "Authentication token is required");
    assert_eq!(denials[0]["source_addr"], "203.0.113.9");
    assert_eq!(denials[0]["token_fragment"], "***");

    let stats = server.get("/api/v1/realtime/stats").await;
    assert_eq!(stats.json::<serde_json::Value>()["denied_attempts"], 1);
}
