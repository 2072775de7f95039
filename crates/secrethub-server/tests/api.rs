//! End-to-end tests of the REST surface over the in-memory backend.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use secrethub_core::CoreConfig;
use secrethub_server::{Node, router};
use tower::util::ServiceExt;

async fn test_node() -> (Node, Router) {
    let mut config = CoreConfig::default();
    config.audit.hmac_key = Some("integration-test-key".to_string());
    let node = Node::build(config).await.expect("node builds");
    let app = router(node.app_state());
    (node, app)
}

async fn request(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request builds");

    let response = app.clone().oneshot(request).await.expect("request served");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body reads");
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body is json")
    };
    (status, json)
}

#[tokio::test]
async fn test_init_unseal_seal_flow() {
    let (_node, app) = test_node().await;

    // Fresh cluster: not initialized.
    let (status, body) = request(&app, "GET", "/sys/seal-status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["initialized"], false);
    assert_eq!(body["sealed"], true);

    // Initialize with (5, 3); shares come back exactly once.
    let (status, body) = request(
        &app,
        "POST",
        "/sys/init",
        Some(serde_json::json!({"total_shares": 5, "threshold": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let shares: Vec<String> = body["shares"]
        .as_array()
        .expect("shares array")
        .iter()
        .map(|s| s.as_str().expect("share is string").to_string())
        .collect();
    assert_eq!(shares.len(), 5);

    // Second init is rejected.
    let (status, body) = request(
        &app,
        "POST",
        "/sys/init",
        Some(serde_json::json!({"total_shares": 5, "threshold": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "already_initialized");

    // Share #1.
    let (status, body) = request(
        &app,
        "POST",
        "/sys/unseal",
        Some(serde_json::json!({"share": shares[0]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sealed"], true);
    assert_eq!(body["progress"], 1);

    // Share #1 again: deduplicated.
    let (_, body) = request(
        &app,
        "POST",
        "/sys/unseal",
        Some(serde_json::json!({"share": shares[0]})),
    )
    .await;
    assert_eq!(body["progress"], 1);

    // Shares #2 and #3 reach the threshold.
    let (_, body) = request(
        &app,
        "POST",
        "/sys/unseal",
        Some(serde_json::json!({"share": shares[1]})),
    )
    .await;
    assert_eq!(body["sealed"], true);
    assert_eq!(body["progress"], 2);

    let (_, body) = request(
        &app,
        "POST",
        "/sys/unseal",
        Some(serde_json::json!({"share": shares[2]})),
    )
    .await;
    assert_eq!(body["sealed"], false);
    assert_eq!(body["progress"], 3);

    // Health reflects the unsealed state.
    let (status, body) = request(&app, "GET", "/sys/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sealed"], false);

    // Seal again.
    let (status, body) = request(&app, "POST", "/sys/seal", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sealed"], true);

    let (_, body) = request(&app, "GET", "/sys/health", None).await;
    assert_eq!(body["status"], "sealed");
}

#[tokio::test]
async fn test_invalid_share_rejected() {
    let (_node, app) = test_node().await;
    request(
        &app,
        "POST",
        "/sys/init",
        Some(serde_json::json!({"total_shares": 3, "threshold": 2})),
    )
    .await;

    let (status, body) = request(
        &app,
        "POST",
        "/sys/unseal",
        Some(serde_json::json!({"share": "zz-not-hex"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_share");
}

#[tokio::test]
async fn test_unseal_before_init() {
    let (_node, app) = test_node().await;
    let (status, body) = request(
        &app,
        "POST",
        "/sys/unseal",
        Some(serde_json::json!({"share": "01ff"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "not_initialized");
}

#[tokio::test]
async fn test_cluster_info_reports_registered_nodes() {
    let (node, app) = test_node().await;
    node.coordinator.register().await.expect("registers");

    let (status, body) = request(&app, "GET", "/cluster/info", None).await;
    assert_eq!(status, StatusCode::OK);
    let nodes = body.as_array().expect("node list");
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["status"], "starting");
    assert_eq!(nodes[0]["leader"], false);
    assert_eq!(nodes[0]["initialized"], false);
    assert!(nodes[0]["last_seen_at"].as_str().is_some());
}

#[tokio::test]
async fn test_invalid_threshold_config() {
    let (_node, app) = test_node().await;
    let (status, body) = request(
        &app,
        "POST",
        "/sys/init",
        Some(serde_json::json!({"total_shares": 3, "threshold": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_config");
}
