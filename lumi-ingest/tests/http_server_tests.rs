//! HTTP server and routing integration tests

mod helpers;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use helpers::*;
use http_body_util::BodyExt;
use lumi_ingest::build_router;
use lumi_ingest::services::{scan_object_path, ImageSide, ObjectStorage};
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

/// Send one request through a fresh router, returning status and JSON body
/// (`Value::Null` for empty or non-JSON bodies)
async fn send(
    harness: &Harness,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, bytes) = send_raw(harness, method, uri, body).await;
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn send_raw(
    harness: &Harness,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>) {
    let app = build_router(harness.state.clone());
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

fn stage_body() -> Value {
    json!({
        "answers": {"age": 29, "sex": "female"},
        "front_image": FRONT_B64,
        "side_image": SIDE_B64,
    })
}

#[tokio::test]
async fn test_health_reports_flush_state() {
    let harness = HarnessBuilder::new().build().await;

    let (status, body) = send(&harness, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "lumi-ingest");
    assert_eq!(body["flush_in_flight"], false);
    assert_eq!(body["capture_staged"], false);
    assert_eq!(body["event_subscribers"], 0);
    assert!(body.get("last_error").is_none());

    let _listener = harness.state.event_bus.subscribe();
    let (_, body) = send(&harness, Method::GET, "/health", None).await;
    assert_eq!(body["event_subscribers"], 1);
}

#[tokio::test]
async fn test_session_sign_in_and_out() {
    let harness = HarnessBuilder::new().build().await;

    let (status, _) = send(
        &harness,
        Method::POST,
        "/session",
        Some(json!({"owner_id": "  "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &harness,
        Method::POST,
        "/session",
        Some(json!({"owner_id": "owner-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["owner_id"], "owner-1");

    let (_, body) = send(&harness, Method::GET, "/session", None).await;
    assert_eq!(body["owner_id"], "owner-1");

    let (status, _) = send(&harness, Method::DELETE, "/session", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(&harness, Method::GET, "/session", None).await;
    assert!(body["owner_id"].is_null());
}

#[tokio::test]
async fn test_access_stage_follows_facts() {
    let harness = HarnessBuilder::new().entitled(false).build().await;

    let (_, body) = send(&harness, Method::GET, "/access", None).await;
    assert_eq!(body["stage"], "onboarding");
    assert_eq!(body["route"], "/onboarding");
    assert_eq!(body["facts"]["is_authenticated"], false);

    harness.sign_in("owner-1").await;
    let (_, body) = send(&harness, Method::GET, "/access", None).await;
    assert_eq!(body["stage"], "onboarding");

    let (status, _) = send(
        &harness,
        Method::PUT,
        "/profile",
        Some(json!({"onboarding_completed": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&harness, Method::GET, "/access", None).await;
    assert_eq!(body["stage"], "paywall");
    assert_eq!(body["facts"]["onboarding_completed"], true);
    assert_eq!(body["facts"]["is_entitled"], false);
}

#[tokio::test]
async fn test_entitled_owner_reaches_dashboard() {
    let harness = HarnessBuilder::new().build().await;
    harness.sign_in("owner-1").await;
    send(
        &harness,
        Method::PUT,
        "/profile",
        Some(json!({"onboarding_completed": true, "answers": {"goal": "skin"}})),
    )
    .await;

    let (_, body) = send(&harness, Method::GET, "/access", None).await;
    assert_eq!(body["stage"], "dashboard");

    let (_, body) = send(
        &harness,
        Method::GET,
        "/access/guard?destination=/dashboard",
        None,
    )
    .await;
    assert_eq!(body["decision"], "allow");
    assert_eq!(body["stage"], "dashboard");
}

#[tokio::test]
async fn test_guard_redirects_skipped_stage() {
    let harness = HarnessBuilder::new().build().await;

    let (status, body) = send(
        &harness,
        Method::GET,
        "/access/guard?destination=/dashboard",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decision"], "redirect");
    assert_eq!(body["stage"], "onboarding");
    assert_eq!(body["to"], "/onboarding");
}

#[tokio::test]
async fn test_profile_requires_session() {
    let harness = HarnessBuilder::new().build().await;

    let (status, body) = send(
        &harness,
        Method::PUT,
        "/profile",
        Some(json!({"onboarding_completed": true})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    harness.sign_in("owner-1").await;
    let (status, _) = send(&harness, Method::GET, "/profile", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_staging_rejects_incomplete_capture() {
    let harness = HarnessBuilder::new().build().await;

    let (status, body) = send(
        &harness,
        Method::PUT,
        "/staging",
        Some(json!({"front_image": FRONT_B64})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, body) = send(&harness, Method::PUT, "/staging", Some(stage_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["staged"], true);

    let (_, body) = send(&harness, Method::GET, "/health", None).await;
    assert_eq!(body["capture_staged"], true);

    let (status, _) = send(&harness, Method::DELETE, "/staging", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!harness.state.coordinator.has_staged_capture());
}

#[tokio::test]
async fn test_flush_completes_and_lists_scan() {
    let harness = HarnessBuilder::new().build().await;
    send(&harness, Method::PUT, "/staging", Some(stage_body())).await;
    harness.sign_in("owner-1").await;

    let (status, body) = send(&harness, Method::POST, "/flush", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "completed");
    assert_eq!(body["scan"]["owner_id"], "owner-1");
    let scan_id = body["scan"]["id"].clone();

    let (_, body) = send(&harness, Method::POST, "/flush", None).await;
    assert_eq!(body["outcome"], "nothing_staged");

    let (status, body) = send(&harness, Method::GET, "/scans", None).await;
    assert_eq!(status, StatusCode::OK);
    let scans = body.as_array().unwrap();
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0]["id"], scan_id);
}

#[tokio::test]
async fn test_flush_unentitled_is_payment_required() {
    let harness = HarnessBuilder::new().entitled(false).build().await;
    send(&harness, Method::PUT, "/staging", Some(stage_body())).await;
    harness.sign_in("owner-1").await;

    let (status, body) = send(&harness, Method::POST, "/flush", None).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["code"], "PAYMENT_REQUIRED");
    assert!(harness.state.coordinator.has_staged_capture());

    let (_, body) = send(&harness, Method::GET, "/health", None).await;
    assert!(body["last_error"].is_string());
}

#[tokio::test]
async fn test_flush_without_session_is_unauthorized() {
    let harness = HarnessBuilder::new().build().await;
    send(&harness, Method::PUT, "/staging", Some(stage_body())).await;

    let (status, _) = send(&harness, Method::POST, "/flush", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_pipeline_failure_is_bad_gateway() {
    let harness = HarnessBuilder::new()
        .analysis(std::sync::Arc::new(FailingAnalysis))
        .build()
        .await;
    send(&harness, Method::PUT, "/staging", Some(stage_body())).await;
    harness.sign_in("owner-1").await;

    let (status, body) = send(&harness, Method::POST, "/flush", None).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "PIPELINE_STEP_FAILED");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("analysis"));
}

#[tokio::test]
async fn test_signed_object_url_serves_bytes() {
    let harness = HarnessBuilder::new().build().await;
    harness
        .objects
        .put_object("owner-1/scan/front.jpg", b"front".to_vec())
        .await
        .unwrap();
    let access = harness
        .objects
        .issue_read_access("owner-1/scan/front.jpg", Duration::from_secs(60))
        .await
        .unwrap();
    let uri = access
        .url
        .strip_prefix("http://127.0.0.1:5810")
        .unwrap()
        .to_string();

    let (status, bytes) = send_raw(&harness, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"front");

    let tampered = uri.replace("sig=", "sig=00");
    let (status, _) = send_raw(&harness, Method::GET, &tampered, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send_raw(
        &harness,
        Method::GET,
        "/objects/owner-1/scan/front.jpg?expires=1&sig=abc",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_signed_url_for_encoded_owner_path() {
    let harness = HarnessBuilder::new().build().await;
    let path = scan_object_path("jane+lumi@example.com", uuid::Uuid::new_v4(), ImageSide::Front);
    harness
        .objects
        .put_object(&path, b"front".to_vec())
        .await
        .unwrap();
    let access = harness
        .objects
        .issue_read_access(&path, Duration::from_secs(60))
        .await
        .unwrap();
    let uri = access
        .url
        .strip_prefix("http://127.0.0.1:5810")
        .unwrap()
        .to_string();

    let (status, bytes) = send_raw(&harness, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"front");
}
