//! HTTP-level tests for the assistant router over the in-memory store.
//!
//! Run with: cargo test --features server --test api_routes

#![cfg(feature = "server")]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use ops_assistant::api::{create_assistant_router, ApiState};
use ops_assistant::assistant::{AssistantPipeline, InMemoryDataStore, StaticPermissionProvider};
use ops_assistant::config::AssistantConfig;

// ── Test app builder ───────────────────────────────────────────

fn build_test_app() -> (Arc<InMemoryDataStore>, axum::Router) {
    let store = Arc::new(InMemoryDataStore::seeded());
    let pipeline = AssistantPipeline::from_config(store.clone(), &AssistantConfig::default())
        .expect("builtin rules compile");
    let state = ApiState::new(Arc::new(pipeline), Arc::new(StaticPermissionProvider::new()));
    (store, create_assistant_router(state))
}

fn query_request(text: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/assistant/query")
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder
        .body(Body::from(serde_json::json!({ "text": text }).to_string()))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(
        |_| serde_json::json!({ "raw": String::from_utf8_lossy(&bytes).to_string() }),
    )
}

// ── Tests ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let (_store, app) = build_test_app();
    let resp = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["intent_count"], 11);
}

#[tokio::test]
async fn test_intents_listed_in_priority_order() {
    let (_store, app) = build_test_app();
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/assistant/intents")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["intents"][0]["intent"], "greeting");
    assert_eq!(body["intents"][0]["capability"], serde_json::Value::Null);
    assert_eq!(body["intents"][10]["intent"], "search_reports");
}

#[tokio::test]
async fn test_operator_role_can_create_report() {
    let (store, app) = build_test_app();
    let resp = app
        .oneshot(query_request(
            r#"create report "pothole on 5th""#,
            &[("x-caller-id", "dana"), ("x-caller-roles", "operator")],
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["intent"], "create_report");
    assert_eq!(body["action"], "create_report");
    assert_eq!(body["result"]["success"], true);
    assert_eq!(body["result"]["data"]["kind"], "created");
    assert_eq!(body["result"]["data"]["payload"]["created_by"], "dana");
    assert!(body["natural_response"]
        .as_str()
        .is_some_and(|s| s.contains("pothole on 5th")));
    assert_eq!(store.report_count(), 7);
}

#[tokio::test]
async fn test_viewer_is_denied_create() {
    let (store, app) = build_test_app();
    let resp = app
        .oneshot(query_request(
            r#"create report "pothole on 5th""#,
            &[("x-caller-roles", "viewer")],
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["action"], "permission_denied");
    assert_eq!(body["result"]["success"], false);
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn test_direct_permissions_header() {
    let (_store, app) = build_test_app();
    let resp = app
        .oneshot(query_request(
            "show stats",
            &[("x-caller-permissions", "view_stats")],
        ))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["intent"], "stats");
    assert_eq!(body["result"]["data"]["payload"]["total"], 6);
    assert_eq!(body["resolution"], "rule");
}

#[tokio::test]
async fn test_blank_text_is_bad_request() {
    let (store, app) = build_test_app();
    let resp = app.oneshot(query_request("   ", &[])).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert!(body["error"].as_str().is_some());
    assert_eq!(store.call_count(), 0);
}
