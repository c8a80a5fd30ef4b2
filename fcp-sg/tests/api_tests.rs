//! Listener tests for fcp-sg

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use fcp_common::transport::inbox;
use fcp_sg::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn valid_session() -> Value {
    json!({
        "uuid": 1,
        "label": "electrical",
        "mean_current": 12.0,
        "mean_voltage": 230.0,
        "mean_temperature": 40.0,
        "mean_external_temperature": 21.0,
        "mean_external_humidity": 48.0,
        "mean_occupancy": 2.0
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let (sender, _receiver) = inbox();
    let app = build_router(AppState::new(sender));
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["module"], "fcp-sg");
}

#[tokio::test]
async fn test_valid_session_is_queued() {
    let (sender, mut receiver) = inbox();
    let app = build_router(AppState::new(sender));
    let response = app.oneshot(post_json("/prepared_session", &valid_session())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let queued = receiver.try_recv().unwrap();
    assert_eq!(queued.mean_voltage, 230.0);
}

#[tokio::test]
async fn test_malformed_session_is_rejected_and_not_queued() {
    let (sender, mut receiver) = inbox();
    let app = build_router(AppState::new(sender));
    let mut body = valid_session();
    body.as_object_mut().unwrap().remove("label");

    let response = app.oneshot(post_json("/prepared_session", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = extract_json(response.into_body()).await;
    assert!(error["error"].as_str().unwrap().contains("label"));
    assert!(receiver.try_recv().is_none());
}

#[tokio::test]
async fn test_stopped_loop_yields_unavailable() {
    let (sender, receiver) = inbox();
    drop(receiver);
    let app = build_router(AppState::new(sender));
    let response = app.oneshot(post_json("/prepared_session", &valid_session())).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
