// tests/api_http.rs
//
// HTTP-level tests for the public Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

use std::sync::Arc;

use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use news_alert_relay::api::{create_router, AppState};
use news_alert_relay::broadcast::Registry;
use news_alert_relay::event::{Category, Event};
use news_alert_relay::history::History;

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

fn test_state() -> AppState {
    let history = Arc::new(History::with_capacity(10));
    let registry = Arc::new(Registry::new(history.clone()));
    AppState { registry, history }
}

fn test_router(state: AppState) -> Router {
    create_router(state)
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let app = test_router(test_state());

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK, "health should be 200");

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let body = String::from_utf8(bytes).expect("utf8");
    assert_eq!(body.trim(), "ok");
}

#[tokio::test]
async fn api_debug_history_returns_wire_shaped_events() {
    let state = test_state();
    state.history.insert(&Event {
        headline: "Acme to acquire Beta Corp".into(),
        summary: "Source: example.com".into(),
        tickers: vec!["ACME".into()],
        category: Category::MergerAcquisition,
        url: "https://example.com/a".into(),
        ts: "2025-09-26T19:50:22Z".into(),
        domain: "example.com".into(),
        language: "en".into(),
    });
    let app = test_router(state);

    let req = Request::builder()
        .method("GET")
        .uri("/debug/history")
        .body(Body::empty())
        .expect("build GET /debug/history");

    let resp = app.oneshot(req).await.expect("oneshot /debug/history");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let json: Json = serde_json::from_slice(&bytes).expect("json body");

    let arr = json.as_array().expect("array");
    assert_eq!(arr.len(), 1);
    let obj = arr[0].as_object().expect("object");

    // Exactly the wire fields, tickers as an array, category by display name.
    let mut keys: Vec<_> = obj.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec!["category", "domain", "headline", "language", "summary", "tickers", "ts", "url"]
    );
    assert_eq!(obj["category"], "M&A");
    assert!(obj["tickers"].is_array());
}

#[tokio::test]
async fn api_unknown_route_is_404() {
    let app = test_router(test_state());
    let req = Request::builder()
        .method("GET")
        .uri("/nope")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
