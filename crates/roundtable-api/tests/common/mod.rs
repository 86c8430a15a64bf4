//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use roundtable_api::state::AppState;
use roundtable_coordination::application::engine::{CoordinationEngine, EngineConfig};
use roundtable_core::clock::Clock;
use roundtable_core::store::SessionRecordStore;
use roundtable_test_support::{FixedClock, InMemorySessionStore, SequenceIds};
use tower::ServiceExt;

/// Fixed timestamp used across all integration tests.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

/// Build the full app router over `store` with a clock frozen at `now`.
pub fn build_test_app_at(store: Arc<dyn SessionRecordStore>, now: DateTime<Utc>) -> Router {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock(now));
    let engine = CoordinationEngine::new(
        store,
        clock,
        Arc::new(SequenceIds::new(["S1", "S2", "S3"])),
        EngineConfig::default(),
    );
    roundtable_api::app(AppState::new(Arc::new(engine)))
}

/// Build the full app router over `store`. Uses the same route structure as
/// `main.rs`.
pub fn build_test_app(store: Arc<dyn SessionRecordStore>) -> Router {
    build_test_app_at(store, fixed_now())
}

/// A fresh in-memory store.
pub fn new_store() -> Arc<InMemorySessionStore> {
    Arc::new(InMemorySessionStore::new())
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
