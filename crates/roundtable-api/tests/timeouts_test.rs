//! Integration tests for the timeout scanner routes.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use chrono::TimeDelta;
use roundtable_test_support::InMemorySessionStore;
use serde_json::json;

/// An active exchange where only alice has answered turn 1.
async fn half_answered_exchange() -> Arc<InMemorySessionStore> {
    let store = common::new_store();
    let app = common::build_test_app(store.clone());
    common::post_json(
        app.clone(),
        "/api/v1/sessions",
        &json!({ "game_type": "exchange", "initiator": "alice" }),
    )
    .await;
    common::post_json(
        app.clone(),
        "/api/v1/sessions/S1/participants",
        &json!({ "participant": "bob" }),
    )
    .await;
    let (status, _) = common::post_json(
        app,
        "/api/v1/sessions/S1/responses",
        &json!({ "participant": "alice", "content": "waiting on you" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    store
}

#[tokio::test]
async fn test_scan_pauses_overdue_exchange_and_flags_reminder() {
    // Arrange
    let store = half_answered_exchange().await;
    let later = common::fixed_now() + TimeDelta::hours(73);
    let app = common::build_test_app_at(store.clone(), later);

    // Act
    let (status, json) = common::post_json(app, "/api/v1/timeouts/scan", &json!({})).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["dry_run"], false);
    assert_eq!(json["candidates"].as_array().unwrap().len(), 1);
    assert_eq!(json["report"]["processed"], 1);
    assert_eq!(json["report"]["paused"], 1);
    assert_eq!(json["report"]["reminders_needed"], json!(["S1"]));
    assert_eq!(store.session("S1").unwrap().status.as_str(), "paused");
}

#[tokio::test]
async fn test_dry_run_scan_reports_without_acting() {
    let store = half_answered_exchange().await;
    let later = common::fixed_now() + TimeDelta::hours(73);
    let app = common::build_test_app_at(store.clone(), later);

    let (status, json) =
        common::post_json(app, "/api/v1/timeouts/scan", &json!({ "dry_run": true })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["candidates"][0]["session_id"], "S1");
    assert!(json["report"].is_null());
    assert_eq!(store.session("S1").unwrap().status.as_str(), "active");
}

#[tokio::test]
async fn test_sessions_within_sla_are_not_candidates() {
    let store = half_answered_exchange().await;
    let app = common::build_test_app_at(store, common::fixed_now() + TimeDelta::hours(71));

    let (status, json) = common::get_json(app, "/api/v1/timeouts/candidates").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([]));
}

#[tokio::test]
async fn test_candidates_can_be_filtered_by_game_type() {
    let store = half_answered_exchange().await;
    let app = common::build_test_app_at(store, common::fixed_now() + TimeDelta::hours(80));

    let (_, exchanges) = common::get_json(
        app.clone(),
        "/api/v1/timeouts/candidates?game_type=exchange",
    )
    .await;
    let (_, adventures) =
        common::get_json(app, "/api/v1/timeouts/candidates?game_type=adventure").await;

    assert_eq!(exchanges[0]["session_id"], "S1");
    assert_eq!(exchanges[0]["idle_hours"], 80);
    assert_eq!(adventures, json!([]));
}

#[tokio::test]
async fn test_session_health_reports_deadline() {
    let store = half_answered_exchange().await;
    let fresh = common::build_test_app(store.clone());
    let overdue = common::build_test_app_at(store, common::fixed_now() + TimeDelta::hours(73));

    let (status, healthy) = common::get_json(fresh, "/api/v1/timeouts/sessions/S1").await;
    let (_, late) = common::get_json(overdue, "/api/v1/timeouts/sessions/S1").await;
    let (missing_status, _) = common::get_json(
        common::build_test_app(common::new_store()),
        "/api/v1/timeouts/sessions/S9",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(healthy["needs_attention"], false);
    assert_eq!(healthy["waiting_for"], json!(["bob"]));
    assert_eq!(late["needs_attention"], true);
    assert_eq!(missing_status, StatusCode::NOT_FOUND);
}
