//! Integration tests for the session coordination routes.

mod common;

use axum::Router;
use axum::http::StatusCode;
use serde_json::json;

/// Opens an exchange for alice and lets bob join, which activates it.
async fn active_exchange(app: &Router) {
    let (status, json) = common::post_json(
        app.clone(),
        "/api/v1/sessions",
        &json!({ "game_type": "exchange", "initiator": "alice" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["id"], "S1");

    let (status, json) = common::post_json(
        app.clone(),
        "/api/v1/sessions/S1/participants",
        &json!({ "participant": "bob" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["activated"], true);
}

#[tokio::test]
async fn test_open_session_returns_201_waiting_for_players() {
    let app = common::build_test_app(common::new_store());

    let (status, json) = common::post_json(
        app,
        "/api/v1/sessions",
        &json!({ "game_type": "adventure", "initiator": "alice", "min_players_per_turn": 1 }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["id"], "S1");
    assert_eq!(json["status"], "waiting_for_players");
    assert_eq!(json["participants"], json!(["alice"]));
    assert_eq!(json["current_turn"], 0);
}

#[tokio::test]
async fn test_open_session_with_unconfigured_game_type_returns_422() {
    let app = common::build_test_app(common::new_store());

    let (status, json) = common::post_json(
        app,
        "/api/v1/sessions",
        &json!({ "game_type": "chess", "initiator": "alice" }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"], "unsupported_game_type");
}

#[tokio::test]
async fn test_exchange_turn_completes_after_both_responses() {
    // Arrange
    let app = common::build_test_app(common::new_store());
    active_exchange(&app).await;

    // Act
    let (first_status, first) = common::post_json(
        app.clone(),
        "/api/v1/sessions/S1/responses",
        &json!({ "participant": "alice", "content": { "text": "I appreciate you" } }),
    )
    .await;
    let (second_status, second) = common::post_json(
        app.clone(),
        "/api/v1/sessions/S1/responses",
        &json!({ "participant": "bob", "content": { "text": "Likewise" } }),
    )
    .await;

    // Assert
    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(first["turn_complete"], false);
    assert_eq!(first["waiting_for"], json!(["bob"]));
    assert_eq!(first["turn_state"], "waiting_for_players");

    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(second["turn_complete"], true);
    assert_eq!(second["current_turn"], 1);
    assert_eq!(second["next_turn"], 2);
    assert_eq!(second["waiting_for"], json!([]));
    assert_eq!(second["session_state"], "active");
}

#[tokio::test]
async fn test_join_active_session_returns_409_naming_allowed_states() {
    let app = common::build_test_app(common::new_store());
    active_exchange(&app).await;

    let (status, json) = common::post_json(
        app,
        "/api/v1/sessions/S1/participants",
        &json!({ "participant": "carol" }),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "session_not_joinable");
    let message = json["message"].as_str().unwrap();
    assert!(message.contains("active"));
    assert!(message.contains("initializing"));
}

#[tokio::test]
async fn test_response_from_non_member_returns_403() {
    let app = common::build_test_app(common::new_store());
    active_exchange(&app).await;

    let (status, json) = common::post_json(
        app,
        "/api/v1/sessions/S1/responses",
        &json!({ "participant": "mallory", "content": "hello" }),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "participant_not_member");
}

#[tokio::test]
async fn test_response_to_unknown_session_returns_404() {
    let app = common::build_test_app(common::new_store());

    let (status, json) = common::post_json(
        app,
        "/api/v1/sessions/S9/responses",
        &json!({ "participant": "alice", "content": "hello" }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "session_not_found");
}

#[tokio::test]
async fn test_timeout_pauses_exchange_and_resume_reactivates() {
    // Arrange
    let app = common::build_test_app(common::new_store());
    active_exchange(&app).await;
    common::post_json(
        app.clone(),
        "/api/v1/sessions/S1/responses",
        &json!({ "participant": "alice", "content": "still here" }),
    )
    .await;

    // Act
    let (status, timeout) =
        common::post_json(app.clone(), "/api/v1/sessions/S1/timeout", &json!({})).await;
    let (resume_status, resumed) = common::post_json(
        app.clone(),
        "/api/v1/sessions/S1/resume",
        &json!({ "actor": "bob" }),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(timeout["session_id"], "S1");
    assert_eq!(timeout["action"], "paused");
    assert_eq!(timeout["reminder_needed"], true);

    assert_eq!(resume_status, StatusCode::OK);
    assert_eq!(resumed["status"], "active");
    assert_eq!(resumed["resumed_by"], "bob");
    assert!(resumed["pause"].is_null());
}

#[tokio::test]
async fn test_pause_with_default_reason_then_pause_again_returns_409() {
    let app = common::build_test_app(common::new_store());
    active_exchange(&app).await;

    let (status, paused) =
        common::post_json(app.clone(), "/api/v1/sessions/S1/pause", &json!({})).await;
    let (again_status, again) =
        common::post_json(app.clone(), "/api/v1/sessions/S1/pause", &json!({})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(paused["status"], "paused");
    assert_eq!(paused["pause"]["reason"], "manual");
    assert_eq!(again_status, StatusCode::CONFLICT);
    assert_eq!(again["error"], "session_not_pausable");
}

#[tokio::test]
async fn test_complete_then_archive_session() {
    let app = common::build_test_app(common::new_store());
    active_exchange(&app).await;

    let (status, completed) =
        common::post_json(app.clone(), "/api/v1/sessions/S1/complete", &json!({})).await;
    let (archive_status, archived) =
        common::post_json(app.clone(), "/api/v1/sessions/S1/archive", &json!({})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["status"], "completed");
    assert_eq!(archive_status, StatusCode::OK);
    assert_eq!(archived["status"], "archived");
}

#[tokio::test]
async fn test_archive_active_session_returns_409_invalid_transition() {
    let app = common::build_test_app(common::new_store());
    active_exchange(&app).await;

    let (status, json) =
        common::post_json(app, "/api/v1/sessions/S1/archive", &json!({})).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "invalid_transition");
}

#[tokio::test]
async fn test_get_session_and_turn_views() {
    // Arrange
    let app = common::build_test_app(common::new_store());
    active_exchange(&app).await;
    common::post_json(
        app.clone(),
        "/api/v1/sessions/S1/responses",
        &json!({ "participant": "alice", "content": { "text": "hi" } }),
    )
    .await;

    // Act
    let (session_status, session) = common::get_json(app.clone(), "/api/v1/sessions/S1").await;
    let (turn_status, turn) = common::get_json(app.clone(), "/api/v1/sessions/S1/turns/1").await;
    let (missing_status, missing) =
        common::get_json(app.clone(), "/api/v1/sessions/S1/turns/5").await;

    // Assert
    assert_eq!(session_status, StatusCode::OK);
    assert_eq!(session["status"], "active");
    assert_eq!(session["turn_in_play"], 1);
    assert_eq!(session["waiting_for"], json!(["bob"]));
    assert_eq!(session["turn_timeout_hours"], 72);

    assert_eq!(turn_status, StatusCode::OK);
    assert_eq!(turn["state"], "waiting_for_players");
    assert_eq!(turn["responded"], json!(["alice"]));
    assert_eq!(turn["awaited"], json!(["bob"]));
    assert_eq!(turn["responses"][0]["content"]["text"], "hi");

    assert_eq!(missing_status, StatusCode::NOT_FOUND);
    assert_eq!(missing["error"], "turn_not_found");
}
