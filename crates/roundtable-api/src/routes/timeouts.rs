//! Routes for the timeout scanner.

use axum::extract::{Path, Query, State};
use axum::{
    Json, Router,
    routing::{get, post},
};
use roundtable_core::game::GameType;
use serde::Deserialize;
use tracing::{info, instrument};

use roundtable_coordination::application::timeouts::{
    ScanOptions, ScanReport, SessionHealth, TimeoutCandidate,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /scan.
#[derive(Debug, Default, Deserialize)]
pub struct ScanRequest {
    /// Cap on sessions processed; defaults to the scanner's own cap.
    #[serde(default)]
    pub max_sessions: Option<usize>,
    /// Report candidates without acting on them.
    #[serde(default)]
    pub dry_run: bool,
    /// Restrict the scan to one game type.
    #[serde(default)]
    pub game_type: Option<GameType>,
}

/// Query string for GET /candidates.
#[derive(Debug, Default, Deserialize)]
pub struct CandidatesQuery {
    /// Restrict the listing to one game type.
    pub game_type: Option<GameType>,
}

/// POST /scan
#[instrument(skip_all, fields(dry_run = request.dry_run))]
async fn scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ScanReport>, ApiError> {
    let defaults = ScanOptions::default();
    let options = ScanOptions {
        max_sessions: request.max_sessions.unwrap_or(defaults.max_sessions),
        dry_run: request.dry_run,
        game_type: request.game_type,
    };

    info!(max_sessions = options.max_sessions, "handling timeout scan");

    Ok(Json(state.scanner.scan(&options).await?))
}

/// GET /candidates
#[instrument(skip_all)]
async fn list_candidates(
    State(state): State<AppState>,
    Query(query): Query<CandidatesQuery>,
) -> Result<Json<Vec<TimeoutCandidate>>, ApiError> {
    let candidates = state
        .scanner
        .find_timed_out_sessions(query.game_type.as_ref())
        .await?;
    Ok(Json(candidates))
}

/// GET /sessions/{session_id}
#[instrument(skip_all, fields(session_id = %session_id))]
async fn session_health(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionHealth>, ApiError> {
    Ok(Json(state.scanner.session_health(&session_id).await?))
}

/// Returns the router for the timeout scanner.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/scan", post(scan))
        .route("/candidates", get(list_candidates))
        .route("/sessions/{session_id}", get(session_health))
}
