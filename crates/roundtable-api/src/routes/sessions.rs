//! Routes for session coordination: lifecycle commands, responses and views.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{
    Json, Router,
    routing::{get, post},
};
use roundtable_core::game::GameType;
use roundtable_core::record::SessionRecord;
use roundtable_core::state::SessionState;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use roundtable_coordination::application::engine::{JoinOutcome, ResponseOutcome, TimeoutOutcome};
use roundtable_coordination::application::query_handlers::{self, SessionSummary, TurnSummary};
use roundtable_coordination::domain::commands;

use crate::error::ApiError;
use crate::state::AppState;

/// Pause reason recorded when a caller pauses without giving one.
const MANUAL_PAUSE_REASON: &str = "manual";

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    /// Game type tag.
    pub game_type: GameType,
    /// The participant opening the session.
    pub initiator: String,
    /// Responses needed per turn, adventures only.
    #[serde(default)]
    pub min_players_per_turn: Option<usize>,
}

/// Request body for POST /{session_id}/participants.
#[derive(Debug, Deserialize)]
pub struct AddParticipantRequest {
    /// The joining participant.
    pub participant: String,
}

/// Request body for POST /{session_id}/responses.
#[derive(Debug, Deserialize)]
pub struct SubmitResponseRequest {
    /// The responding participant.
    pub participant: String,
    /// Response content, stored verbatim.
    pub content: serde_json::Value,
}

/// Request body for POST /{session_id}/timeout.
#[derive(Debug, Default, Deserialize)]
pub struct TimeoutRequest {
    /// The turn the caller saw in play.
    #[serde(default)]
    pub expected_turn: Option<u32>,
    /// The status the caller saw with that turn.
    #[serde(default)]
    pub expected_status: Option<SessionState>,
}

/// Request body for POST /{session_id}/pause.
#[derive(Debug, Deserialize)]
pub struct PauseRequest {
    /// Why the session is paused.
    #[serde(default = "default_pause_reason")]
    pub reason: String,
}

fn default_pause_reason() -> String {
    MANUAL_PAUSE_REASON.to_owned()
}

/// Request body for POST /{session_id}/resume.
#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    /// Who resumes the session.
    pub actor: String,
}

/// POST /
#[instrument(skip_all, fields(game_type = %request.game_type))]
async fn open_session(
    State(state): State<AppState>,
    Json(request): Json<OpenSessionRequest>,
) -> Result<(StatusCode, Json<SessionRecord>), ApiError> {
    let command = commands::OpenSession {
        correlation_id: Uuid::new_v4(),
        game_type: request.game_type,
        initiator: request.initiator,
        min_players_per_turn: request.min_players_per_turn,
    };

    info!(correlation_id = %command.correlation_id, "handling open_session command");

    let record = state.engine.open_session(&command).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// POST /{session_id}/participants
#[instrument(skip_all, fields(session_id = %session_id))]
async fn add_participant(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<AddParticipantRequest>,
) -> Result<Json<JoinOutcome>, ApiError> {
    let command = commands::AddParticipant {
        correlation_id: Uuid::new_v4(),
        session_id,
        participant: request.participant,
    };

    info!(correlation_id = %command.correlation_id, "handling add_participant command");

    Ok(Json(state.engine.add_participant(&command).await?))
}

/// POST /{session_id}/responses
#[instrument(skip_all, fields(session_id = %session_id))]
async fn submit_response(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<SubmitResponseRequest>,
) -> Result<Json<ResponseOutcome>, ApiError> {
    let command = commands::ProcessResponse {
        correlation_id: Uuid::new_v4(),
        session_id,
        participant: request.participant,
        content: request.content,
    };

    info!(correlation_id = %command.correlation_id, "handling process_response command");

    Ok(Json(state.engine.process_response(&command).await?))
}

/// POST /{session_id}/timeout
#[instrument(skip_all, fields(session_id = %session_id))]
async fn handle_timeout(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<TimeoutRequest>,
) -> Result<Json<TimeoutOutcome>, ApiError> {
    let command = commands::HandleTimeout {
        correlation_id: Uuid::new_v4(),
        session_id,
        expected_turn: request.expected_turn,
        expected_status: request.expected_status,
    };

    info!(correlation_id = %command.correlation_id, "handling handle_timeout command");

    Ok(Json(state.engine.handle_timeout(&command).await?))
}

/// POST /{session_id}/pause
#[instrument(skip_all, fields(session_id = %session_id))]
async fn pause_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<PauseRequest>,
) -> Result<Json<SessionRecord>, ApiError> {
    let command = commands::PauseSession {
        correlation_id: Uuid::new_v4(),
        session_id,
        reason: request.reason,
    };

    info!(correlation_id = %command.correlation_id, "handling pause_session command");

    Ok(Json(state.engine.pause_session(&command).await?))
}

/// POST /{session_id}/resume
#[instrument(skip_all, fields(session_id = %session_id))]
async fn resume_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ResumeRequest>,
) -> Result<Json<SessionRecord>, ApiError> {
    let command = commands::ResumeSession {
        correlation_id: Uuid::new_v4(),
        session_id,
        actor: request.actor,
    };

    info!(correlation_id = %command.correlation_id, "handling resume_session command");

    Ok(Json(state.engine.resume_session(&command).await?))
}

/// POST /{session_id}/activate
#[instrument(skip_all, fields(session_id = %session_id))]
async fn activate_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionRecord>, ApiError> {
    let command = commands::ActivateSession {
        correlation_id: Uuid::new_v4(),
        session_id,
    };

    info!(correlation_id = %command.correlation_id, "handling activate_session command");

    Ok(Json(state.engine.activate_session(&command).await?))
}

/// POST /{session_id}/complete
#[instrument(skip_all, fields(session_id = %session_id))]
async fn complete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionRecord>, ApiError> {
    let command = commands::CompleteSession {
        correlation_id: Uuid::new_v4(),
        session_id,
    };

    info!(correlation_id = %command.correlation_id, "handling complete_session command");

    Ok(Json(state.engine.complete_session(&command).await?))
}

/// POST /{session_id}/archive
#[instrument(skip_all, fields(session_id = %session_id))]
async fn archive_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionRecord>, ApiError> {
    let command = commands::ArchiveSession {
        correlation_id: Uuid::new_v4(),
        session_id,
    };

    info!(correlation_id = %command.correlation_id, "handling archive_session command");

    Ok(Json(state.engine.archive_session(&command).await?))
}

/// GET /{session_id}
#[instrument(skip_all, fields(session_id = %session_id))]
async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSummary>, ApiError> {
    let summary = query_handlers::get_session_summary(
        &session_id,
        state.engine.store(),
        state.engine.catalog(),
    )
    .await?;
    Ok(Json(summary))
}

/// GET /{session_id}/turns/{turn_number}
#[instrument(skip_all, fields(session_id = %session_id, turn_number))]
async fn get_turn(
    State(state): State<AppState>,
    Path((session_id, turn_number)): Path<(String, u32)>,
) -> Result<Json<TurnSummary>, ApiError> {
    let summary =
        query_handlers::get_turn_summary(&session_id, turn_number, state.engine.store()).await?;
    Ok(Json(summary))
}

/// Returns the router for session coordination.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(open_session))
        .route("/{session_id}", get(get_session))
        .route("/{session_id}/participants", post(add_participant))
        .route("/{session_id}/responses", post(submit_response))
        .route("/{session_id}/timeout", post(handle_timeout))
        .route("/{session_id}/pause", post(pause_session))
        .route("/{session_id}/resume", post(resume_session))
        .route("/{session_id}/activate", post(activate_session))
        .route("/{session_id}/complete", post(complete_session))
        .route("/{session_id}/archive", post(archive_session))
        .route("/{session_id}/turns/{turn_number}", get(get_turn))
}
