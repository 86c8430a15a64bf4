//! Query handlers: read-only views over stored sessions and turns.

use chrono::{DateTime, Utc};
use roundtable_core::error::CoordinationError;
use roundtable_core::game::{GameCatalog, GameType};
use roundtable_core::record::PauseInfo;
use roundtable_core::state::{SessionState, TurnState};
use roundtable_core::store::{MachineKey, SessionRecordStore};
use serde::Serialize;

/// Read-only view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    /// The session identifier.
    pub session_id: String,
    /// Game type tag.
    pub game_type: GameType,
    /// Lifecycle status.
    pub status: SessionState,
    /// Members, sorted.
    pub participants: Vec<String>,
    /// Completed turns.
    pub current_turn: u32,
    /// The turn being played.
    pub turn_in_play: u32,
    /// Participants not yet heard from this turn.
    pub waiting_for: Vec<String>,
    /// Participants required before play starts.
    pub min_players: usize,
    /// Participant ceiling.
    pub max_players: usize,
    /// Turn SLA.
    pub turn_timeout_hours: u32,
    /// Per-session responses needed per turn, when set.
    pub min_players_per_turn: Option<usize>,
    /// Pause metadata while paused.
    pub pause: Option<PauseInfo>,
    /// Who last resumed the session.
    pub resumed_by: Option<String>,
    /// Latest activity.
    pub last_activity_at: DateTime<Utc>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Record version.
    pub version: i64,
}

/// One participant's stored response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseView {
    /// Who responded.
    pub participant: String,
    /// When.
    pub submitted_at: DateTime<Utc>,
    /// What they said.
    pub content: serde_json::Value,
}

/// Read-only view of one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnSummary {
    /// The owning session.
    pub session_id: String,
    /// The turn number.
    pub turn_number: u32,
    /// The turn's state.
    pub state: TurnState,
    /// Members who responded.
    pub responded: Vec<String>,
    /// Members still awaited. Empty once the turn is completed.
    pub awaited: Vec<String>,
    /// Stored responses, oldest first.
    pub responses: Vec<ResponseView>,
}

/// Retrieves a session summary.
///
/// # Errors
///
/// Returns `CoordinationError::SessionNotFound` if the session does not exist.
pub async fn get_session_summary(
    session_id: &str,
    store: &dyn SessionRecordStore,
    catalog: &GameCatalog,
) -> Result<SessionSummary, CoordinationError> {
    let session = store
        .get_session(session_id)
        .await?
        .ok_or_else(|| CoordinationError::SessionNotFound(session_id.to_owned()))?;
    let rules = catalog.rules_for(&session.game_type);
    Ok(SessionSummary {
        turn_in_play: session.turn_in_play(),
        participants: session.participants.iter().cloned().collect(),
        waiting_for: session.waiting_for.iter().cloned().collect(),
        min_players: rules.min_players,
        max_players: rules.max_players,
        turn_timeout_hours: rules.turn_timeout_hours,
        session_id: session.id,
        game_type: session.game_type,
        status: session.status,
        current_turn: session.current_turn,
        min_players_per_turn: session.min_players_per_turn,
        pause: session.pause,
        resumed_by: session.resumed_by,
        last_activity_at: session.last_activity_at,
        created_at: session.created_at,
        version: session.version,
    })
}

/// Retrieves a turn summary. Turns up to the one in play exist; a past turn
/// with no snapshot is reported as completed.
///
/// # Errors
///
/// Returns `CoordinationError::SessionNotFound` if the session does not exist
/// and `CoordinationError::TurnNotFound` for turn 0 or a turn beyond the one
/// in play.
pub async fn get_turn_summary(
    session_id: &str,
    turn_number: u32,
    store: &dyn SessionRecordStore,
) -> Result<TurnSummary, CoordinationError> {
    let session = store
        .get_session(session_id)
        .await?
        .ok_or_else(|| CoordinationError::SessionNotFound(session_id.to_owned()))?;
    if turn_number == 0 || turn_number > session.turn_in_play() {
        return Err(CoordinationError::TurnNotFound {
            session_id: session.id,
            turn_number,
        });
    }

    let snapshot = store
        .load_machine_state(&MachineKey::Turn(session.id.clone(), turn_number))
        .await?;
    let state = match snapshot {
        Some(snapshot) => snapshot.current_state.parse().map_err(|e: String| {
            CoordinationError::StoreUnavailable(format!("corrupt turn snapshot: {e}"))
        })?,
        None if turn_number <= session.current_turn => TurnState::Completed,
        None => TurnState::WaitingForPlayers,
    };

    let responses = store.get_turn_responses(&session.id, turn_number).await?;
    let responded: Vec<String> = responses
        .iter()
        .map(|r| r.participant.clone())
        .filter(|p| session.is_member(p))
        .collect();
    let awaited = if state == TurnState::Completed {
        Vec::new()
    } else {
        session
            .participants
            .iter()
            .filter(|p| !responded.contains(p))
            .cloned()
            .collect()
    };

    Ok(TurnSummary {
        session_id: session.id,
        turn_number,
        state,
        awaited,
        responses: responses
            .into_iter()
            .map(|r| ResponseView {
                participant: r.participant,
                submitted_at: r.submitted_at,
                content: r.content,
            })
            .collect(),
        responded,
    })
}
