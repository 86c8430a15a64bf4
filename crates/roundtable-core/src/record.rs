//! Persisted records: sessions and raw turn responses.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::GameType;
use crate::state::SessionState;

/// Why and when a session was paused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseInfo {
    /// Machine-readable reason, e.g. `turn_timeout`.
    pub reason: String,
    /// When the pause took effect.
    pub paused_at: DateTime<Utc>,
}

/// Pause reason recorded when the timeout path pauses a session.
pub const PAUSE_REASON_TURN_TIMEOUT: &str = "turn_timeout";

/// The stored state of one coordination session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque session identifier.
    pub id: String,
    /// Game type tag.
    pub game_type: GameType,
    /// Members of the session.
    pub participants: BTreeSet<String>,
    /// Number of completed turns. The turn in play is `current_turn + 1`.
    pub current_turn: u32,
    /// Lifecycle status.
    pub status: SessionState,
    /// Members who have not responded to the turn in play.
    pub waiting_for: BTreeSet<String>,
    /// Per-session override of responses needed per turn (adventures).
    pub min_players_per_turn: Option<usize>,
    /// Set while the session is paused.
    pub pause: Option<PauseInfo>,
    /// Who last resumed the session.
    pub resumed_by: Option<String>,
    /// When the session was last resumed.
    pub resumed_at: Option<DateTime<Utc>>,
    /// Last coordination activity, compared against the turn SLA.
    pub last_activity_at: DateTime<Utc>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last write time.
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version, bumped by every update.
    pub version: i64,
}

impl SessionRecord {
    /// Builds a fresh `INITIALIZING` record whose only member is the initiator.
    #[must_use]
    pub fn new(
        id: String,
        game_type: GameType,
        initiator: String,
        min_players_per_turn: Option<usize>,
        now: DateTime<Utc>,
    ) -> Self {
        let participants = BTreeSet::from([initiator]);
        Self {
            id,
            game_type,
            waiting_for: participants.clone(),
            participants,
            current_turn: 0,
            status: SessionState::Initializing,
            min_players_per_turn,
            pause: None,
            resumed_by: None,
            resumed_at: None,
            last_activity_at: now,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Whether `participant` belongs to the session.
    #[must_use]
    pub fn is_member(&self, participant: &str) -> bool {
        self.participants.contains(participant)
    }

    /// The turn currently being played.
    #[must_use]
    pub fn turn_in_play(&self) -> u32 {
        self.current_turn + 1
    }

    /// Latest moment anything happened to the session.
    #[must_use]
    pub fn latest_activity(&self) -> DateTime<Utc> {
        self.pause
            .as_ref()
            .map_or(self.last_activity_at, |p| p.paused_at.max(self.last_activity_at))
    }

    /// Store key used in conflict reports.
    #[must_use]
    pub fn key(&self) -> String {
        session_key(&self.id)
    }
}

/// Store key of a session record.
#[must_use]
pub fn session_key(session_id: &str) -> String {
    format!("sessions/{session_id}")
}

/// A partial update applied to a session record under a version check.
///
/// Fields left as `None` are not touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUpdate {
    /// Write timestamp.
    pub updated_at: DateTime<Utc>,
    /// New lifecycle status.
    pub status: Option<SessionState>,
    /// New completed-turn count.
    pub current_turn: Option<u32>,
    /// Replacement member set.
    pub participants: Option<BTreeSet<String>>,
    /// Replacement waiting-for set.
    pub waiting_for: Option<BTreeSet<String>>,
    /// `Some(None)` clears the pause metadata.
    pub pause: Option<Option<PauseInfo>>,
    /// Resume actor and time.
    pub resumed: Option<(String, DateTime<Utc>)>,
    /// New last-activity timestamp.
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl SessionUpdate {
    /// An empty update stamped with `now`.
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            updated_at: now,
            status: None,
            current_turn: None,
            participants: None,
            waiting_for: None,
            pause: None,
            resumed: None,
            last_activity_at: None,
        }
    }

    /// Marks the update as participant or coordinator activity.
    #[must_use]
    pub fn touch(mut self) -> Self {
        self.last_activity_at = Some(self.updated_at);
        self
    }

    /// Sets the lifecycle status.
    #[must_use]
    pub fn status(mut self, status: SessionState) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the completed-turn count.
    #[must_use]
    pub fn current_turn(mut self, turn: u32) -> Self {
        self.current_turn = Some(turn);
        self
    }

    /// Replaces the member set.
    #[must_use]
    pub fn participants(mut self, participants: BTreeSet<String>) -> Self {
        self.participants = Some(participants);
        self
    }

    /// Replaces the waiting-for set.
    #[must_use]
    pub fn waiting_for(mut self, waiting_for: BTreeSet<String>) -> Self {
        self.waiting_for = Some(waiting_for);
        self
    }

    /// Sets or clears the pause metadata.
    #[must_use]
    pub fn pause(mut self, pause: Option<PauseInfo>) -> Self {
        self.pause = Some(pause);
        self
    }

    /// Records who resumed the session.
    #[must_use]
    pub fn resumed_by(mut self, actor: String) -> Self {
        self.resumed = Some((actor, self.updated_at));
        self
    }

    /// Applies the update in place and bumps the version.
    pub fn apply(&self, record: &mut SessionRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(turn) = self.current_turn {
            record.current_turn = turn;
        }
        if let Some(participants) = &self.participants {
            record.participants.clone_from(participants);
        }
        if let Some(waiting_for) = &self.waiting_for {
            record.waiting_for.clone_from(waiting_for);
        }
        if let Some(pause) = &self.pause {
            record.pause.clone_from(pause);
        }
        if let Some((actor, at)) = &self.resumed {
            record.resumed_by = Some(actor.clone());
            record.resumed_at = Some(*at);
        }
        if let Some(at) = self.last_activity_at {
            record.last_activity_at = at;
        }
        record.updated_at = self.updated_at;
        record.version += 1;
    }
}

/// One participant's raw submission for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
    /// Owning session.
    pub session_id: String,
    /// Turn the response belongs to.
    pub turn_number: u32,
    /// Submitting participant.
    pub participant: String,
    /// Opaque content, interpreted only by downstream collaborators.
    pub content: serde_json::Value,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
}
