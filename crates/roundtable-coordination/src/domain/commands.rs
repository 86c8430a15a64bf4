//! Commands accepted by the coordination engine.

use roundtable_core::command::Command;
use roundtable_core::game::GameType;
use roundtable_core::state::SessionState;
use uuid::Uuid;

/// Command to open a new session for its first participant.
#[derive(Debug, Clone)]
pub struct OpenSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Which game the session plays.
    pub game_type: GameType,
    /// The participant whose interaction opened the session.
    pub initiator: String,
    /// Responses needed per turn, adventures only.
    pub min_players_per_turn: Option<usize>,
}

impl Command for OpenSession {
    fn command_type(&self) -> &'static str {
        "coordination.open_session"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn session_id(&self) -> Option<&str> {
        None
    }
}

/// Command to add a participant to a session that is still gathering players.
#[derive(Debug, Clone)]
pub struct AddParticipant {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session to join.
    pub session_id: String,
    /// The joining participant.
    pub participant: String,
}

impl Command for AddParticipant {
    fn command_type(&self) -> &'static str {
        "coordination.add_participant"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn session_id(&self) -> Option<&str> {
        Some(&self.session_id)
    }
}

/// Command to record a participant's response to the turn in play.
#[derive(Debug, Clone)]
pub struct ProcessResponse {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session responded to.
    pub session_id: String,
    /// The responding participant.
    pub participant: String,
    /// Extracted response content, stored verbatim.
    pub content: serde_json::Value,
}

impl Command for ProcessResponse {
    fn command_type(&self) -> &'static str {
        "coordination.process_response"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn session_id(&self) -> Option<&str> {
        Some(&self.session_id)
    }
}

/// Command to apply the timeout path to a session past its SLA.
#[derive(Debug, Clone)]
pub struct HandleTimeout {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session that went quiet.
    pub session_id: String,
    /// The turn the caller saw in play. If the session has moved past it the
    /// call resolves without acting.
    pub expected_turn: Option<u32>,
    /// The status the caller saw alongside `expected_turn`. A session that
    /// changed status since then also resolves without acting.
    pub expected_status: Option<SessionState>,
}

impl Command for HandleTimeout {
    fn command_type(&self) -> &'static str {
        "coordination.handle_timeout"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn session_id(&self) -> Option<&str> {
        Some(&self.session_id)
    }
}

/// Command to pause an active session by hand.
#[derive(Debug, Clone)]
pub struct PauseSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session to pause.
    pub session_id: String,
    /// Machine-readable pause reason.
    pub reason: String,
}

impl Command for PauseSession {
    fn command_type(&self) -> &'static str {
        "coordination.pause_session"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn session_id(&self) -> Option<&str> {
        Some(&self.session_id)
    }
}

/// Command to resume a paused session.
#[derive(Debug, Clone)]
pub struct ResumeSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session to resume.
    pub session_id: String,
    /// Who is resuming it.
    pub actor: String,
}

impl Command for ResumeSession {
    fn command_type(&self) -> &'static str {
        "coordination.resume_session"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn session_id(&self) -> Option<&str> {
        Some(&self.session_id)
    }
}

/// Command to start play in a session that has enough participants.
#[derive(Debug, Clone)]
pub struct ActivateSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session to activate.
    pub session_id: String,
}

impl Command for ActivateSession {
    fn command_type(&self) -> &'static str {
        "coordination.activate_session"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn session_id(&self) -> Option<&str> {
        Some(&self.session_id)
    }
}

/// Command to finish a session normally.
#[derive(Debug, Clone)]
pub struct CompleteSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session to complete.
    pub session_id: String,
}

impl Command for CompleteSession {
    fn command_type(&self) -> &'static str {
        "coordination.complete_session"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn session_id(&self) -> Option<&str> {
        Some(&self.session_id)
    }
}

/// Command to retire a completed or timed-out session.
#[derive(Debug, Clone)]
pub struct ArchiveSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session to archive.
    pub session_id: String,
}

impl Command for ArchiveSession {
    fn command_type(&self) -> &'static str {
        "coordination.archive_session"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn session_id(&self) -> Option<&str> {
        Some(&self.session_id)
    }
}
