//! Coordination error taxonomy.

use std::fmt;

use thiserror::Error;

use crate::state::SessionState;

/// Which state machine rejected a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineKind {
    /// The per-session lifecycle machine.
    Session,
    /// The per-turn machine.
    Turn,
}

impl fmt::Display for MachineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => f.write_str("session"),
            Self::Turn => f.write_str("turn"),
        }
    }
}

/// Top-level error type for coordination operations.
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// No session record exists for the identifier.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The session has no such turn yet.
    #[error("session {session_id} has no turn {turn_number}")]
    TurnNotFound {
        /// The session that was addressed.
        session_id: String,
        /// The requested turn.
        turn_number: u32,
    },

    /// The participant is not part of the session.
    #[error("participant {participant} is not a member of session {session_id}")]
    ParticipantNotMember {
        /// The session that was addressed.
        session_id: String,
        /// The rejected participant.
        participant: String,
    },

    /// The participant already belongs to the session.
    #[error("participant {participant} already belongs to session {session_id}")]
    ParticipantAlreadyPresent {
        /// The session that was addressed.
        session_id: String,
        /// The duplicate participant.
        participant: String,
    },

    /// The session already holds the game's maximum number of participants.
    #[error("session {session_id} is full (max {max_players} participants)")]
    SessionFull {
        /// The session that was addressed.
        session_id: String,
        /// The game type's participant ceiling.
        max_players: usize,
    },

    /// Participants can no longer be added in the session's current state.
    #[error(
        "session {session_id} cannot accept participants while {status}; allowed statuses: {}",
        join_states(allowed)
    )]
    SessionNotJoinable {
        /// The session that was addressed.
        session_id: String,
        /// The disallowed current status.
        status: SessionState,
        /// Statuses in which joining is permitted.
        allowed: Vec<SessionState>,
    },

    /// The session is finished and takes no more responses.
    #[error("session {session_id} no longer accepts responses (status {status})")]
    SessionNotAcceptingResponses {
        /// The session that was addressed.
        session_id: String,
        /// The session's current status.
        status: SessionState,
    },

    /// The session cannot be paused from its current state.
    #[error("session {session_id} cannot be paused while {status}")]
    SessionNotPausable {
        /// The session that was addressed.
        session_id: String,
        /// The session's current status.
        status: SessionState,
    },

    /// The session cannot be resumed from its current state.
    #[error("session {session_id} cannot be resumed while {status}")]
    SessionNotResumable {
        /// The session that was addressed.
        session_id: String,
        /// The session's current status.
        status: SessionState,
    },

    /// The game type has no entry in the rules table.
    #[error("unsupported game type: {0}")]
    UnsupportedGameType(String),

    /// A trigger was fired from a state that has no such transition.
    #[error("invalid {machine} transition: cannot {trigger} while {state}")]
    InvalidTransition {
        /// The machine that rejected the trigger.
        machine: MachineKind,
        /// The attempted trigger.
        trigger: &'static str,
        /// The machine's current state.
        state: String,
    },

    /// The transition exists but its guard did not hold.
    #[error("{machine} guard rejected {trigger}: {reason}")]
    GuardRejected {
        /// The machine that evaluated the guard.
        machine: MachineKind,
        /// The attempted trigger.
        trigger: &'static str,
        /// Why the guard failed.
        reason: String,
    },

    /// Optimistic concurrency conflict on a store record.
    #[error("store conflict on {key}: expected version {expected}, found {actual:?}")]
    StoreConflict {
        /// The record that had the conflict.
        key: String,
        /// The version the writer read.
        expected: i64,
        /// The version found in the store, when known.
        actual: Option<i64>,
    },

    /// Transient infrastructure failure.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl CoordinationError {
    /// Whether the engine should re-read and retry after this error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::StoreConflict { .. })
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "session_not_found",
            Self::TurnNotFound { .. } => "turn_not_found",
            Self::ParticipantNotMember { .. } => "participant_not_member",
            Self::ParticipantAlreadyPresent { .. } => "participant_already_present",
            Self::SessionFull { .. } => "session_full",
            Self::SessionNotJoinable { .. } => "session_not_joinable",
            Self::SessionNotAcceptingResponses { .. } => "session_not_accepting_responses",
            Self::SessionNotPausable { .. } => "session_not_pausable",
            Self::SessionNotResumable { .. } => "session_not_resumable",
            Self::UnsupportedGameType(_) => "unsupported_game_type",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::GuardRejected { .. } => "guard_rejected",
            Self::StoreConflict { .. } => "store_conflict",
            Self::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

fn join_states(states: &[SessionState]) -> String {
    states
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
