//! Session record store abstraction.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoordinationError;
use crate::game::GameType;
use crate::record::{SessionRecord, SessionUpdate, TurnResponse};

/// Address of a persisted machine snapshot.
///
/// Snapshots live in their own namespace so coordination bookkeeping is never
/// mistaken for participant turn content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MachineKey {
    /// The lifecycle machine of a session.
    Session(String),
    /// The machine of one turn within a session.
    Turn(String, u32),
}

impl MachineKey {
    /// The owning session.
    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            Self::Session(id) | Self::Turn(id, _) => id,
        }
    }

    /// The turn number, for turn keys.
    #[must_use]
    pub fn turn_number(&self) -> Option<u32> {
        match self {
            Self::Session(_) => None,
            Self::Turn(_, turn) => Some(*turn),
        }
    }
}

impl fmt::Display for MachineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(id) => write!(f, "sessions/{id}/machine"),
            Self::Turn(id, turn) => write!(f, "sessions/{id}/turns/{turn}/machine"),
        }
    }
}

/// Serialized `{current_state, metadata}` of one machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    /// The machine's state in its persisted string form.
    pub current_state: String,
    /// Machine-specific metadata (lifecycle timestamps and the like).
    pub metadata: serde_json::Value,
    /// Session record version this snapshot was written alongside. Stores
    /// discard saves whose revision is older than the stored one.
    pub revision: i64,
    /// Write time.
    pub updated_at: DateTime<Utc>,
}

/// Persistence contract consumed by the coordination engine.
#[async_trait]
pub trait SessionRecordStore: Send + Sync {
    /// Inserts a new session record.
    ///
    /// # Errors
    ///
    /// `StoreConflict` if a record with the same id exists.
    async fn create_session(&self, record: &SessionRecord) -> Result<(), CoordinationError>;

    /// Loads a session record.
    async fn get_session(&self, session_id: &str)
    -> Result<Option<SessionRecord>, CoordinationError>;

    /// Applies `update` only if the stored version equals `expected_version`,
    /// returning the updated record.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` if the record does not exist, `StoreConflict` if the
    /// version moved on.
    async fn update_session(
        &self,
        session_id: &str,
        expected_version: i64,
        update: &SessionUpdate,
    ) -> Result<SessionRecord, CoordinationError>;

    /// Stores a participant's raw response, replacing an earlier one for the
    /// same `(session, turn, participant)`.
    async fn save_turn_response(&self, response: &TurnResponse) -> Result<(), CoordinationError>;

    /// All participant responses for a turn, oldest first.
    async fn get_turn_responses(
        &self,
        session_id: &str,
        turn_number: u32,
    ) -> Result<Vec<TurnResponse>, CoordinationError>;

    /// Sessions that are not finished (`INITIALIZING`, `WAITING_FOR_PLAYERS`,
    /// `ACTIVE`, `PAUSED`), optionally restricted to one game type.
    async fn list_active_sessions(
        &self,
        game_type: Option<&GameType>,
    ) -> Result<Vec<SessionRecord>, CoordinationError>;

    /// Saves a machine snapshot unless a newer revision is already stored.
    async fn save_machine_state(
        &self,
        key: &MachineKey,
        snapshot: &MachineSnapshot,
    ) -> Result<(), CoordinationError>;

    /// Loads a machine snapshot.
    async fn load_machine_state(
        &self,
        key: &MachineKey,
    ) -> Result<Option<MachineSnapshot>, CoordinationError>;

    /// Round-trips to the backing storage.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` when the storage cannot be reached.
    async fn ping(&self) -> Result<(), CoordinationError>;
}
