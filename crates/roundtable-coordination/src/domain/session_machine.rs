//! Lifecycle machine of one session.
//!
//! The machine is an explicit `(state, trigger) -> state` table. The session
//! record's status is authoritative; the persisted snapshot only carries the
//! lifecycle timestamps collected along the way.

use std::fmt;

use chrono::{DateTime, Utc};
use roundtable_core::error::{CoordinationError, MachineKind};
use roundtable_core::record::SessionRecord;
use roundtable_core::state::SessionState;
use roundtable_core::store::{MachineKey, MachineSnapshot};
use serde::{Deserialize, Serialize};

/// Triggers accepted by the session machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTrigger {
    /// Start gathering participants.
    StartWaiting,
    /// Begin playing turns.
    Activate,
    /// Suspend play.
    Pause,
    /// Continue a paused session.
    Resume,
    /// Finish normally.
    Complete,
    /// Give up on a silent session.
    Timeout,
    /// Retire a finished session.
    Archive,
}

impl SessionTrigger {
    /// The trigger's name as reported in errors.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StartWaiting => "start_waiting",
            Self::Activate => "activate",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Complete => "complete",
            Self::Timeout => "timeout",
            Self::Archive => "archive",
        }
    }
}

impl fmt::Display for SessionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The transition table. `None` means the trigger is undefined in `state`.
#[must_use]
pub fn session_target(state: SessionState, trigger: SessionTrigger) -> Option<SessionState> {
    use SessionState as S;
    use SessionTrigger as T;

    match (state, trigger) {
        (S::Initializing, T::StartWaiting) => Some(S::WaitingForPlayers),
        (S::Initializing | S::WaitingForPlayers, T::Activate) | (S::Paused, T::Resume) => {
            Some(S::Active)
        }
        (S::Active, T::Pause) => Some(S::Paused),
        (S::Active | S::Paused, T::Complete) => Some(S::Completed),
        (S::WaitingForPlayers | S::Active | S::Paused, T::Timeout) => Some(S::TimedOut),
        (S::Completed | S::TimedOut, T::Archive) => Some(S::Archived),
        _ => None,
    }
}

/// Lifecycle timestamps persisted with the machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMachineMetadata {
    /// When the session started gathering participants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_since: Option<DateTime<Utc>>,
    /// When the session was (last) activated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
    /// When the session was last paused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,
    /// Why the session was last paused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_reason: Option<String>,
    /// When the session was last resumed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_at: Option<DateTime<Utc>>,
    /// Who last resumed the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_by: Option<String>,
    /// When the session completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// When the session timed out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timed_out_at: Option<DateTime<Utc>>,
    /// When the session was archived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
}

/// The lifecycle machine of one session.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    session_id: String,
    state: SessionState,
    metadata: SessionMachineMetadata,
    dirty: bool,
}

impl SessionMachine {
    /// A machine for a brand-new session, in `INITIALIZING`.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: SessionState::Initializing,
            metadata: SessionMachineMetadata::default(),
            dirty: true,
        }
    }

    /// Rebuilds the machine from the session record and its snapshot.
    ///
    /// # Errors
    ///
    /// Returns `CoordinationError::StoreUnavailable` if the snapshot metadata
    /// cannot be decoded.
    pub fn rehydrate(
        record: &SessionRecord,
        snapshot: Option<&MachineSnapshot>,
    ) -> Result<Self, CoordinationError> {
        let metadata = match snapshot {
            Some(snapshot) => serde_json::from_value(snapshot.metadata.clone()).map_err(|e| {
                CoordinationError::StoreUnavailable(format!(
                    "corrupt snapshot {}: {e}",
                    MachineKey::Session(record.id.clone())
                ))
            })?,
            None => SessionMachineMetadata::default(),
        };
        Ok(Self {
            session_id: record.id.clone(),
            state: record.status,
            metadata,
            dirty: false,
        })
    }

    /// The session this machine belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Collected lifecycle timestamps.
    #[must_use]
    pub fn metadata(&self) -> &SessionMachineMetadata {
        &self.metadata
    }

    /// Whether the machine changed since it was loaded.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether `trigger` has a transition from the current state.
    #[must_use]
    pub fn can_fire(&self, trigger: SessionTrigger) -> bool {
        session_target(self.state, trigger).is_some()
    }

    /// `INITIALIZING -> WAITING_FOR_PLAYERS`.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` from any other state.
    pub fn start_waiting(&mut self, now: DateTime<Utc>) -> Result<SessionState, CoordinationError> {
        let target = self.target(SessionTrigger::StartWaiting)?;
        self.metadata.waiting_since = Some(now);
        Ok(self.enter(target))
    }

    /// `INITIALIZING | WAITING_FOR_PLAYERS -> ACTIVE`, guarded on the game's
    /// minimum participant count.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` from any other state, `GuardRejected` when too few
    /// participants have joined.
    pub fn activate(
        &mut self,
        participant_count: usize,
        min_players: usize,
        now: DateTime<Utc>,
    ) -> Result<SessionState, CoordinationError> {
        let target = self.target(SessionTrigger::Activate)?;
        if participant_count < min_players {
            return Err(guard_rejected(
                SessionTrigger::Activate,
                format!("{participant_count} participant(s) joined, {min_players} required"),
            ));
        }
        self.metadata.activated_at = Some(now);
        Ok(self.enter(target))
    }

    /// `ACTIVE -> PAUSED`.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` from any other state.
    pub fn pause(
        &mut self,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionState, CoordinationError> {
        let target = self.target(SessionTrigger::Pause)?;
        self.metadata.paused_at = Some(now);
        self.metadata.pause_reason = Some(reason.to_owned());
        Ok(self.enter(target))
    }

    /// `PAUSED -> ACTIVE`, guarded on the session still having members.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` from any other state, `GuardRejected` for an empty
    /// session.
    pub fn resume(
        &mut self,
        actor: &str,
        participant_count: usize,
        now: DateTime<Utc>,
    ) -> Result<SessionState, CoordinationError> {
        let target = self.target(SessionTrigger::Resume)?;
        if participant_count == 0 {
            return Err(guard_rejected(
                SessionTrigger::Resume,
                "session has no participants".to_owned(),
            ));
        }
        self.metadata.resumed_at = Some(now);
        self.metadata.resumed_by = Some(actor.to_owned());
        Ok(self.enter(target))
    }

    /// `ACTIVE | PAUSED -> COMPLETED`.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` from any other state.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<SessionState, CoordinationError> {
        let target = self.target(SessionTrigger::Complete)?;
        self.metadata.completed_at = Some(now);
        Ok(self.enter(target))
    }

    /// `WAITING_FOR_PLAYERS | ACTIVE | PAUSED -> TIMED_OUT`.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` from any other state.
    pub fn timeout(&mut self, now: DateTime<Utc>) -> Result<SessionState, CoordinationError> {
        let target = self.target(SessionTrigger::Timeout)?;
        self.metadata.timed_out_at = Some(now);
        Ok(self.enter(target))
    }

    /// `COMPLETED | TIMED_OUT -> ARCHIVED`.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` from any other state.
    pub fn archive(&mut self, now: DateTime<Utc>) -> Result<SessionState, CoordinationError> {
        let target = self.target(SessionTrigger::Archive)?;
        self.metadata.archived_at = Some(now);
        Ok(self.enter(target))
    }

    /// Serializes the machine for the store.
    #[must_use]
    pub fn snapshot(&self, revision: i64, now: DateTime<Utc>) -> MachineSnapshot {
        MachineSnapshot {
            current_state: self.state.as_str().to_owned(),
            // Plain struct of strings and timestamps; serialization cannot fail.
            metadata: serde_json::to_value(&self.metadata).unwrap_or_default(),
            revision,
            updated_at: now,
        }
    }

    fn target(&self, trigger: SessionTrigger) -> Result<SessionState, CoordinationError> {
        session_target(self.state, trigger).ok_or_else(|| CoordinationError::InvalidTransition {
            machine: MachineKind::Session,
            trigger: trigger.as_str(),
            state: self.state.as_str().to_owned(),
        })
    }

    fn enter(&mut self, target: SessionState) -> SessionState {
        self.state = target;
        self.dirty = true;
        target
    }
}

fn guard_rejected(trigger: SessionTrigger, reason: String) -> CoordinationError {
    CoordinationError::GuardRejected {
        machine: MachineKind::Session,
        trigger: trigger.as_str(),
        reason,
    }
}
