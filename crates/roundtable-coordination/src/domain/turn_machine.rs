//! Per-turn machine: who has responded, and whether the round can resolve.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use roundtable_core::error::{CoordinationError, MachineKind};
use roundtable_core::game::QuorumPolicy;
use roundtable_core::record::TurnResponse;
use roundtable_core::state::TurnState;
use roundtable_core::store::{MachineKey, MachineSnapshot};
use serde::{Deserialize, Serialize};

/// Triggers accepted by the turn machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnTrigger {
    /// Live quorum reached.
    StartProcessing,
    /// Round resolved.
    Complete,
    /// SLA elapsed.
    Timeout,
}

impl TurnTrigger {
    /// The trigger's name as reported in errors.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StartProcessing => "start_processing",
            Self::Complete => "complete",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for TurnTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The transition table. `None` means the trigger is undefined in `state`.
#[must_use]
pub fn turn_target(state: TurnState, trigger: TurnTrigger) -> Option<TurnState> {
    use TurnState as S;
    use TurnTrigger as T;

    match (state, trigger) {
        (S::WaitingForPlayers, T::StartProcessing) => Some(S::Processing),
        (S::Processing | S::TimedOut, T::Complete) => Some(S::Completed),
        (S::WaitingForPlayers | S::Processing, T::Timeout) => Some(S::TimedOut),
        _ => None,
    }
}

/// What `add_response` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseEffect {
    /// The participant moved from awaited to responded.
    Recorded,
    /// The participant had already responded; nothing changed.
    Duplicate,
    /// The turn is already completed; nothing changed.
    TurnClosed,
}

/// Lifecycle timestamps persisted with the machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMachineMetadata {
    /// When the turn opened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<DateTime<Utc>>,
    /// When the live quorum was reached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_at: Option<DateTime<Utc>>,
    /// When the turn timed out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timed_out_at: Option<DateTime<Utc>>,
    /// When the turn completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Whether completion came through the post-timeout policy.
    #[serde(default)]
    pub completed_after_timeout: bool,
}

/// The machine of one turn within a session.
#[derive(Debug, Clone)]
pub struct TurnMachine {
    session_id: String,
    turn_number: u32,
    state: TurnState,
    participants: BTreeSet<String>,
    responded: BTreeSet<String>,
    policy: QuorumPolicy,
    metadata: TurnMachineMetadata,
    dirty: bool,
}

impl TurnMachine {
    /// A fresh turn awaiting every participant.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        turn_number: u32,
        participants: BTreeSet<String>,
        policy: QuorumPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            turn_number,
            state: TurnState::WaitingForPlayers,
            participants,
            responded: BTreeSet::new(),
            policy,
            metadata: TurnMachineMetadata {
                opened_at: Some(now),
                ..TurnMachineMetadata::default()
            },
            dirty: true,
        }
    }

    /// Rebuilds a turn from its snapshot and the stored responses.
    ///
    /// Responded is every member with a stored response. A waiting turn whose
    /// stored responses already satisfy the live quorum comes back as
    /// `PROCESSING`.
    ///
    /// # Errors
    ///
    /// Returns `CoordinationError::StoreUnavailable` if the snapshot cannot be
    /// decoded.
    pub fn rehydrate(
        session_id: &str,
        turn_number: u32,
        participants: BTreeSet<String>,
        policy: QuorumPolicy,
        snapshot: Option<&MachineSnapshot>,
        responses: &[TurnResponse],
        now: DateTime<Utc>,
    ) -> Result<Self, CoordinationError> {
        let key = MachineKey::Turn(session_id.to_owned(), turn_number);
        let (state, metadata) = match snapshot {
            Some(snapshot) => {
                let state = snapshot.current_state.parse::<TurnState>().map_err(|e| {
                    CoordinationError::StoreUnavailable(format!("corrupt snapshot {key}: {e}"))
                })?;
                let metadata = serde_json::from_value(snapshot.metadata.clone()).map_err(|e| {
                    CoordinationError::StoreUnavailable(format!("corrupt snapshot {key}: {e}"))
                })?;
                (state, metadata)
            }
            None => (
                TurnState::WaitingForPlayers,
                TurnMachineMetadata {
                    opened_at: Some(now),
                    ..TurnMachineMetadata::default()
                },
            ),
        };

        let responded = responses
            .iter()
            .map(|r| r.participant.clone())
            .filter(|p| participants.contains(p))
            .collect();

        let mut machine = Self {
            session_id: session_id.to_owned(),
            turn_number,
            state,
            participants,
            responded,
            policy,
            metadata,
            dirty: snapshot.is_none(),
        };
        machine.start_processing_if_ready(now);
        Ok(machine)
    }

    /// The owning session.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// This turn's number.
    #[must_use]
    pub fn turn_number(&self) -> u32 {
        self.turn_number
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Members who have responded.
    #[must_use]
    pub fn responded(&self) -> &BTreeSet<String> {
        &self.responded
    }

    /// Members still awaited.
    #[must_use]
    pub fn awaited(&self) -> BTreeSet<String> {
        self.participants
            .difference(&self.responded)
            .cloned()
            .collect()
    }

    /// Collected lifecycle timestamps.
    #[must_use]
    pub fn metadata(&self) -> &TurnMachineMetadata {
        &self.metadata
    }

    /// Whether the machine changed since it was loaded.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether the live quorum holds.
    #[must_use]
    pub fn live_quorum_met(&self) -> bool {
        self.policy
            .live_satisfied(self.responded.len(), self.participants.len())
    }

    /// Whether the post-timeout completion policy holds.
    #[must_use]
    pub fn timeout_quorum_met(&self) -> bool {
        self.policy
            .timeout_satisfied(self.responded.len(), self.participants.len())
    }

    /// The turn may be completed now.
    #[must_use]
    pub fn is_ready_to_complete(&self) -> bool {
        match self.state {
            TurnState::Processing => true,
            TurnState::TimedOut => self.timeout_quorum_met(),
            TurnState::WaitingForPlayers | TurnState::Completed => false,
        }
    }

    /// Records a participant's response and evaluates the live quorum.
    ///
    /// # Errors
    ///
    /// `ParticipantNotMember` if the participant is not in the turn.
    pub fn add_response(
        &mut self,
        participant: &str,
        now: DateTime<Utc>,
    ) -> Result<ResponseEffect, CoordinationError> {
        if !self.participants.contains(participant) {
            return Err(CoordinationError::ParticipantNotMember {
                session_id: self.session_id.clone(),
                participant: participant.to_owned(),
            });
        }
        if self.state == TurnState::Completed {
            return Ok(ResponseEffect::TurnClosed);
        }
        if !self.responded.insert(participant.to_owned()) {
            return Ok(ResponseEffect::Duplicate);
        }
        self.dirty = true;
        self.start_processing_if_ready(now);
        Ok(ResponseEffect::Recorded)
    }

    /// `WAITING_FOR_PLAYERS -> PROCESSING`, guarded on the live quorum.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` from any other state, `GuardRejected` when the
    /// quorum is not met.
    pub fn start_processing(&mut self, now: DateTime<Utc>) -> Result<TurnState, CoordinationError> {
        let target = self.target(TurnTrigger::StartProcessing)?;
        if !self.live_quorum_met() {
            return Err(self.guard_rejected(TurnTrigger::StartProcessing, "live quorum not met"));
        }
        self.metadata.processing_at = Some(now);
        Ok(self.enter(target))
    }

    /// `PROCESSING -> COMPLETED`, or `TIMED_OUT -> COMPLETED` when the
    /// post-timeout policy holds.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` from any other state, `GuardRejected` when a timed
    /// out turn does not meet the post-timeout policy.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<TurnState, CoordinationError> {
        let target = self.target(TurnTrigger::Complete)?;
        let after_timeout = self.state == TurnState::TimedOut;
        if after_timeout && !self.timeout_quorum_met() {
            return Err(self.guard_rejected(
                TurnTrigger::Complete,
                "post-timeout completion policy not met",
            ));
        }
        self.metadata.completed_at = Some(now);
        self.metadata.completed_after_timeout = after_timeout;
        Ok(self.enter(target))
    }

    /// `WAITING_FOR_PLAYERS | PROCESSING -> TIMED_OUT`.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` from any other state.
    pub fn timeout(&mut self, now: DateTime<Utc>) -> Result<TurnState, CoordinationError> {
        let target = self.target(TurnTrigger::Timeout)?;
        self.metadata.timed_out_at = Some(now);
        Ok(self.enter(target))
    }

    /// Serializes the machine for the store.
    #[must_use]
    pub fn snapshot(&self, revision: i64, now: DateTime<Utc>) -> MachineSnapshot {
        MachineSnapshot {
            current_state: self.state.as_str().to_owned(),
            // Plain struct of timestamps; serialization cannot fail.
            metadata: serde_json::to_value(&self.metadata).unwrap_or_default(),
            revision,
            updated_at: now,
        }
    }

    fn start_processing_if_ready(&mut self, now: DateTime<Utc>) {
        if self.state == TurnState::WaitingForPlayers && self.live_quorum_met() {
            self.metadata.processing_at = Some(now);
            self.enter(TurnState::Processing);
        }
    }

    fn target(&self, trigger: TurnTrigger) -> Result<TurnState, CoordinationError> {
        turn_target(self.state, trigger).ok_or_else(|| CoordinationError::InvalidTransition {
            machine: MachineKind::Turn,
            trigger: trigger.as_str(),
            state: self.state.as_str().to_owned(),
        })
    }

    fn guard_rejected(&self, trigger: TurnTrigger, reason: &str) -> CoordinationError {
        CoordinationError::GuardRejected {
            machine: MachineKind::Turn,
            trigger: trigger.as_str(),
            reason: format!(
                "{reason} ({} of {} responded)",
                self.responded.len(),
                self.participants.len()
            ),
        }
    }

    fn enter(&mut self, target: TurnState) -> TurnState {
        self.state = target;
        self.dirty = true;
        target
    }
}
