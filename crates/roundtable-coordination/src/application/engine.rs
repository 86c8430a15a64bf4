//! The coordination engine.
//!
//! Every mutating operation runs the same attempt: read the session record,
//! rehydrate machines in a fresh registry, compute, write the session record
//! conditionally on the version that was read, then persist machine snapshots
//! tagged with the new version. A conflicting write restarts the attempt, up
//! to `max_conflict_retries` times.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use roundtable_core::clock::Clock;
use roundtable_core::command::Command;
use roundtable_core::error::{CoordinationError, MachineKind};
use roundtable_core::game::{GameCatalog, GameType};
use roundtable_core::ids::SessionIdGenerator;
use roundtable_core::record::{
    PAUSE_REASON_TURN_TIMEOUT, PauseInfo, SessionRecord, SessionUpdate, TurnResponse,
};
use roundtable_core::state::{SessionState, TurnState};
use roundtable_core::store::SessionRecordStore;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::application::registry::MachineRegistry;
use crate::domain::commands::{
    ActivateSession, AddParticipant, ArchiveSession, CompleteSession, HandleTimeout, OpenSession,
    PauseSession, ProcessResponse, ResumeSession,
};
use crate::domain::session_machine::SessionMachine;

/// Default bound on conflict retries.
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// Default number of recent turn machines kept cached after an advance.
pub const DEFAULT_KEEP_RECENT_TURNS: u32 = 3;

/// Tunables of the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Game rules and quorum table.
    pub catalog: GameCatalog,
    /// Retries after a conflicting session write before the conflict surfaces.
    pub max_conflict_retries: u32,
    /// Trailing window of turn machines kept by registry cleanup.
    pub keep_recent_turns: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            catalog: GameCatalog::default(),
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            keep_recent_turns: DEFAULT_KEEP_RECENT_TURNS,
        }
    }
}

/// Result of processing one participant response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseOutcome {
    /// The session responded to.
    pub session_id: String,
    /// Whether the turn responded to is complete.
    pub turn_complete: bool,
    /// Completed-turn count after the operation.
    pub current_turn: u32,
    /// The turn now in play, when the session advanced.
    pub next_turn: Option<u32>,
    /// Participants still awaited for the turn responded to.
    pub waiting_for: Vec<String>,
    /// Session status after the operation.
    pub session_state: SessionState,
    /// State of the turn responded to.
    pub turn_state: TurnState,
}

impl ResponseOutcome {
    fn advanced(session: &SessionRecord) -> Self {
        Self {
            session_id: session.id.clone(),
            turn_complete: true,
            current_turn: session.current_turn,
            next_turn: Some(session.turn_in_play()),
            waiting_for: Vec::new(),
            session_state: session.status,
            turn_state: TurnState::Completed,
        }
    }
}

/// Result of adding a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinOutcome {
    /// The session joined.
    pub session_id: String,
    /// Members after the join.
    pub participants: Vec<String>,
    /// Session status after the join.
    pub session_state: SessionState,
    /// Whether this join activated the session.
    pub activated: bool,
    /// Completed-turn count.
    pub current_turn: u32,
    /// Participants awaited for the turn in play.
    pub waiting_for: Vec<String>,
}

/// What the timeout path did to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TimeoutAction {
    /// The session was paused. Exchanges flag that the silent partner needs a
    /// reminder.
    Paused {
        /// Whether a reminder should be sent.
        reminder_needed: bool,
    },
    /// Enough participants had responded; the turn completed and the session
    /// advanced.
    Advanced(ResponseOutcome),
    /// The session had gone silent for a whole SLA window and timed out.
    Expired,
    /// The session had already moved on; nothing was done.
    AlreadyResolved,
}

/// Result of one timeout call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeoutOutcome {
    /// The session handled.
    pub session_id: String,
    /// What happened.
    #[serde(flatten)]
    pub action: TimeoutAction,
}

/// Orchestrates coordination requests against the session record store.
pub struct CoordinationEngine {
    store: Arc<dyn SessionRecordStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn SessionIdGenerator>,
    config: EngineConfig,
}

impl CoordinationEngine {
    /// Creates a new engine.
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionRecordStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn SessionIdGenerator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            config,
        }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &dyn SessionRecordStore {
        self.store.as_ref()
    }

    /// The engine's clock.
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// The rules table in force.
    #[must_use]
    pub fn catalog(&self) -> &GameCatalog {
        &self.config.catalog
    }

    /// Opens a session for its first participant and starts gathering players.
    ///
    /// # Errors
    ///
    /// `UnsupportedGameType` for unconfigured tags, `GuardRejected` for an
    /// out-of-range per-turn minimum, store failures otherwise.
    #[instrument(skip_all, fields(
        command_type = command.command_type(),
        correlation_id = %command.correlation_id,
        game_type = %command.game_type,
    ))]
    pub async fn open_session(
        &self,
        command: &OpenSession,
    ) -> Result<SessionRecord, CoordinationError> {
        if !command.game_type.is_configured() {
            return Err(CoordinationError::UnsupportedGameType(
                command.game_type.tag().to_owned(),
            ));
        }
        let rules = self.config.catalog.rules_for(&command.game_type);
        let min_players_per_turn = match command.game_type {
            GameType::Adventure => command.min_players_per_turn,
            _ => None,
        };
        if let Some(k) = min_players_per_turn
            && (k == 0 || k > rules.max_players)
        {
            return Err(CoordinationError::GuardRejected {
                machine: MachineKind::Session,
                trigger: "open",
                reason: format!(
                    "min_players_per_turn must be between 1 and {}",
                    rules.max_players
                ),
            });
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let now = self.clock.now();
            let mut record = SessionRecord::new(
                self.ids.next_id(),
                command.game_type.clone(),
                command.initiator.clone(),
                min_players_per_turn,
                now,
            );
            let mut machine = SessionMachine::new(record.id.clone());
            record.status = machine.start_waiting(now)?;

            match self.store.create_session(&record).await {
                Ok(()) => {
                    let mut registry =
                        MachineRegistry::new(self.store.as_ref(), &self.config.catalog, now);
                    registry.insert_session_machine(machine);
                    registry.persist(record.version).await?;
                    info!(session_id = %record.id, "session opened");
                    return Ok(record);
                }
                Err(err) if self.should_retry(&err, attempt, "open_session") => {}
                Err(err) => return Err(err),
            }
        }
    }

    /// Adds a participant to a session that is still gathering players,
    /// activating it once the game's minimum is met.
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `SessionNotJoinable`, `ParticipantAlreadyPresent`,
    /// `SessionFull`, or store failures.
    #[instrument(skip_all, fields(
        command_type = command.command_type(),
        correlation_id = %command.correlation_id,
        session_id = %command.session_id,
    ))]
    pub async fn add_participant(
        &self,
        command: &AddParticipant,
    ) -> Result<JoinOutcome, CoordinationError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_add_participant(command).await {
                Err(err) if self.should_retry(&err, attempt, "add_participant") => {}
                other => return other,
            }
        }
    }

    async fn try_add_participant(
        &self,
        command: &AddParticipant,
    ) -> Result<JoinOutcome, CoordinationError> {
        let now = self.clock.now();
        let session = self.load_session(&command.session_id).await?;
        if !session.status.is_joinable() {
            return Err(CoordinationError::SessionNotJoinable {
                session_id: session.id.clone(),
                status: session.status,
                allowed: SessionState::JOINABLE.to_vec(),
            });
        }
        if session.is_member(&command.participant) {
            return Err(CoordinationError::ParticipantAlreadyPresent {
                session_id: session.id.clone(),
                participant: command.participant.clone(),
            });
        }
        let rules = self.config.catalog.rules_for(&session.game_type);
        if session.participants.len() >= rules.max_players {
            return Err(CoordinationError::SessionFull {
                session_id: session.id.clone(),
                max_players: rules.max_players,
            });
        }

        let mut joined = session.clone();
        joined.participants.insert(command.participant.clone());
        let count = joined.participants.len();

        let mut registry = MachineRegistry::new(self.store.as_ref(), &self.config.catalog, now);
        let machine = registry.session_machine(&session).await?;
        let needed = self.players_to_activate(&session);
        let activated = count >= needed;
        let status = if activated {
            machine.activate(count, needed, now)?
        } else if machine.state() == SessionState::Initializing {
            machine.start_waiting(now)?
        } else {
            machine.state()
        };

        let waiting_for = if activated {
            registry
                .turn_machine(&joined, joined.turn_in_play())
                .await?
                .awaited()
        } else {
            joined.participants.clone()
        };

        let update = SessionUpdate::at(now)
            .touch()
            .status(status)
            .participants(joined.participants.clone())
            .waiting_for(waiting_for.clone());
        let updated = self
            .store
            .update_session(&session.id, session.version, &update)
            .await?;
        registry.persist(updated.version).await?;

        info!(
            participant = %command.participant,
            participants = count,
            activated,
            status = %updated.status,
            "participant added"
        );
        Ok(JoinOutcome {
            session_id: updated.id.clone(),
            participants: updated.participants.iter().cloned().collect(),
            session_state: updated.status,
            activated,
            current_turn: updated.current_turn,
            waiting_for: waiting_for.into_iter().collect(),
        })
    }

    /// Records a participant's response to the turn in play, completing the
    /// turn and advancing the session once the quorum is met.
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `ParticipantNotMember`,
    /// `SessionNotAcceptingResponses`, transition errors, `StoreConflict` after
    /// the retry budget, or store failures.
    #[instrument(skip_all, fields(
        command_type = command.command_type(),
        correlation_id = %command.correlation_id,
        session_id = %command.session_id,
        participant = %command.participant,
    ))]
    pub async fn process_response(
        &self,
        command: &ProcessResponse,
    ) -> Result<ResponseOutcome, CoordinationError> {
        let mut recorded_in = None;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_process_response(command, &mut recorded_in).await {
                Err(err) if self.should_retry(&err, attempt, "process_response") => {}
                other => return other,
            }
        }
    }

    async fn try_process_response(
        &self,
        command: &ProcessResponse,
        recorded_in: &mut Option<u32>,
    ) -> Result<ResponseOutcome, CoordinationError> {
        let now = self.clock.now();
        let session = self.load_session(&command.session_id).await?;
        if !session.is_member(&command.participant) {
            return Err(CoordinationError::ParticipantNotMember {
                session_id: session.id.clone(),
                participant: command.participant.clone(),
            });
        }
        if !session.status.accepts_responses() {
            return Err(CoordinationError::SessionNotAcceptingResponses {
                session_id: session.id.clone(),
                status: session.status,
            });
        }
        if let Some(turn) = *recorded_in
            && session.current_turn >= turn
        {
            debug!(turn, "turn already advanced by a concurrent writer");
            return Ok(ResponseOutcome::advanced(&session));
        }

        let turn_number = session.turn_in_play();
        self.store
            .save_turn_response(&TurnResponse {
                session_id: session.id.clone(),
                turn_number,
                participant: command.participant.clone(),
                content: command.content.clone(),
                submitted_at: now,
            })
            .await?;
        *recorded_in = Some(turn_number);

        let mut registry = MachineRegistry::new(self.store.as_ref(), &self.config.catalog, now);
        let turn = registry.turn_machine(&session, turn_number).await?;
        turn.add_response(&command.participant, now)?;
        let completes = turn.state() == TurnState::Completed || turn.is_ready_to_complete();
        if completes && turn.state() != TurnState::Completed {
            turn.complete(now)?;
        }
        let awaited = turn.awaited();
        let turn_state = turn.state();

        let update = if completes {
            self.advance_past_turn(&mut registry, &session, &command.participant, now)
                .await?
        } else if session.status.is_joinable() {
            // Still gathering players: the join-pending view stays in place.
            SessionUpdate::at(now).touch()
        } else {
            SessionUpdate::at(now).touch().waiting_for(awaited.clone())
        };
        let updated = self
            .store
            .update_session(&session.id, session.version, &update)
            .await?;
        registry.persist(updated.version).await?;

        if completes {
            registry.cleanup_completed_turns(
                &session.id,
                updated.current_turn,
                self.config.keep_recent_turns,
            );
            info!(
                turn = turn_number,
                status = %updated.status,
                "turn completed, session advanced"
            );
            return Ok(ResponseOutcome::advanced(&updated));
        }

        debug!(turn = turn_number, awaiting = awaited.len(), "response recorded");
        Ok(ResponseOutcome {
            session_id: updated.id.clone(),
            turn_complete: false,
            current_turn: updated.current_turn,
            next_turn: None,
            waiting_for: awaited.into_iter().collect(),
            session_state: updated.status,
            turn_state,
        })
    }

    /// Applies the timeout path to a session past its SLA.
    ///
    /// Active sessions either pause or, when the post-timeout policy holds,
    /// complete the turn and advance. Sessions already waiting or paused time
    /// out entirely.
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `InvalidTransition` for statuses the timeout path
    /// does not cover, `StoreConflict` after the retry budget, or store
    /// failures.
    #[instrument(skip_all, fields(
        command_type = command.command_type(),
        correlation_id = %command.correlation_id,
        session_id = %command.session_id,
    ))]
    pub async fn handle_timeout(
        &self,
        command: &HandleTimeout,
    ) -> Result<TimeoutOutcome, CoordinationError> {
        let mut observed = command
            .expected_turn
            .map(|turn| (turn, command.expected_status));
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_handle_timeout(command, &mut observed).await {
                Err(err) if self.should_retry(&err, attempt, "handle_timeout") => {}
                other => return other,
            }
        }
    }

    async fn try_handle_timeout(
        &self,
        command: &HandleTimeout,
        observed: &mut Option<(u32, Option<SessionState>)>,
    ) -> Result<TimeoutOutcome, CoordinationError> {
        let now = self.clock.now();
        let session = self.load_session(&command.session_id).await?;
        let resolved = TimeoutOutcome {
            session_id: session.id.clone(),
            action: TimeoutAction::AlreadyResolved,
        };
        match *observed {
            Some((turn, _)) if turn != session.turn_in_play() => {
                debug!(turn, in_play = session.turn_in_play(), "timeout already resolved");
                return Ok(resolved);
            }
            Some((_, Some(status))) if status != session.status => {
                debug!(%status, now_status = %session.status, "timeout already resolved");
                return Ok(resolved);
            }
            _ => *observed = Some((session.turn_in_play(), Some(session.status))),
        }

        let mut registry = MachineRegistry::new(self.store.as_ref(), &self.config.catalog, now);
        let (update, action) = if session.status == SessionState::Active {
            let turn_number = session.turn_in_play();
            let turn = registry.turn_machine(&session, turn_number).await?;
            if turn.state() == TurnState::WaitingForPlayers {
                turn.timeout(now)?;
            }
            let completes = turn.state() == TurnState::Completed || turn.is_ready_to_complete();
            if completes {
                if turn.state() != TurnState::Completed {
                    turn.complete(now)?;
                }
                let update = self
                    .advance_past_turn(&mut registry, &session, "timeout", now)
                    .await?;
                (update, None)
            } else {
                let awaited = turn.awaited();
                registry
                    .session_machine(&session)
                    .await?
                    .pause(PAUSE_REASON_TURN_TIMEOUT, now)?;
                let update = SessionUpdate::at(now)
                    .status(SessionState::Paused)
                    .waiting_for(awaited)
                    .pause(Some(PauseInfo {
                        reason: PAUSE_REASON_TURN_TIMEOUT.to_owned(),
                        paused_at: now,
                    }));
                let reminder_needed = session.game_type == GameType::Exchange;
                (update, Some(TimeoutAction::Paused { reminder_needed }))
            }
        } else {
            let status = registry.session_machine(&session).await?.timeout(now)?;
            (
                SessionUpdate::at(now).status(status),
                Some(TimeoutAction::Expired),
            )
        };

        let updated = self
            .store
            .update_session(&session.id, session.version, &update)
            .await?;
        registry.persist(updated.version).await?;

        let action = match action {
            Some(action) => action,
            None => {
                registry.cleanup_completed_turns(
                    &session.id,
                    updated.current_turn,
                    self.config.keep_recent_turns,
                );
                TimeoutAction::Advanced(ResponseOutcome::advanced(&updated))
            }
        };
        info!(status = %updated.status, ?action, "timeout handled");
        Ok(TimeoutOutcome {
            session_id: updated.id,
            action,
        })
    }

    /// Explicitly activates a session that has enough participants.
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `InvalidTransition` outside
    /// `INITIALIZING | WAITING_FOR_PLAYERS`, `GuardRejected` below the game's
    /// minimum, or store failures.
    #[instrument(skip_all, fields(
        command_type = command.command_type(),
        correlation_id = %command.correlation_id,
        session_id = %command.session_id,
    ))]
    pub async fn activate_session(
        &self,
        command: &ActivateSession,
    ) -> Result<SessionRecord, CoordinationError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_activate_session(command).await {
                Err(err) if self.should_retry(&err, attempt, "activate_session") => {}
                other => return other,
            }
        }
    }

    async fn try_activate_session(
        &self,
        command: &ActivateSession,
    ) -> Result<SessionRecord, CoordinationError> {
        let now = self.clock.now();
        let session = self.load_session(&command.session_id).await?;
        let needed = self.players_to_activate(&session);

        let mut registry = MachineRegistry::new(self.store.as_ref(), &self.config.catalog, now);
        let status = registry.session_machine(&session).await?.activate(
            session.participants.len(),
            needed,
            now,
        )?;
        let awaited = registry
            .turn_machine(&session, session.turn_in_play())
            .await?
            .awaited();

        let update = SessionUpdate::at(now)
            .touch()
            .status(status)
            .waiting_for(awaited);
        let updated = self
            .store
            .update_session(&session.id, session.version, &update)
            .await?;
        registry.persist(updated.version).await?;
        info!("session activated");
        Ok(updated)
    }

    /// Pauses an active session.
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `SessionNotPausable` unless `ACTIVE`, or store
    /// failures.
    #[instrument(skip_all, fields(
        command_type = command.command_type(),
        correlation_id = %command.correlation_id,
        session_id = %command.session_id,
    ))]
    pub async fn pause_session(
        &self,
        command: &PauseSession,
    ) -> Result<SessionRecord, CoordinationError> {
        self.apply_lifecycle(&command.session_id, "pause_session", |session, machine, now| {
            if session.status != SessionState::Active {
                return Err(CoordinationError::SessionNotPausable {
                    session_id: session.id.clone(),
                    status: session.status,
                });
            }
            let status = machine.pause(&command.reason, now)?;
            Ok(SessionUpdate::at(now).status(status).pause(Some(PauseInfo {
                reason: command.reason.clone(),
                paused_at: now,
            })))
        })
        .await
    }

    /// Resumes a paused session, recording who resumed it.
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `SessionNotResumable` unless `PAUSED`, or store
    /// failures.
    #[instrument(skip_all, fields(
        command_type = command.command_type(),
        correlation_id = %command.correlation_id,
        session_id = %command.session_id,
        actor = %command.actor,
    ))]
    pub async fn resume_session(
        &self,
        command: &ResumeSession,
    ) -> Result<SessionRecord, CoordinationError> {
        self.apply_lifecycle(&command.session_id, "resume_session", |session, machine, now| {
            if session.status != SessionState::Paused {
                return Err(CoordinationError::SessionNotResumable {
                    session_id: session.id.clone(),
                    status: session.status,
                });
            }
            let status = machine.resume(&command.actor, session.participants.len(), now)?;
            Ok(SessionUpdate::at(now)
                .touch()
                .status(status)
                .pause(None)
                .resumed_by(command.actor.clone()))
        })
        .await
    }

    /// Finishes a session.
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `InvalidTransition` unless `ACTIVE | PAUSED`, or
    /// store failures.
    #[instrument(skip_all, fields(
        command_type = command.command_type(),
        correlation_id = %command.correlation_id,
        session_id = %command.session_id,
    ))]
    pub async fn complete_session(
        &self,
        command: &CompleteSession,
    ) -> Result<SessionRecord, CoordinationError> {
        self.apply_lifecycle(&command.session_id, "complete_session", |_, machine, now| {
            let status = machine.complete(now)?;
            Ok(SessionUpdate::at(now)
                .status(status)
                .pause(None)
                .waiting_for(BTreeSet::new()))
        })
        .await
    }

    /// Retires a finished session.
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `InvalidTransition` unless `COMPLETED | TIMED_OUT`,
    /// or store failures.
    #[instrument(skip_all, fields(
        command_type = command.command_type(),
        correlation_id = %command.correlation_id,
        session_id = %command.session_id,
    ))]
    pub async fn archive_session(
        &self,
        command: &ArchiveSession,
    ) -> Result<SessionRecord, CoordinationError> {
        self.apply_lifecycle(&command.session_id, "archive_session", |_, machine, now| {
            let status = machine.archive(now)?;
            Ok(SessionUpdate::at(now).status(status))
        })
        .await
    }

    /// Runs a session-machine-only transition under the retry loop.
    async fn apply_lifecycle<F>(
        &self,
        session_id: &str,
        operation: &'static str,
        apply: F,
    ) -> Result<SessionRecord, CoordinationError>
    where
        F: Fn(
                &SessionRecord,
                &mut SessionMachine,
                DateTime<Utc>,
            ) -> Result<SessionUpdate, CoordinationError>
            + Send
            + Sync,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result: Result<SessionRecord, CoordinationError> = async {
                let now = self.clock.now();
                let session = self.load_session(session_id).await?;
                let mut registry =
                    MachineRegistry::new(self.store.as_ref(), &self.config.catalog, now);
                let machine = registry.session_machine(&session).await?;
                let update = apply(&session, machine, now)?;
                let updated = self
                    .store
                    .update_session(session_id, session.version, &update)
                    .await?;
                registry.persist(updated.version).await?;
                Ok(updated)
            }
            .await;

            match result {
                Err(err) if self.should_retry(&err, attempt, operation) => {}
                Ok(updated) => {
                    info!(operation, status = %updated.status, "session lifecycle updated");
                    return Ok(updated);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Builds the update that moves a session past the turn in play, fires
    /// the session transition the advance implies, and opens the next turn.
    async fn advance_past_turn(
        &self,
        registry: &mut MachineRegistry<'_>,
        session: &SessionRecord,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionUpdate, CoordinationError> {
        let needed = self.players_to_activate(session);
        let count = session.participants.len();
        let machine = registry.session_machine(session).await?;

        let mut update = SessionUpdate::at(now)
            .touch()
            .current_turn(session.turn_in_play())
            .waiting_for(session.participants.clone());
        let status = match session.status {
            SessionState::Initializing | SessionState::WaitingForPlayers => {
                machine.activate(count, needed, now)?
            }
            SessionState::Paused => {
                update = update.pause(None).resumed_by(actor.to_owned());
                machine.resume(actor, count, now)?
            }
            SessionState::Active => SessionState::Active,
            status => {
                return Err(CoordinationError::SessionNotAcceptingResponses {
                    session_id: session.id.clone(),
                    status,
                });
            }
        };

        let mut advanced = session.clone();
        advanced.current_turn = session.turn_in_play();
        registry.open_turn(&advanced, advanced.turn_in_play());
        Ok(update.status(status))
    }

    fn players_to_activate(&self, session: &SessionRecord) -> usize {
        self.config
            .catalog
            .players_to_activate(&session.game_type, session.min_players_per_turn)
    }

    async fn load_session(&self, session_id: &str) -> Result<SessionRecord, CoordinationError> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or_else(|| CoordinationError::SessionNotFound(session_id.to_owned()))
    }

    fn should_retry(&self, err: &CoordinationError, attempt: u32, operation: &str) -> bool {
        if err.is_conflict() && attempt <= self.config.max_conflict_retries {
            warn!(operation, attempt, error = %err, "conflicting write, retrying");
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeDelta, TimeZone, Utc};
    use roundtable_core::game::GameRules;
    use roundtable_core::store::MachineKey;
    use roundtable_test_support::{
        FailingSessionStore, InMemorySessionStore, ManualClock, SequenceIds,
    };
    use uuid::Uuid;

    use super::*;

    struct Harness {
        engine: CoordinationEngine,
        store: Arc<InMemorySessionStore>,
        clock: Arc<ManualClock>,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn harness_with(store: InMemorySessionStore, catalog: GameCatalog) -> Harness {
        let store = Arc::new(store);
        let clock = Arc::new(ManualClock::new(start()));
        let engine = CoordinationEngine::new(
            store.clone(),
            clock.clone(),
            Arc::new(SequenceIds::new(["S1", "S2", "S3"])),
            EngineConfig {
                catalog,
                ..EngineConfig::default()
            },
        );
        Harness {
            engine,
            store,
            clock,
        }
    }

    fn harness() -> Harness {
        harness_with(InMemorySessionStore::new(), GameCatalog::default())
    }

    fn three_player_adventures() -> GameCatalog {
        GameCatalog {
            adventure: GameRules {
                min_players: 3,
                max_players: 4,
                turn_timeout_hours: 24,
                min_players_per_turn: 1,
            },
            ..GameCatalog::default()
        }
    }

    async fn open(h: &Harness, game_type: GameType, initiator: &str, k: Option<usize>) -> String {
        h.engine
            .open_session(&OpenSession {
                correlation_id: Uuid::new_v4(),
                game_type,
                initiator: initiator.into(),
                min_players_per_turn: k,
            })
            .await
            .unwrap()
            .id
    }

    async fn join(h: &Harness, session_id: &str, participant: &str) -> JoinOutcome {
        h.engine
            .add_participant(&AddParticipant {
                correlation_id: Uuid::new_v4(),
                session_id: session_id.into(),
                participant: participant.into(),
            })
            .await
            .unwrap()
    }

    fn respond_cmd(session_id: &str, participant: &str) -> ProcessResponse {
        ProcessResponse {
            correlation_id: Uuid::new_v4(),
            session_id: session_id.into(),
            participant: participant.into(),
            content: serde_json::json!({ "text": format!("{participant} acts") }),
        }
    }

    async fn respond(
        h: &Harness,
        session_id: &str,
        participant: &str,
    ) -> Result<ResponseOutcome, CoordinationError> {
        h.engine
            .process_response(&respond_cmd(session_id, participant))
            .await
    }

    async fn time_out(h: &Harness, session_id: &str) -> Result<TimeoutOutcome, CoordinationError> {
        h.engine
            .handle_timeout(&HandleTimeout {
                correlation_id: Uuid::new_v4(),
                session_id: session_id.into(),
                expected_turn: None,
                expected_status: None,
            })
            .await
    }

    async fn exchange(h: &Harness) -> String {
        let id = open(h, GameType::Exchange, "alice", None).await;
        join(h, &id, "bob").await;
        id
    }

    #[tokio::test]
    async fn test_open_session_waits_for_players_with_initiator_only() {
        // Arrange
        let h = harness();

        // Act
        let record = h
            .engine
            .open_session(&OpenSession {
                correlation_id: Uuid::new_v4(),
                game_type: GameType::Exchange,
                initiator: "alice".into(),
                min_players_per_turn: Some(2),
            })
            .await
            .unwrap();

        // Assert
        assert_eq!(record.id, "S1");
        assert_eq!(record.status, SessionState::WaitingForPlayers);
        assert_eq!(record.current_turn, 0);
        assert!(record.is_member("alice"));
        assert_eq!(record.min_players_per_turn, None);
        let snapshot = h.store.machine(&MachineKey::Session("S1".into())).unwrap();
        assert_eq!(snapshot.current_state, "waiting_for_players");
    }

    #[tokio::test]
    async fn test_open_session_rejects_unconfigured_game_type() {
        let h = harness();

        let err = h
            .engine
            .open_session(&OpenSession {
                correlation_id: Uuid::new_v4(),
                game_type: GameType::from("poker"),
                initiator: "alice".into(),
                min_players_per_turn: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CoordinationError::UnsupportedGameType(tag) if tag == "poker"));
    }

    #[tokio::test]
    async fn test_open_session_retries_with_fresh_id_on_collision() {
        // Arrange
        let h = harness();
        let taken = SessionRecord::new(
            "S1".into(),
            GameType::Adventure,
            "someone".into(),
            None,
            start(),
        );
        h.store.insert_session(taken);

        // Act
        let id = open(&h, GameType::Adventure, "alice", None).await;

        // Assert
        assert_eq!(id, "S2");
    }

    #[tokio::test]
    async fn test_second_exchange_partner_activates_session() {
        // Arrange
        let h = harness();
        let id = open(&h, GameType::Exchange, "alice", None).await;

        // Act
        let outcome = join(&h, &id, "bob").await;

        // Assert
        assert!(outcome.activated);
        assert_eq!(outcome.session_state, SessionState::Active);
        assert_eq!(outcome.participants, vec!["alice", "bob"]);
        assert_eq!(outcome.waiting_for, vec!["alice", "bob"]);
        let turn = h.store.machine(&MachineKey::Turn(id, 1)).unwrap();
        assert_eq!(turn.current_state, "waiting_for_players");
    }

    #[tokio::test]
    async fn test_join_below_minimum_keeps_session_waiting() {
        let h = harness_with(InMemorySessionStore::new(), three_player_adventures());
        let id = open(&h, GameType::Adventure, "p1", None).await;

        let outcome = join(&h, &id, "p2").await;

        assert!(!outcome.activated);
        assert_eq!(outcome.session_state, SessionState::WaitingForPlayers);
        assert_eq!(outcome.participants.len(), 2);
    }

    #[tokio::test]
    async fn test_join_active_session_names_current_and_allowed_statuses() {
        // Arrange
        let h = harness();
        let id = exchange(&h).await;

        // Act
        let err = h
            .engine
            .add_participant(&AddParticipant {
                correlation_id: Uuid::new_v4(),
                session_id: id,
                participant: "carol".into(),
            })
            .await
            .unwrap_err();

        // Assert
        match &err {
            CoordinationError::SessionNotJoinable {
                status, allowed, ..
            } => {
                assert_eq!(*status, SessionState::Active);
                assert_eq!(
                    allowed,
                    &vec![SessionState::Initializing, SessionState::WaitingForPlayers]
                );
            }
            other => panic!("expected SessionNotJoinable, got {other:?}"),
        }
        assert!(err.to_string().contains("while active"));
    }

    #[tokio::test]
    async fn test_join_twice_is_rejected() {
        let h = harness_with(InMemorySessionStore::new(), three_player_adventures());
        let id = open(&h, GameType::Adventure, "p1", None).await;

        let err = h
            .engine
            .add_participant(&AddParticipant {
                correlation_id: Uuid::new_v4(),
                session_id: id,
                participant: "p1".into(),
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CoordinationError::ParticipantAlreadyPresent { .. }
        ));
    }

    #[tokio::test]
    async fn test_join_full_session_is_rejected() {
        // Arrange
        let h = harness();
        let mut record = SessionRecord::new(
            "FULL".into(),
            GameType::Adventure,
            "p1".into(),
            None,
            start(),
        );
        record.status = SessionState::WaitingForPlayers;
        record.participants.extend(["p2".to_owned(), "p3".to_owned(), "p4".to_owned()]);
        h.store.insert_session(record);

        // Act
        let err = h
            .engine
            .add_participant(&AddParticipant {
                correlation_id: Uuid::new_v4(),
                session_id: "FULL".into(),
                participant: "p5".into(),
            })
            .await
            .unwrap_err();

        // Assert
        assert!(matches!(
            err,
            CoordinationError::SessionFull { max_players: 4, .. }
        ));
    }

    #[tokio::test]
    async fn test_adventure_turn_completes_when_minimum_responded() {
        // Arrange
        let h = harness();
        let id = open(&h, GameType::Adventure, "p1", Some(2)).await;
        join(&h, &id, "p2").await;

        // Act
        let first = respond(&h, &id, "p1").await.unwrap();
        let second = respond(&h, &id, "p2").await.unwrap();

        // Assert
        assert!(!first.turn_complete);
        assert_eq!(first.turn_state, TurnState::WaitingForPlayers);
        assert_eq!(first.waiting_for, vec!["p2"]);
        assert_eq!(first.current_turn, 0);

        assert!(second.turn_complete);
        assert_eq!(second.turn_state, TurnState::Completed);
        assert_eq!(second.current_turn, 1);
        assert_eq!(second.next_turn, Some(2));
        assert!(second.waiting_for.is_empty());
        assert_eq!(second.session_state, SessionState::Active);

        let session = h.store.session(&id).unwrap();
        assert_eq!(session.current_turn, 1);
        assert_eq!(session.waiting_for.len(), 2);
        let next = h.store.machine(&MachineKey::Turn(id.clone(), 2)).unwrap();
        assert_eq!(next.current_state, "waiting_for_players");
        let done = h.store.machine(&MachineKey::Turn(id, 1)).unwrap();
        assert_eq!(done.current_state, "completed");
    }

    #[tokio::test]
    async fn test_adventure_gathers_per_turn_minimum_before_activating() {
        // Arrange
        let h = harness();
        let id = open(&h, GameType::Adventure, "p1", Some(3)).await;

        // Act
        let second = join(&h, &id, "p2").await;
        let early = h
            .engine
            .activate_session(&ActivateSession {
                correlation_id: Uuid::new_v4(),
                session_id: id.clone(),
            })
            .await;
        let third = join(&h, &id, "p3").await;
        respond(&h, &id, "p1").await.unwrap();
        let partial = respond(&h, &id, "p2").await.unwrap();
        let last = respond(&h, &id, "p3").await.unwrap();

        // Assert
        assert!(!second.activated);
        assert_eq!(second.session_state, SessionState::WaitingForPlayers);
        assert!(matches!(early, Err(CoordinationError::GuardRejected { .. })));
        assert!(third.activated);
        assert_eq!(third.session_state, SessionState::Active);
        assert!(!partial.turn_complete);
        assert_eq!(partial.waiting_for, vec!["p3"]);
        assert!(last.turn_complete);
        assert_eq!(last.current_turn, 1);
    }

    #[tokio::test]
    async fn test_response_before_partner_joins_keeps_waiting_view() {
        let h = harness();
        let id = open(&h, GameType::Exchange, "alice", None).await;

        let outcome = respond(&h, &id, "alice").await.unwrap();

        assert!(!outcome.turn_complete);
        assert_eq!(outcome.session_state, SessionState::WaitingForPlayers);
        let session = h.store.session(&id).unwrap();
        assert_eq!(session.status, SessionState::WaitingForPlayers);
        assert_eq!(session.waiting_for.into_iter().collect::<Vec<_>>(), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_exchange_turn_needs_both_partners() {
        let h = harness();
        let id = exchange(&h).await;

        let first = respond(&h, &id, "alice").await.unwrap();
        let second = respond(&h, &id, "bob").await.unwrap();

        assert!(!first.turn_complete);
        assert_eq!(first.waiting_for, vec!["bob"]);
        assert!(second.turn_complete);
        assert_eq!(second.current_turn, 1);
    }

    #[tokio::test]
    async fn test_duplicate_response_is_idempotent() {
        // Arrange
        let h = harness();
        let id = exchange(&h).await;
        let first = respond(&h, &id, "alice").await.unwrap();

        // Act
        let again = respond(&h, &id, "alice").await.unwrap();

        // Assert
        assert_eq!(again.waiting_for, first.waiting_for);
        assert!(!again.turn_complete);
        let responses = h.store.get_turn_responses(&id, 1).await.unwrap();
        assert_eq!(responses.len(), 1);
    }

    #[tokio::test]
    async fn test_response_from_non_member_is_rejected() {
        let h = harness();
        let id = exchange(&h).await;

        let err = respond(&h, &id, "mallory").await.unwrap_err();

        assert!(matches!(
            err,
            CoordinationError::ParticipantNotMember { participant, .. } if participant == "mallory"
        ));
        assert!(h.store.get_turn_responses(&id, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_response_to_unknown_session_is_not_found() {
        let h = harness();

        let err = respond(&h, "nope", "alice").await.unwrap_err();

        assert!(matches!(err, CoordinationError::SessionNotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_response_to_completed_session_is_rejected() {
        // Arrange
        let h = harness();
        let id = exchange(&h).await;
        h.engine
            .complete_session(&CompleteSession {
                correlation_id: Uuid::new_v4(),
                session_id: id.clone(),
            })
            .await
            .unwrap();

        // Act
        let err = respond(&h, &id, "alice").await.unwrap_err();

        // Assert
        assert!(matches!(
            err,
            CoordinationError::SessionNotAcceptingResponses {
                status: SessionState::Completed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_solo_adventure_response_activates_waiting_session() {
        let h = harness();
        let id = open(&h, GameType::Adventure, "solo", None).await;

        let outcome = respond(&h, &id, "solo").await.unwrap();

        assert!(outcome.turn_complete);
        assert_eq!(outcome.session_state, SessionState::Active);
        assert_eq!(outcome.current_turn, 1);
    }

    #[tokio::test]
    async fn test_exchange_timeout_with_one_response_pauses_and_flags_reminder() {
        // Arrange
        let h = harness();
        let id = exchange(&h).await;
        respond(&h, &id, "alice").await.unwrap();
        h.clock.advance(TimeDelta::hours(73));

        // Act
        let outcome = time_out(&h, &id).await.unwrap();

        // Assert
        assert_eq!(
            outcome.action,
            TimeoutAction::Paused {
                reminder_needed: true
            }
        );
        let session = h.store.session(&id).unwrap();
        assert_eq!(session.status, SessionState::Paused);
        assert_eq!(session.current_turn, 0);
        let pause = session.pause.unwrap();
        assert_eq!(pause.reason, PAUSE_REASON_TURN_TIMEOUT);
        assert_eq!(pause.paused_at, start() + TimeDelta::hours(73));
        let turn = h.store.machine(&MachineKey::Turn(id, 1)).unwrap();
        assert_eq!(turn.current_state, "timed_out");
    }

    #[tokio::test]
    async fn test_adventure_timeout_with_half_responded_advances() {
        // Arrange
        let h = harness_with(InMemorySessionStore::new(), three_player_adventures());
        let id = open(&h, GameType::Adventure, "p1", Some(3)).await;
        join(&h, &id, "p2").await;
        let joined = join(&h, &id, "p3").await;
        respond(&h, &id, "p1").await.unwrap();
        respond(&h, &id, "p2").await.unwrap();
        h.clock.advance(TimeDelta::hours(25));

        // Act
        let outcome = time_out(&h, &id).await.unwrap();

        // Assert
        assert!(joined.activated);
        match outcome.action {
            TimeoutAction::Advanced(advanced) => {
                assert_eq!(advanced.current_turn, 1);
                assert_eq!(advanced.next_turn, Some(2));
                assert_eq!(advanced.session_state, SessionState::Active);
            }
            other => panic!("expected Advanced, got {other:?}"),
        }
        let session = h.store.session(&id).unwrap();
        assert_eq!(session.current_turn, 1);
        assert_eq!(session.status, SessionState::Active);
    }

    #[tokio::test]
    async fn test_adventure_timeout_with_too_few_responses_pauses_without_reminder() {
        let h = harness_with(InMemorySessionStore::new(), three_player_adventures());
        let id = open(&h, GameType::Adventure, "p1", Some(3)).await;
        join(&h, &id, "p2").await;
        join(&h, &id, "p3").await;
        h.clock.advance(TimeDelta::hours(25));

        let outcome = time_out(&h, &id).await.unwrap();

        assert_eq!(
            outcome.action,
            TimeoutAction::Paused {
                reminder_needed: false
            }
        );
    }

    #[tokio::test]
    async fn test_late_response_completes_timed_out_turn_and_resumes() {
        // Arrange
        let h = harness();
        let id = exchange(&h).await;
        respond(&h, &id, "alice").await.unwrap();
        h.clock.advance(TimeDelta::hours(73));
        time_out(&h, &id).await.unwrap();

        // Act
        let outcome = respond(&h, &id, "bob").await.unwrap();

        // Assert
        assert!(outcome.turn_complete);
        assert_eq!(outcome.session_state, SessionState::Active);
        let session = h.store.session(&id).unwrap();
        assert_eq!(session.current_turn, 1);
        assert!(session.pause.is_none());
        assert_eq!(session.resumed_by.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_timeout_of_waiting_session_expires_it() {
        let h = harness();
        let id = open(&h, GameType::Exchange, "alice", None).await;

        let outcome = time_out(&h, &id).await.unwrap();

        assert_eq!(outcome.action, TimeoutAction::Expired);
        assert_eq!(h.store.session(&id).unwrap().status, SessionState::TimedOut);
    }

    #[tokio::test]
    async fn test_timeout_of_paused_session_expires_it() {
        let h = harness();
        let id = exchange(&h).await;
        time_out(&h, &id).await.unwrap();

        let outcome = time_out(&h, &id).await.unwrap();

        assert_eq!(outcome.action, TimeoutAction::Expired);
    }

    #[tokio::test]
    async fn test_timeout_of_completed_session_is_invalid_transition() {
        // Arrange
        let h = harness();
        let id = exchange(&h).await;
        h.engine
            .complete_session(&CompleteSession {
                correlation_id: Uuid::new_v4(),
                session_id: id.clone(),
            })
            .await
            .unwrap();

        // Act
        let err = time_out(&h, &id).await.unwrap_err();

        // Assert
        assert!(matches!(
            err,
            CoordinationError::InvalidTransition {
                machine: MachineKind::Session,
                trigger: "timeout",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_timeout_for_superseded_turn_is_already_resolved() {
        // Arrange
        let h = harness();
        let id = exchange(&h).await;
        respond(&h, &id, "alice").await.unwrap();
        respond(&h, &id, "bob").await.unwrap();

        // Act
        let outcome = h
            .engine
            .handle_timeout(&HandleTimeout {
                correlation_id: Uuid::new_v4(),
                session_id: id.clone(),
                expected_turn: Some(1),
                expected_status: None,
            })
            .await
            .unwrap();

        // Assert
        assert_eq!(outcome.action, TimeoutAction::AlreadyResolved);
        assert_eq!(h.store.session(&id).unwrap().status, SessionState::Active);
    }

    #[tokio::test]
    async fn test_resume_clears_pause_and_records_actor() {
        // Arrange
        let h = harness();
        let id = exchange(&h).await;
        time_out(&h, &id).await.unwrap();
        h.clock.advance(TimeDelta::hours(1));

        // Act
        let record = h
            .engine
            .resume_session(&ResumeSession {
                correlation_id: Uuid::new_v4(),
                session_id: id,
                actor: "coordinator".into(),
            })
            .await
            .unwrap();

        // Assert
        assert_eq!(record.status, SessionState::Active);
        assert!(record.pause.is_none());
        assert_eq!(record.resumed_by.as_deref(), Some("coordinator"));
        assert_eq!(record.last_activity_at, start() + TimeDelta::hours(1));
    }

    #[tokio::test]
    async fn test_resume_active_session_is_not_resumable() {
        let h = harness();
        let id = exchange(&h).await;

        let err = h
            .engine
            .resume_session(&ResumeSession {
                correlation_id: Uuid::new_v4(),
                session_id: id,
                actor: "coordinator".into(),
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CoordinationError::SessionNotResumable {
                status: SessionState::Active,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_pause_waiting_session_is_not_pausable() {
        let h = harness();
        let id = open(&h, GameType::Exchange, "alice", None).await;

        let err = h
            .engine
            .pause_session(&PauseSession {
                correlation_id: Uuid::new_v4(),
                session_id: id,
                reason: "manual".into(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CoordinationError::SessionNotPausable { .. }));
    }

    #[tokio::test]
    async fn test_explicit_activation_of_solo_adventure() {
        let h = harness();
        let id = open(&h, GameType::Adventure, "solo", None).await;

        let record = h
            .engine
            .activate_session(&ActivateSession {
                correlation_id: Uuid::new_v4(),
                session_id: id,
            })
            .await
            .unwrap();

        assert_eq!(record.status, SessionState::Active);
        assert_eq!(record.waiting_for.len(), 1);
    }

    #[tokio::test]
    async fn test_explicit_activation_below_minimum_is_guard_rejected() {
        let h = harness();
        let id = open(&h, GameType::Exchange, "alice", None).await;

        let err = h
            .engine
            .activate_session(&ActivateSession {
                correlation_id: Uuid::new_v4(),
                session_id: id,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CoordinationError::GuardRejected { .. }));
    }

    #[tokio::test]
    async fn test_archive_requires_finished_session() {
        // Arrange
        let h = harness();
        let id = exchange(&h).await;
        let archive = ArchiveSession {
            correlation_id: Uuid::new_v4(),
            session_id: id.clone(),
        };

        // Act
        let early = h.engine.archive_session(&archive).await;
        h.engine
            .complete_session(&CompleteSession {
                correlation_id: Uuid::new_v4(),
                session_id: id,
            })
            .await
            .unwrap();
        let archived = h.engine.archive_session(&archive).await.unwrap();

        // Assert
        assert!(matches!(
            early,
            Err(CoordinationError::InvalidTransition { trigger: "archive", .. })
        ));
        assert_eq!(archived.status, SessionState::Archived);
    }

    #[tokio::test]
    async fn test_conflicts_within_budget_are_retried() {
        // Arrange
        let h = harness();
        let id = exchange(&h).await;
        let calls_before = h.store.update_calls();
        h.store.inject_conflicts(3);

        // Act
        let outcome = respond(&h, &id, "alice").await.unwrap();

        // Assert
        assert_eq!(outcome.waiting_for, vec!["bob"]);
        assert_eq!(h.store.update_calls() - calls_before, 4);
        assert_eq!(h.store.get_turn_responses(&id, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_conflicts_beyond_budget_escalate() {
        let h = harness();
        let id = exchange(&h).await;
        h.store.inject_conflicts(4);

        let err = respond(&h, &id, "alice").await.unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(h.store.session(&id).unwrap().waiting_for.len(), 2);
    }

    #[tokio::test]
    async fn test_store_unavailable_propagates_unmodified() {
        let engine = CoordinationEngine::new(
            Arc::new(FailingSessionStore),
            Arc::new(ManualClock::new(start())),
            Arc::new(SequenceIds::new(["S1"])),
            EngineConfig::default(),
        );

        let err = engine
            .process_response(&respond_cmd("S1", "alice"))
            .await
            .unwrap_err();

        assert!(matches!(err, CoordinationError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_concurrent_partners_both_land_in_the_same_turn() {
        // Arrange
        let h = harness_with(InMemorySessionStore::interleaving(), GameCatalog::default());
        let id = exchange(&h).await;
        let alice = respond_cmd(&id, "alice");
        let bob = respond_cmd(&id, "bob");

        // Act
        let (a, b) = tokio::join!(
            h.engine.process_response(&alice),
            h.engine.process_response(&bob)
        );

        // Assert
        assert!(a.unwrap().turn_complete || b.as_ref().is_ok_and(|o| o.turn_complete));
        assert!(b.is_ok());
        let session = h.store.session(&id).unwrap();
        assert_eq!(session.current_turn, 1);
        assert_eq!(h.store.get_turn_responses(&id, 1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_responses_lose_no_update() {
        // Arrange
        let h = harness_with(InMemorySessionStore::interleaving(), three_player_adventures());
        let id = open(&h, GameType::Adventure, "p1", Some(3)).await;
        join(&h, &id, "p2").await;
        join(&h, &id, "p3").await;
        let first = respond_cmd(&id, "p1");
        let second = respond_cmd(&id, "p2");

        // Act
        let (a, b) = tokio::join!(
            h.engine.process_response(&first),
            h.engine.process_response(&second)
        );

        // Assert
        assert!(a.is_ok());
        assert!(b.is_ok());
        let session = h.store.session(&id).unwrap();
        assert_eq!(session.current_turn, 0);
        assert_eq!(
            session.waiting_for.into_iter().collect::<Vec<_>>(),
            vec!["p3"]
        );
    }

    #[tokio::test]
    async fn test_active_sessions_respect_participant_bounds() {
        let h = harness();
        let id = exchange(&h).await;

        let session = h.store.session(&id).unwrap();
        let rules = h.engine.catalog().rules_for(&session.game_type);

        assert_eq!(session.status, SessionState::Active);
        assert!(session.participants.len() >= rules.min_players);
        assert!(session.participants.len() <= rules.max_players);
    }
}
