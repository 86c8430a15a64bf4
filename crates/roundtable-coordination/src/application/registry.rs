//! Request-scoped machine registry.
//!
//! One registry lives for exactly one attempt of one coordination request. It
//! fetches or creates machines on first access, always rehydrating from the
//! store, and writes back every machine that changed.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::{DateTime, Utc};
use roundtable_core::error::CoordinationError;
use roundtable_core::game::{GameCatalog, QuorumPolicy};
use roundtable_core::record::SessionRecord;
use roundtable_core::store::{MachineKey, SessionRecordStore};
use tracing::debug;

use crate::domain::session_machine::SessionMachine;
use crate::domain::turn_machine::TurnMachine;

/// Machines loaded or created during one request attempt.
pub struct MachineRegistry<'a> {
    store: &'a dyn SessionRecordStore,
    catalog: &'a GameCatalog,
    now: DateTime<Utc>,
    sessions: BTreeMap<String, SessionMachine>,
    turns: BTreeMap<(String, u32), TurnMachine>,
}

impl<'a> MachineRegistry<'a> {
    /// Creates an empty registry bound to `now` for every timestamp it records.
    #[must_use]
    pub fn new(
        store: &'a dyn SessionRecordStore,
        catalog: &'a GameCatalog,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            store,
            catalog,
            now,
            sessions: BTreeMap::new(),
            turns: BTreeMap::new(),
        }
    }

    /// Returns the session machine, rehydrating it on first access.
    ///
    /// # Errors
    ///
    /// Propagates store failures and snapshot decoding errors.
    pub async fn session_machine(
        &mut self,
        record: &SessionRecord,
    ) -> Result<&mut SessionMachine, CoordinationError> {
        match self.sessions.entry(record.id.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let key = MachineKey::Session(record.id.clone());
                let snapshot = self.store.load_machine_state(&key).await?;
                let machine = SessionMachine::rehydrate(record, snapshot.as_ref())?;
                debug!(machine = %key, state = %machine.state(), "rehydrated session machine");
                Ok(entry.insert(machine))
            }
        }
    }

    /// Registers a machine for a session that does not exist in the store yet.
    pub fn insert_session_machine(&mut self, machine: SessionMachine) -> &mut SessionMachine {
        match self.sessions.entry(machine.session_id().to_owned()) {
            Entry::Occupied(mut entry) => {
                entry.insert(machine);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(machine),
        }
    }

    /// Returns the machine of `turn_number`, rehydrating it on first access
    /// from its snapshot and the stored responses.
    ///
    /// # Errors
    ///
    /// Propagates store failures and snapshot decoding errors.
    pub async fn turn_machine(
        &mut self,
        record: &SessionRecord,
        turn_number: u32,
    ) -> Result<&mut TurnMachine, CoordinationError> {
        let policy = self.policy_for(record);
        match self.turns.entry((record.id.clone(), turn_number)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let key = MachineKey::Turn(record.id.clone(), turn_number);
                let snapshot = self.store.load_machine_state(&key).await?;
                let responses = self.store.get_turn_responses(&record.id, turn_number).await?;
                let machine = TurnMachine::rehydrate(
                    &record.id,
                    turn_number,
                    record.participants.clone(),
                    policy,
                    snapshot.as_ref(),
                    &responses,
                    self.now,
                )?;
                debug!(
                    machine = %key,
                    state = %machine.state(),
                    responded = machine.responded().len(),
                    "rehydrated turn machine"
                );
                Ok(entry.insert(machine))
            }
        }
    }

    /// Creates a fresh machine for a turn that has just opened, awaiting every
    /// participant, without reading the store.
    pub fn open_turn(&mut self, record: &SessionRecord, turn_number: u32) -> &mut TurnMachine {
        let machine = TurnMachine::new(
            record.id.clone(),
            turn_number,
            record.participants.clone(),
            self.policy_for(record),
            self.now,
        );
        match self.turns.entry((record.id.clone(), turn_number)) {
            Entry::Occupied(mut entry) => {
                entry.insert(machine);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(machine),
        }
    }

    /// Writes every changed machine as a snapshot tagged with `revision`.
    ///
    /// # Errors
    ///
    /// Propagates the first store failure.
    pub async fn persist(&mut self, revision: i64) -> Result<usize, CoordinationError> {
        let mut written = 0;
        for machine in self.sessions.values().filter(|m| m.is_dirty()) {
            let key = MachineKey::Session(machine.session_id().to_owned());
            self.store
                .save_machine_state(&key, &machine.snapshot(revision, self.now))
                .await?;
            written += 1;
        }
        for machine in self.turns.values().filter(|m| m.is_dirty()) {
            let key = MachineKey::Turn(machine.session_id().to_owned(), machine.turn_number());
            self.store
                .save_machine_state(&key, &machine.snapshot(revision, self.now))
                .await?;
            written += 1;
        }
        debug!(revision, written, "persisted machine snapshots");
        Ok(written)
    }

    /// Evicts cached turn machines older than `current_turn - keep_recent`.
    /// Persisted snapshots are untouched.
    pub fn cleanup_completed_turns(
        &mut self,
        session_id: &str,
        current_turn: u32,
        keep_recent: u32,
    ) -> usize {
        let horizon = current_turn.saturating_sub(keep_recent);
        let before = self.turns.len();
        self.turns
            .retain(|(id, turn), _| id != session_id || *turn >= horizon);
        before - self.turns.len()
    }

    /// Number of cached turn machines.
    #[must_use]
    pub fn cached_turns(&self) -> usize {
        self.turns.len()
    }

    fn policy_for(&self, record: &SessionRecord) -> QuorumPolicy {
        self.catalog
            .quorum_for(&record.game_type, record.min_players_per_turn)
    }
}
