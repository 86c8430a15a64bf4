//! Test stores — in-memory `SessionRecordStore` implementations.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use roundtable_core::error::CoordinationError;
use roundtable_core::game::GameType;
use roundtable_core::record::{SessionRecord, SessionUpdate, TurnResponse, session_key};
use roundtable_core::state::SessionState;
use roundtable_core::store::{MachineKey, MachineSnapshot, SessionRecordStore};

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<String, SessionRecord>,
    responses: Vec<TurnResponse>,
    machines: HashMap<MachineKey, MachineSnapshot>,
    pending_conflicts: usize,
    update_calls: usize,
    conflicts_raised: usize,
}

/// A store that keeps everything in memory with the same conditional-write
/// semantics as the PostgreSQL store.
///
/// Extras for tests: injected conflicts, counters, and an interleaving mode in
/// which every call yields to the scheduler first so concurrently joined
/// futures genuinely race.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    inner: Mutex<Inner>,
    interleave: bool,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store whose calls yield before touching state.
    #[must_use]
    pub fn interleaving() -> Self {
        Self {
            inner: Mutex::default(),
            interleave: true,
        }
    }

    /// Seeds a session record as-is.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn insert_session(&self, record: SessionRecord) {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .insert(record.id.clone(), record);
    }

    /// Makes the next `count` calls to `update_session` fail with a conflict.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn inject_conflicts(&self, count: usize) {
        self.inner.lock().unwrap().pending_conflicts = count;
    }

    /// Returns a copy of a stored session.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn session(&self, session_id: &str) -> Option<SessionRecord> {
        self.inner.lock().unwrap().sessions.get(session_id).cloned()
    }

    /// Returns a copy of a stored machine snapshot.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn machine(&self, key: &MachineKey) -> Option<MachineSnapshot> {
        self.inner.lock().unwrap().machines.get(key).cloned()
    }

    /// Number of `update_session` calls, conflicting ones included.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn update_calls(&self) -> usize {
        self.inner.lock().unwrap().update_calls
    }

    /// Number of conflicts returned by `update_session`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn conflicts_raised(&self) -> usize {
        self.inner.lock().unwrap().conflicts_raised
    }

    async fn maybe_yield(&self) {
        if self.interleave {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl SessionRecordStore for InMemorySessionStore {
    async fn create_session(&self, record: &SessionRecord) -> Result<(), CoordinationError> {
        self.maybe_yield().await;
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.sessions.get(&record.id) {
            return Err(CoordinationError::StoreConflict {
                key: record.key(),
                expected: 0,
                actual: Some(existing.version),
            });
        }
        inner.sessions.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_session(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionRecord>, CoordinationError> {
        self.maybe_yield().await;
        Ok(self.inner.lock().unwrap().sessions.get(session_id).cloned())
    }

    async fn update_session(
        &self,
        session_id: &str,
        expected_version: i64,
        update: &SessionUpdate,
    ) -> Result<SessionRecord, CoordinationError> {
        self.maybe_yield().await;
        let mut inner = self.inner.lock().unwrap();
        inner.update_calls += 1;

        let actual = inner
            .sessions
            .get(session_id)
            .map(|record| record.version)
            .ok_or_else(|| CoordinationError::SessionNotFound(session_id.to_owned()))?;

        if inner.pending_conflicts > 0 || actual != expected_version {
            inner.pending_conflicts = inner.pending_conflicts.saturating_sub(1);
            inner.conflicts_raised += 1;
            return Err(CoordinationError::StoreConflict {
                key: session_key(session_id),
                expected: expected_version,
                actual: Some(actual),
            });
        }

        let record = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| CoordinationError::SessionNotFound(session_id.to_owned()))?;
        update.apply(record);
        Ok(record.clone())
    }

    async fn save_turn_response(&self, response: &TurnResponse) -> Result<(), CoordinationError> {
        self.maybe_yield().await;
        let mut inner = self.inner.lock().unwrap();
        inner.responses.retain(|r| {
            !(r.session_id == response.session_id
                && r.turn_number == response.turn_number
                && r.participant == response.participant)
        });
        inner.responses.push(response.clone());
        Ok(())
    }

    async fn get_turn_responses(
        &self,
        session_id: &str,
        turn_number: u32,
    ) -> Result<Vec<TurnResponse>, CoordinationError> {
        self.maybe_yield().await;
        let mut responses: Vec<TurnResponse> = self
            .inner
            .lock()
            .unwrap()
            .responses
            .iter()
            .filter(|r| r.session_id == session_id && r.turn_number == turn_number)
            .cloned()
            .collect();
        responses.sort_by_key(|r| r.submitted_at);
        Ok(responses)
    }

    async fn list_active_sessions(
        &self,
        game_type: Option<&GameType>,
    ) -> Result<Vec<SessionRecord>, CoordinationError> {
        self.maybe_yield().await;
        let mut sessions: Vec<SessionRecord> = self
            .inner
            .lock()
            .unwrap()
            .sessions
            .values()
            .filter(|s| {
                matches!(
                    s.status,
                    SessionState::Initializing
                        | SessionState::WaitingForPlayers
                        | SessionState::Active
                        | SessionState::Paused
                )
            })
            .filter(|s| game_type.is_none_or(|g| &s.game_type == g))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sessions)
    }

    async fn save_machine_state(
        &self,
        key: &MachineKey,
        snapshot: &MachineSnapshot,
    ) -> Result<(), CoordinationError> {
        self.maybe_yield().await;
        let mut inner = self.inner.lock().unwrap();
        let stale = inner
            .machines
            .get(key)
            .is_some_and(|stored| stored.revision > snapshot.revision);
        if !stale {
            inner.machines.insert(key.clone(), snapshot.clone());
        }
        Ok(())
    }

    async fn load_machine_state(
        &self,
        key: &MachineKey,
    ) -> Result<Option<MachineSnapshot>, CoordinationError> {
        self.maybe_yield().await;
        Ok(self.inner.lock().unwrap().machines.get(key).cloned())
    }

    async fn ping(&self) -> Result<(), CoordinationError> {
        Ok(())
    }
}

/// A store whose every call fails with `StoreUnavailable`. Useful for testing
/// infrastructure error paths.
#[derive(Debug)]
pub struct FailingSessionStore;

fn unavailable() -> CoordinationError {
    CoordinationError::StoreUnavailable("connection refused".into())
}

#[async_trait]
impl SessionRecordStore for FailingSessionStore {
    async fn create_session(&self, _record: &SessionRecord) -> Result<(), CoordinationError> {
        Err(unavailable())
    }

    async fn get_session(
        &self,
        _session_id: &str,
    ) -> Result<Option<SessionRecord>, CoordinationError> {
        Err(unavailable())
    }

    async fn update_session(
        &self,
        _session_id: &str,
        _expected_version: i64,
        _update: &SessionUpdate,
    ) -> Result<SessionRecord, CoordinationError> {
        Err(unavailable())
    }

    async fn save_turn_response(&self, _response: &TurnResponse) -> Result<(), CoordinationError> {
        Err(unavailable())
    }

    async fn get_turn_responses(
        &self,
        _session_id: &str,
        _turn_number: u32,
    ) -> Result<Vec<TurnResponse>, CoordinationError> {
        Err(unavailable())
    }

    async fn list_active_sessions(
        &self,
        _game_type: Option<&GameType>,
    ) -> Result<Vec<SessionRecord>, CoordinationError> {
        Err(unavailable())
    }

    async fn save_machine_state(
        &self,
        _key: &MachineKey,
        _snapshot: &MachineSnapshot,
    ) -> Result<(), CoordinationError> {
        Err(unavailable())
    }

    async fn load_machine_state(
        &self,
        _key: &MachineKey,
    ) -> Result<Option<MachineSnapshot>, CoordinationError> {
        Err(unavailable())
    }

    async fn ping(&self) -> Result<(), CoordinationError> {
        Err(unavailable())
    }
}
