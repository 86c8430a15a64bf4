//! `PostgreSQL` implementation of the `SessionRecordStore` trait.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roundtable_core::error::CoordinationError;
use roundtable_core::game::GameType;
use roundtable_core::record::{PauseInfo, SessionRecord, SessionUpdate, TurnResponse, session_key};
use roundtable_core::state::SessionState;
use roundtable_core::store::{MachineKey, MachineSnapshot, SessionRecordStore};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

const SESSION_COLUMNS: &str = "id, game_type, participants, current_turn, status, waiting_for, \
     min_players_per_turn, pause_reason, paused_at, resumed_by, resumed_at, \
     last_activity_at, created_at, updated_at, version";

/// `PostgreSQL`-backed session record store.
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Creates a new `PgSessionStore` with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn unavailable(err: &sqlx::Error) -> CoordinationError {
    CoordinationError::StoreUnavailable(err.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn to_db_turn(turn: u32) -> Result<i32, CoordinationError> {
    i32::try_from(turn)
        .map_err(|_| CoordinationError::StoreUnavailable(format!("turn {turn} out of range")))
}

fn from_db_turn(turn: i32) -> Result<u32, CoordinationError> {
    u32::try_from(turn)
        .map_err(|_| CoordinationError::StoreUnavailable(format!("negative turn {turn}")))
}

fn to_db_count(count: Option<usize>) -> Result<Option<i32>, CoordinationError> {
    count
        .map(|c| {
            i32::try_from(c).map_err(|_| {
                CoordinationError::StoreUnavailable(format!("count {c} out of range"))
            })
        })
        .transpose()
}

fn session_from_row(row: &PgRow) -> Result<SessionRecord, CoordinationError> {
    let get_err = |e: sqlx::Error| unavailable(&e);

    let status: String = row.try_get("status").map_err(get_err)?;
    let status: SessionState = status
        .parse()
        .map_err(|e: String| CoordinationError::StoreUnavailable(format!("corrupt session row: {e}")))?;
    let game_type: String = row.try_get("game_type").map_err(get_err)?;
    let participants: Vec<String> = row.try_get("participants").map_err(get_err)?;
    let waiting_for: Vec<String> = row.try_get("waiting_for").map_err(get_err)?;
    let min_players_per_turn: Option<i32> = row.try_get("min_players_per_turn").map_err(get_err)?;
    let pause_reason: Option<String> = row.try_get("pause_reason").map_err(get_err)?;
    let paused_at: Option<DateTime<Utc>> = row.try_get("paused_at").map_err(get_err)?;

    let pause = match (pause_reason, paused_at) {
        (Some(reason), Some(paused_at)) => Some(PauseInfo { reason, paused_at }),
        _ => None,
    };

    Ok(SessionRecord {
        id: row.try_get("id").map_err(get_err)?,
        game_type: GameType::from(game_type),
        participants: participants.into_iter().collect::<BTreeSet<_>>(),
        current_turn: from_db_turn(row.try_get("current_turn").map_err(get_err)?)?,
        status,
        waiting_for: waiting_for.into_iter().collect::<BTreeSet<_>>(),
        min_players_per_turn: min_players_per_turn.and_then(|c| usize::try_from(c).ok()),
        pause,
        resumed_by: row.try_get("resumed_by").map_err(get_err)?,
        resumed_at: row.try_get("resumed_at").map_err(get_err)?,
        last_activity_at: row.try_get("last_activity_at").map_err(get_err)?,
        created_at: row.try_get("created_at").map_err(get_err)?,
        updated_at: row.try_get("updated_at").map_err(get_err)?,
        version: row.try_get("version").map_err(get_err)?,
    })
}

#[async_trait]
impl SessionRecordStore for PgSessionStore {
    #[instrument(skip_all, fields(session_id = %record.id))]
    async fn create_session(&self, record: &SessionRecord) -> Result<(), CoordinationError> {
        let (pause_reason, paused_at) = record
            .pause
            .as_ref()
            .map(|p| (p.reason.clone(), p.paused_at))
            .unzip();

        let result = sqlx::query(
            "INSERT INTO sessions (id, game_type, participants, current_turn, status, \
             waiting_for, min_players_per_turn, pause_reason, paused_at, resumed_by, \
             resumed_at, last_activity_at, created_at, updated_at, version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(&record.id)
        .bind(record.game_type.tag())
        .bind(record.participants.iter().cloned().collect::<Vec<_>>())
        .bind(to_db_turn(record.current_turn)?)
        .bind(record.status.as_str())
        .bind(record.waiting_for.iter().cloned().collect::<Vec<_>>())
        .bind(to_db_count(record.min_players_per_turn)?)
        .bind(pause_reason)
        .bind(paused_at)
        .bind(&record.resumed_by)
        .bind(record.resumed_at)
        .bind(record.last_activity_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.version)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("session created");
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => Err(CoordinationError::StoreConflict {
                key: record.key(),
                expected: 0,
                actual: None,
            }),
            Err(e) => Err(unavailable(&e)),
        }
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn get_session(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionRecord>, CoordinationError> {
        let row = sqlx::query(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"))
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unavailable(&e))?;
        row.as_ref().map(session_from_row).transpose()
    }

    #[instrument(skip_all, fields(session_id = %session_id, expected_version))]
    async fn update_session(
        &self,
        session_id: &str,
        expected_version: i64,
        update: &SessionUpdate,
    ) -> Result<SessionRecord, CoordinationError> {
        let mut record = self
            .get_session(session_id)
            .await?
            .ok_or_else(|| CoordinationError::SessionNotFound(session_id.to_owned()))?;
        if record.version != expected_version {
            return Err(CoordinationError::StoreConflict {
                key: session_key(session_id),
                expected: expected_version,
                actual: Some(record.version),
            });
        }
        update.apply(&mut record);

        let (pause_reason, paused_at) = record
            .pause
            .as_ref()
            .map(|p| (p.reason.clone(), p.paused_at))
            .unzip();

        // The version predicate turns a lost race into zero affected rows.
        let result = sqlx::query(
            "UPDATE sessions SET participants = $3, current_turn = $4, status = $5, \
             waiting_for = $6, pause_reason = $7, paused_at = $8, resumed_by = $9, \
             resumed_at = $10, last_activity_at = $11, updated_at = $12, version = $13 \
             WHERE id = $1 AND version = $2",
        )
        .bind(session_id)
        .bind(expected_version)
        .bind(record.participants.iter().cloned().collect::<Vec<_>>())
        .bind(to_db_turn(record.current_turn)?)
        .bind(record.status.as_str())
        .bind(record.waiting_for.iter().cloned().collect::<Vec<_>>())
        .bind(pause_reason)
        .bind(paused_at)
        .bind(&record.resumed_by)
        .bind(record.resumed_at)
        .bind(record.last_activity_at)
        .bind(record.updated_at)
        .bind(record.version)
        .execute(&self.pool)
        .await
        .map_err(|e| unavailable(&e))?;

        if result.rows_affected() == 0 {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT version FROM sessions WHERE id = $1")
                    .bind(session_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| unavailable(&e))?;
            return match actual {
                None => Err(CoordinationError::SessionNotFound(session_id.to_owned())),
                Some(actual) => Err(CoordinationError::StoreConflict {
                    key: session_key(session_id),
                    expected: expected_version,
                    actual: Some(actual),
                }),
            };
        }

        debug!(version = record.version, "session updated");
        Ok(record)
    }

    #[instrument(skip_all, fields(session_id = %response.session_id, turn = response.turn_number))]
    async fn save_turn_response(&self, response: &TurnResponse) -> Result<(), CoordinationError> {
        sqlx::query(
            "INSERT INTO turn_responses (session_id, turn_number, participant, content, submitted_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (session_id, turn_number, participant) \
             DO UPDATE SET content = EXCLUDED.content, submitted_at = EXCLUDED.submitted_at",
        )
        .bind(&response.session_id)
        .bind(to_db_turn(response.turn_number)?)
        .bind(&response.participant)
        .bind(&response.content)
        .bind(response.submitted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unavailable(&e))?;
        Ok(())
    }

    #[instrument(skip_all, fields(session_id = %session_id, turn_number))]
    async fn get_turn_responses(
        &self,
        session_id: &str,
        turn_number: u32,
    ) -> Result<Vec<TurnResponse>, CoordinationError> {
        let rows = sqlx::query(
            "SELECT participant, content, submitted_at FROM turn_responses \
             WHERE session_id = $1 AND turn_number = $2 \
             ORDER BY submitted_at, participant",
        )
        .bind(session_id)
        .bind(to_db_turn(turn_number)?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| unavailable(&e))?;

        rows.iter()
            .map(|row| -> Result<TurnResponse, CoordinationError> {
                Ok(TurnResponse {
                    session_id: session_id.to_owned(),
                    turn_number,
                    participant: row.try_get("participant").map_err(|e| unavailable(&e))?,
                    content: row.try_get("content").map_err(|e| unavailable(&e))?,
                    submitted_at: row.try_get("submitted_at").map_err(|e| unavailable(&e))?,
                })
            })
            .collect()
    }

    #[instrument(skip_all)]
    async fn list_active_sessions(
        &self,
        game_type: Option<&GameType>,
    ) -> Result<Vec<SessionRecord>, CoordinationError> {
        let statuses: Vec<&str> = [
            SessionState::Initializing,
            SessionState::WaitingForPlayers,
            SessionState::Active,
            SessionState::Paused,
        ]
        .into_iter()
        .map(SessionState::as_str)
        .collect();

        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE status = ANY($1) AND ($2::TEXT IS NULL OR game_type = $2) \
             ORDER BY last_activity_at"
        ))
        .bind(statuses)
        .bind(game_type.map(GameType::tag))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| unavailable(&e))?;

        rows.iter().map(session_from_row).collect()
    }

    #[instrument(skip_all, fields(machine = %key, revision = snapshot.revision))]
    async fn save_machine_state(
        &self,
        key: &MachineKey,
        snapshot: &MachineSnapshot,
    ) -> Result<(), CoordinationError> {
        let turn_number = key.turn_number().map(to_db_turn).transpose()?;
        let result = sqlx::query(
            "INSERT INTO machine_states \
             (machine_key, session_id, turn_number, current_state, metadata, revision, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (machine_key) DO UPDATE SET \
             current_state = EXCLUDED.current_state, metadata = EXCLUDED.metadata, \
             revision = EXCLUDED.revision, updated_at = EXCLUDED.updated_at \
             WHERE machine_states.revision <= EXCLUDED.revision",
        )
        .bind(key.to_string())
        .bind(key.session_id())
        .bind(turn_number)
        .bind(&snapshot.current_state)
        .bind(&snapshot.metadata)
        .bind(snapshot.revision)
        .bind(snapshot.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unavailable(&e))?;

        if result.rows_affected() == 0 {
            debug!("stale machine snapshot discarded");
        }
        Ok(())
    }

    #[instrument(skip_all, fields(machine = %key))]
    async fn load_machine_state(
        &self,
        key: &MachineKey,
    ) -> Result<Option<MachineSnapshot>, CoordinationError> {
        let row = sqlx::query(
            "SELECT current_state, metadata, revision, updated_at FROM machine_states \
             WHERE machine_key = $1",
        )
        .bind(key.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unavailable(&e))?;

        row.map(|row| -> Result<MachineSnapshot, CoordinationError> {
            Ok(MachineSnapshot {
                current_state: row.try_get("current_state").map_err(|e| unavailable(&e))?,
                metadata: row.try_get("metadata").map_err(|e| unavailable(&e))?,
                revision: row.try_get("revision").map_err(|e| unavailable(&e))?,
                updated_at: row.try_get("updated_at").map_err(|e| unavailable(&e))?,
            })
        })
        .transpose()
    }

    async fn ping(&self) -> Result<(), CoordinationError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| unavailable(&e))?;
        Ok(())
    }
}
