//! Timeout scanning: finds sessions that went quiet past their game's SLA and
//! feeds them through the engine's timeout path.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use roundtable_core::error::CoordinationError;
use roundtable_core::game::GameType;
use roundtable_core::record::SessionRecord;
use roundtable_core::state::SessionState;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::application::engine::{CoordinationEngine, TimeoutAction, TimeoutOutcome};
use crate::domain::commands::HandleTimeout;

/// A session past its SLA, with the context the timeout decision needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeoutCandidate {
    /// The quiet session.
    pub session_id: String,
    /// Its game type.
    pub game_type: GameType,
    /// Status when scanned.
    pub status: SessionState,
    /// Participants not yet heard from this turn.
    pub waiting_for: Vec<String>,
    /// Completed turns.
    pub current_turn: u32,
    /// The game's SLA.
    pub turn_timeout_hours: u32,
    /// Latest activity on the session.
    pub last_activity_at: DateTime<Utc>,
    /// Whole hours since that activity.
    pub idle_hours: i64,
}

/// One session the scanner could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeoutFailure {
    /// The session that failed.
    pub session_id: String,
    /// Machine-readable error code.
    pub code: &'static str,
    /// Error message.
    pub message: String,
}

/// Aggregate result of processing a batch of candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimeoutReport {
    /// Candidates handed to the engine.
    pub processed: usize,
    /// Sessions paused.
    pub paused: usize,
    /// Sessions whose turn completed despite the timeout.
    pub advanced: usize,
    /// Sessions that timed out entirely.
    pub expired: usize,
    /// Sessions that had already moved on.
    pub already_resolved: usize,
    /// Sessions whose silent participants should be reminded.
    pub reminders_needed: Vec<String>,
    /// Per-session failures; they never abort the batch.
    pub failures: Vec<TimeoutFailure>,
    /// Individual outcomes, in processing order.
    pub outcomes: Vec<TimeoutOutcome>,
}

impl TimeoutReport {
    fn record(&mut self, outcome: TimeoutOutcome) {
        match &outcome.action {
            TimeoutAction::Paused { reminder_needed } => {
                self.paused += 1;
                if *reminder_needed {
                    self.reminders_needed.push(outcome.session_id.clone());
                }
            }
            TimeoutAction::Advanced(_) => self.advanced += 1,
            TimeoutAction::Expired => self.expired += 1,
            TimeoutAction::AlreadyResolved => self.already_resolved += 1,
        }
        self.outcomes.push(outcome);
    }
}

/// Options for one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Upper bound on candidates processed in one scan.
    pub max_sessions: usize,
    /// Report candidates without acting on them.
    pub dry_run: bool,
    /// Restrict the scan to one game type.
    pub game_type: Option<GameType>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            dry_run: false,
            game_type: None,
        }
    }
}

/// Result of one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// When the scan ran.
    pub scanned_at: DateTime<Utc>,
    /// Whether the scan only reported.
    pub dry_run: bool,
    /// Candidates found, after the `max_sessions` cap.
    pub candidates: Vec<TimeoutCandidate>,
    /// Processing result, absent on a dry run.
    pub report: Option<TimeoutReport>,
}

/// Whether one session needs the timeout path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionHealth {
    /// The session inspected.
    pub session_id: String,
    /// Its status.
    pub status: SessionState,
    /// Completed turns.
    pub current_turn: u32,
    /// Participants not yet heard from this turn.
    pub waiting_for: Vec<String>,
    /// Latest activity on the session.
    pub last_activity_at: DateTime<Utc>,
    /// When the SLA runs out.
    pub deadline: DateTime<Utc>,
    /// Whole hours since the latest activity.
    pub idle_hours: i64,
    /// Past the deadline in a status the scanner acts on.
    pub needs_attention: bool,
}

/// Batch driver for the timeout path.
pub struct TimeoutScanner {
    engine: Arc<CoordinationEngine>,
}

impl TimeoutScanner {
    /// Creates a scanner over the engine.
    #[must_use]
    pub fn new(engine: Arc<CoordinationEngine>) -> Self {
        Self { engine }
    }

    /// Lists sessions in a scannable status whose latest activity is older
    /// than their game's SLA, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn find_timed_out_sessions(
        &self,
        game_type: Option<&GameType>,
    ) -> Result<Vec<TimeoutCandidate>, CoordinationError> {
        let now = self.engine.clock().now();
        let sessions = self.engine.store().list_active_sessions(game_type).await?;
        let mut candidates: Vec<TimeoutCandidate> = sessions
            .iter()
            .filter(|session| SessionState::SCANNABLE.contains(&session.status))
            .filter(|session| now >= self.deadline(session))
            .map(|session| self.candidate(session, now))
            .collect();
        candidates.sort_by_key(|c| c.last_activity_at);
        Ok(candidates)
    }

    /// Runs the engine's timeout path for every candidate. One session
    /// failing does not stop the others.
    pub async fn process_timeouts(&self, candidates: &[TimeoutCandidate]) -> TimeoutReport {
        let mut report = TimeoutReport::default();
        for candidate in candidates {
            report.processed += 1;
            let command = HandleTimeout {
                correlation_id: Uuid::new_v4(),
                session_id: candidate.session_id.clone(),
                expected_turn: Some(candidate.current_turn + 1),
                expected_status: Some(candidate.status),
            };
            match self.engine.handle_timeout(&command).await {
                Ok(outcome) => report.record(outcome),
                Err(err) => {
                    warn!(
                        session_id = %candidate.session_id,
                        error = %err,
                        "timeout processing failed"
                    );
                    report.failures.push(TimeoutFailure {
                        session_id: candidate.session_id.clone(),
                        code: err.code(),
                        message: err.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Finds candidates and, unless this is a dry run, processes up to
    /// `max_sessions` of them.
    ///
    /// # Errors
    ///
    /// Propagates store failures from the candidate search.
    #[instrument(skip_all, fields(max_sessions = options.max_sessions, dry_run = options.dry_run))]
    pub async fn scan(&self, options: &ScanOptions) -> Result<ScanReport, CoordinationError> {
        let scanned_at = self.engine.clock().now();
        let mut candidates = self
            .find_timed_out_sessions(options.game_type.as_ref())
            .await?;
        candidates.truncate(options.max_sessions);

        let report = if options.dry_run {
            None
        } else {
            Some(self.process_timeouts(&candidates).await)
        };

        if let Some(report) = &report {
            info!(
                candidates = candidates.len(),
                paused = report.paused,
                advanced = report.advanced,
                expired = report.expired,
                failures = report.failures.len(),
                "timeout scan finished"
            );
        } else {
            info!(candidates = candidates.len(), "timeout scan dry run finished");
        }

        Ok(ScanReport {
            scanned_at,
            dry_run: options.dry_run,
            candidates,
            report,
        })
    }

    /// Reports whether a single session is past its SLA.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` if the session does not exist, store failures
    /// otherwise.
    pub async fn session_health(&self, session_id: &str) -> Result<SessionHealth, CoordinationError> {
        let now = self.engine.clock().now();
        let session = self
            .engine
            .store()
            .get_session(session_id)
            .await?
            .ok_or_else(|| CoordinationError::SessionNotFound(session_id.to_owned()))?;
        let deadline = self.deadline(&session);
        Ok(SessionHealth {
            session_id: session.id.clone(),
            status: session.status,
            current_turn: session.current_turn,
            waiting_for: session.waiting_for.iter().cloned().collect(),
            last_activity_at: session.latest_activity(),
            deadline,
            idle_hours: (now - session.latest_activity()).num_hours(),
            needs_attention: SessionState::SCANNABLE.contains(&session.status) && now >= deadline,
        })
    }

    fn deadline(&self, session: &SessionRecord) -> DateTime<Utc> {
        let rules = self.engine.catalog().rules_for(&session.game_type);
        session.latest_activity() + rules.turn_timeout()
    }

    fn candidate(&self, session: &SessionRecord, now: DateTime<Utc>) -> TimeoutCandidate {
        let rules = self.engine.catalog().rules_for(&session.game_type);
        TimeoutCandidate {
            session_id: session.id.clone(),
            game_type: session.game_type.clone(),
            status: session.status,
            waiting_for: session.waiting_for.iter().cloned().collect(),
            current_turn: session.current_turn,
            turn_timeout_hours: rules.turn_timeout_hours,
            last_activity_at: session.latest_activity(),
            idle_hours: (now - session.latest_activity()).num_hours(),
        }
    }
}
