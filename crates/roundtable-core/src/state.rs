//! Lifecycle states for sessions and turns.
//!
//! The string forms are the values persisted by the store and returned in
//! outcomes, so they must stay stable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle of a coordination session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Record created, first participant known, nothing else decided.
    #[default]
    Initializing,
    /// Gathering participants until the game's minimum is met.
    WaitingForPlayers,
    /// Turns are being played.
    Active,
    /// Suspended, usually after a turn timeout.
    Paused,
    /// Finished normally.
    Completed,
    /// Abandoned after going silent for a whole SLA window.
    TimedOut,
    /// Retired; terminal.
    Archived,
}

impl SessionState {
    /// All states, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Initializing,
        Self::WaitingForPlayers,
        Self::Active,
        Self::Paused,
        Self::Completed,
        Self::TimedOut,
        Self::Archived,
    ];

    /// States in which new participants may join.
    pub const JOINABLE: [Self; 2] = [Self::Initializing, Self::WaitingForPlayers];

    /// States the timeout scanner inspects.
    pub const SCANNABLE: [Self; 3] = [Self::WaitingForPlayers, Self::Active, Self::Paused];

    /// Returns the persisted string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::WaitingForPlayers => "waiting_for_players",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::Archived => "archived",
        }
    }

    /// No transition leaves this state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Archived)
    }

    /// Participants may still join.
    #[must_use]
    pub fn is_joinable(self) -> bool {
        Self::JOINABLE.contains(&self)
    }

    /// The session is still live from a participant's point of view.
    #[must_use]
    pub fn accepts_responses(self) -> bool {
        !matches!(self, Self::Completed | Self::TimedOut | Self::Archived)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("invalid session state: {s}"))
    }
}

/// Lifecycle of one turn within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// Collecting responses.
    #[default]
    WaitingForPlayers,
    /// Live quorum reached; the round is being resolved.
    Processing,
    /// Round resolved; the session has moved (or is moving) on.
    Completed,
    /// The SLA elapsed before the round could be resolved.
    TimedOut,
}

impl TurnState {
    /// All states, in lifecycle order.
    pub const ALL: [Self; 4] = [
        Self::WaitingForPlayers,
        Self::Processing,
        Self::Completed,
        Self::TimedOut,
    ];

    /// Returns the persisted string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WaitingForPlayers => "waiting_for_players",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TurnState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("invalid turn state: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_string_form_parses_back() {
        for state in SessionState::ALL {
            assert_eq!(state.as_str().parse::<SessionState>().unwrap(), state);
        }
    }

    #[test]
    fn test_session_state_serde_matches_display() {
        let json = serde_json::to_value(SessionState::WaitingForPlayers).unwrap();
        assert_eq!(json, "waiting_for_players");
        assert_eq!(SessionState::WaitingForPlayers.to_string(), "waiting_for_players");
    }

    #[test]
    fn test_unknown_state_is_rejected() {
        let err = "sleeping".parse::<TurnState>().unwrap_err();
        assert!(err.contains("sleeping"));
    }

    #[test]
    fn test_only_initializing_and_waiting_are_joinable() {
        let joinable: Vec<_> = SessionState::ALL
            .into_iter()
            .filter(|s| s.is_joinable())
            .collect();
        assert_eq!(
            joinable,
            vec![SessionState::Initializing, SessionState::WaitingForPlayers]
        );
    }

    #[test]
    fn test_finished_sessions_do_not_accept_responses() {
        assert!(SessionState::Paused.accepts_responses());
        assert!(!SessionState::Completed.accepts_responses());
        assert!(!SessionState::TimedOut.accepts_responses());
        assert!(!SessionState::Archived.accepts_responses());
    }
}
