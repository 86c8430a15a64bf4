//! Game types, per-game rules, and the quorum policy table.
//!
//! Every game type resolves to an explicit row of the quorum table. Tags that
//! are not configured fall into [`GameType::Unconfigured`], whose row never
//! completes a turn after a timeout.

use std::fmt;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Tag of the two-party exchange game type.
pub const EXCHANGE_TAG: &str = "exchange";

/// Tag of the N-party adventure game type.
pub const ADVENTURE_TAG: &str = "adventure";

/// The kind of session being coordinated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GameType {
    /// Two participants take every turn together.
    Exchange,
    /// A party of participants; turns advance on a per-session minimum.
    Adventure,
    /// A tag with no configured rules.
    Unconfigured(String),
}

impl GameType {
    /// Returns the stored tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Exchange => EXCHANGE_TAG,
            Self::Adventure => ADVENTURE_TAG,
            Self::Unconfigured(tag) => tag,
        }
    }

    /// Whether new sessions of this type may be opened.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !matches!(self, Self::Unconfigured(_))
    }
}

impl From<String> for GameType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            EXCHANGE_TAG => Self::Exchange,
            ADVENTURE_TAG => Self::Adventure,
            _ => Self::Unconfigured(tag),
        }
    }
}

impl From<&str> for GameType {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_owned())
    }
}

impl From<GameType> for String {
    fn from(game_type: GameType) -> Self {
        match game_type {
            GameType::Unconfigured(tag) => tag,
            other => other.tag().to_owned(),
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Participant limits and turn SLA for one game type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRules {
    /// Participants required before the session may activate.
    pub min_players: usize,
    /// Participant ceiling.
    pub max_players: usize,
    /// Hours a turn may sit without activity before the scanner acts.
    pub turn_timeout_hours: u32,
    /// Responses needed per turn when the session does not set its own
    /// minimum. Only consulted by game types with a per-turn minimum.
    #[serde(default = "default_min_players_per_turn")]
    pub min_players_per_turn: usize,
}

fn default_min_players_per_turn() -> usize {
    1
}

impl GameRules {
    /// The turn SLA as a duration.
    #[must_use]
    pub fn turn_timeout(&self) -> TimeDelta {
        TimeDelta::hours(i64::from(self.turn_timeout_hours))
    }

    fn validate(&self, name: &str) -> Result<(), String> {
        if self.min_players == 0 || self.min_players > self.max_players {
            return Err(format!(
                "{name}: min_players must be between 1 and max_players ({})",
                self.max_players
            ));
        }
        if self.max_players > MAX_PLAYERS_CEILING {
            return Err(format!(
                "{name}: max_players must not exceed {MAX_PLAYERS_CEILING}"
            ));
        }
        if !(1..=MAX_TURN_TIMEOUT_HOURS).contains(&self.turn_timeout_hours) {
            return Err(format!(
                "{name}: turn_timeout_hours must be between 1 and {MAX_TURN_TIMEOUT_HOURS}"
            ));
        }
        if self.min_players_per_turn == 0 || self.min_players_per_turn > self.max_players {
            return Err(format!(
                "{name}: min_players_per_turn must be between 1 and max_players ({})",
                self.max_players
            ));
        }
        Ok(())
    }
}

const MAX_PLAYERS_CEILING: usize = 20;
const MAX_TURN_TIMEOUT_HOURS: u32 = 168;

/// The rules table, one row per game type plus the fallback row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameCatalog {
    /// Rules for [`GameType::Exchange`].
    #[serde(default = "GameCatalog::exchange_defaults")]
    pub exchange: GameRules,
    /// Rules for [`GameType::Adventure`].
    #[serde(default = "GameCatalog::adventure_defaults")]
    pub adventure: GameRules,
    /// Rules applied to stored sessions whose tag is not configured.
    #[serde(default = "GameCatalog::unconfigured_defaults")]
    pub unconfigured: GameRules,
}

impl Default for GameCatalog {
    fn default() -> Self {
        Self {
            exchange: Self::exchange_defaults(),
            adventure: Self::adventure_defaults(),
            unconfigured: Self::unconfigured_defaults(),
        }
    }
}

impl GameCatalog {
    fn exchange_defaults() -> GameRules {
        GameRules {
            min_players: 2,
            max_players: 2,
            turn_timeout_hours: 72,
            min_players_per_turn: 2,
        }
    }

    fn adventure_defaults() -> GameRules {
        GameRules {
            min_players: 1,
            max_players: 4,
            turn_timeout_hours: 24,
            min_players_per_turn: 1,
        }
    }

    fn unconfigured_defaults() -> GameRules {
        GameRules {
            min_players: 1,
            max_players: 4,
            turn_timeout_hours: 24,
            min_players_per_turn: 1,
        }
    }

    /// Returns the rules row for a game type.
    #[must_use]
    pub fn rules_for(&self, game_type: &GameType) -> &GameRules {
        match game_type {
            GameType::Exchange => &self.exchange,
            GameType::Adventure => &self.adventure,
            GameType::Unconfigured(_) => &self.unconfigured,
        }
    }

    /// Resolves the quorum policy for a session.
    ///
    /// `session_min_per_turn` is the session's own per-turn minimum, if it
    /// set one; it is only meaningful for adventures.
    #[must_use]
    pub fn quorum_for(
        &self,
        game_type: &GameType,
        session_min_per_turn: Option<usize>,
    ) -> QuorumPolicy {
        match game_type {
            GameType::Exchange => QuorumPolicy {
                live: LiveQuorum::AllOf { at_least: 2 },
                after_timeout: TimeoutQuorum::AllOf { at_least: 2 },
            },
            GameType::Adventure => QuorumPolicy {
                live: LiveQuorum::AtLeast(
                    session_min_per_turn.unwrap_or(self.adventure.min_players_per_turn),
                ),
                after_timeout: TimeoutQuorum::AtLeastHalf,
            },
            GameType::Unconfigured(_) => QuorumPolicy {
                live: LiveQuorum::AllOf { at_least: 1 },
                after_timeout: TimeoutQuorum::Never,
            },
        }
    }

    /// Participants a session needs before it may activate.
    ///
    /// Adventures never activate with fewer members than their per-turn
    /// minimum, otherwise no live turn could complete.
    #[must_use]
    pub fn players_to_activate(
        &self,
        game_type: &GameType,
        session_min_per_turn: Option<usize>,
    ) -> usize {
        let rules = self.rules_for(game_type);
        match game_type {
            GameType::Adventure => rules
                .min_players
                .max(session_min_per_turn.unwrap_or(rules.min_players_per_turn)),
            _ => rules.min_players,
        }
    }

    /// Checks every row for sane limits.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid row.
    pub fn validate(&self) -> Result<(), String> {
        self.exchange.validate(EXCHANGE_TAG)?;
        self.adventure.validate(ADVENTURE_TAG)?;
        self.unconfigured.validate("unconfigured")?;
        if self.exchange.min_players != 2 || self.exchange.max_players != 2 {
            return Err("exchange: sessions always have exactly 2 participants".to_owned());
        }
        Ok(())
    }
}

/// Rule deciding when a turn may leave `WAITING_FOR_PLAYERS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveQuorum {
    /// Every participant responded, and there are at least `at_least` of them.
    AllOf {
        /// Minimum number of responses regardless of participant count.
        at_least: usize,
    },
    /// At least this many distinct participants responded.
    AtLeast(usize),
}

/// Rule deciding whether a timed-out turn may still complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutQuorum {
    /// Every participant responded, and there are at least `at_least` of them.
    AllOf {
        /// Minimum number of responses regardless of participant count.
        at_least: usize,
    },
    /// At least half of the participants responded.
    AtLeastHalf,
    /// A timed-out turn never completes.
    Never,
}

/// The pair of rules governing one session's turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuorumPolicy {
    /// Live completion rule.
    pub live: LiveQuorum,
    /// Completion rule once the turn has timed out.
    pub after_timeout: TimeoutQuorum,
}

impl QuorumPolicy {
    /// Whether `responded` responses out of `participants` meet the live rule.
    #[must_use]
    pub fn live_satisfied(&self, responded: usize, participants: usize) -> bool {
        match self.live {
            LiveQuorum::AllOf { at_least } => {
                responded >= at_least && responded >= participants && participants > 0
            }
            LiveQuorum::AtLeast(k) => k > 0 && responded >= k,
        }
    }

    /// Whether a timed-out turn may complete with these counts.
    #[must_use]
    pub fn timeout_satisfied(&self, responded: usize, participants: usize) -> bool {
        match self.after_timeout {
            TimeoutQuorum::AllOf { at_least } => {
                responded >= at_least && responded >= participants && participants > 0
            }
            TimeoutQuorum::AtLeastHalf => responded > 0 && responded * 2 >= participants,
            TimeoutQuorum::Never => false,
        }
    }
}
