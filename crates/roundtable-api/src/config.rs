//! Server configuration, read from the environment at startup.

use std::time::Duration;

use roundtable_core::game::GameCatalog;

use crate::error::AppError;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_SCAN_INTERVAL_SECS: u64 = 900;
const DEFAULT_SCAN_MAX_SESSIONS: usize = 100;
const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;
const MAX_CONFLICT_RETRIES_CEILING: u32 = 10;

/// Everything the server needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` connection string.
    pub database_url: String,
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Connection pool ceiling.
    pub database_max_connections: u32,
    /// Period of the background timeout scan. `None` disables the loop.
    pub scan_interval: Option<Duration>,
    /// Cap on sessions processed per scan.
    pub scan_max_sessions: usize,
    /// Conflict retries before an error surfaces.
    pub max_conflict_retries: u32,
    /// Game rules in force.
    pub catalog: GameCatalog,
}

impl ServerConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for a missing `DATABASE_URL`, unparsable
    /// values, or an invalid rules file.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// See [`ServerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or_else(|| {
            AppError::Config("DATABASE_URL environment variable must be set".to_owned())
        })?;
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned());
        let port = parse_or(&lookup, "PORT", DEFAULT_PORT)?;
        let database_max_connections =
            parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        let scan_secs: u64 =
            parse_or(&lookup, "TIMEOUT_SCAN_INTERVAL_SECS", DEFAULT_SCAN_INTERVAL_SECS)?;
        let scan_max_sessions =
            parse_or(&lookup, "TIMEOUT_SCAN_MAX_SESSIONS", DEFAULT_SCAN_MAX_SESSIONS)?;
        let max_conflict_retries =
            parse_or(&lookup, "MAX_CONFLICT_RETRIES", DEFAULT_MAX_CONFLICT_RETRIES)?;
        if !(1..=MAX_CONFLICT_RETRIES_CEILING).contains(&max_conflict_retries) {
            return Err(AppError::Config(format!(
                "MAX_CONFLICT_RETRIES must be between 1 and {MAX_CONFLICT_RETRIES_CEILING}"
            )));
        }

        let catalog = match lookup("GAME_RULES_PATH") {
            Some(path) => {
                let raw = std::fs::read_to_string(&path).map_err(|e| {
                    AppError::Config(format!("cannot read GAME_RULES_PATH {path}: {e}"))
                })?;
                parse_catalog(&raw)?
            }
            None => GameCatalog::default(),
        };

        Ok(Self {
            database_url,
            host,
            port,
            database_max_connections,
            scan_interval: (scan_secs > 0).then(|| Duration::from_secs(scan_secs)),
            scan_max_sessions,
            max_conflict_retries,
            catalog,
        })
    }
}

/// Parses and validates a YAML rules table. Rows left out keep their
/// defaults.
///
/// # Errors
///
/// Returns `AppError::Config` for malformed YAML or out-of-range limits.
pub fn parse_catalog(raw: &str) -> Result<GameCatalog, AppError> {
    let catalog: GameCatalog = serde_yaml::from_str(raw)
        .map_err(|e| AppError::Config(format!("invalid game rules: {e}")))?;
    catalog
        .validate()
        .map_err(|e| AppError::Config(format!("invalid game rules: {e}")))?;
    Ok(catalog)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
        None => Ok(default),
    }
}
