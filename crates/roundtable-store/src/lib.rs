//! PostgreSQL persistence for the Roundtable turn engine.

pub mod pg_session_store;

/// Embedded schema migrations, shared with the server binary.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");
