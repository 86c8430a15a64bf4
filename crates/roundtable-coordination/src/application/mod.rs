//! Orchestration over the session record store.

pub mod engine;
pub mod query_handlers;
pub mod registry;
pub mod timeouts;
