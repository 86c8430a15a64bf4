//! Roundtable Core — shared coordination abstractions.
//!
//! This crate defines the records, game rules, error taxonomy, and store
//! contract that the coordination engine depends on. It contains no
//! infrastructure code.

pub mod clock;
pub mod command;
pub mod error;
pub mod game;
pub mod ids;
pub mod record;
pub mod state;
pub mod store;
