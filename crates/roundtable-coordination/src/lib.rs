//! Roundtable — session and turn coordination.
//!
//! The domain layer holds the two state machines and the commands that drive
//! them. The application layer rehydrates machines per request, runs the
//! engine operations under optimistic concurrency, and scans for sessions
//! that have gone quiet past their SLA.

pub mod application;
pub mod domain;
