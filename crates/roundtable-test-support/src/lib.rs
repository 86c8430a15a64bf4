//! Shared test doubles for the Roundtable turn engine.

mod clock;
mod ids;
mod store;

pub use clock::{FixedClock, ManualClock};
pub use ids::SequenceIds;
pub use store::{FailingSessionStore, InMemorySessionStore};
