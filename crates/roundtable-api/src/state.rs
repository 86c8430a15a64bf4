//! Shared application state.

use std::sync::Arc;

use roundtable_coordination::application::engine::CoordinationEngine;
use roundtable_coordination::application::timeouts::TimeoutScanner;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The coordination engine every command goes through.
    pub engine: Arc<CoordinationEngine>,
    /// Timeout scanner over the same engine.
    pub scanner: Arc<TimeoutScanner>,
}

impl AppState {
    /// Create new application state around an engine.
    #[must_use]
    pub fn new(engine: Arc<CoordinationEngine>) -> Self {
        let scanner = Arc::new(TimeoutScanner::new(Arc::clone(&engine)));
        Self { engine, scanner }
    }
}
