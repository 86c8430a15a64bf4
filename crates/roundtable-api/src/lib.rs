//! Roundtable HTTP API: routes, shared state, configuration and telemetry.

pub mod config;
pub mod error;
pub mod routes;
pub mod scan_loop;
pub mod state;
pub mod telemetry;

use axum::Router;

use crate::state::AppState;

/// Builds the full application router. `main.rs` layers HTTP tracing and CORS
/// on top of this.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/sessions", routes::sessions::router())
        .nest("/api/v1/timeouts", routes::timeouts::router())
        .with_state(state)
}
