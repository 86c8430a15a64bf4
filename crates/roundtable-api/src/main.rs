//! Roundtable API server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use roundtable_api::config::ServerConfig;
use roundtable_api::error::AppError;
use roundtable_api::state::AppState;
use roundtable_api::{app, scan_loop, telemetry};
use roundtable_coordination::application::engine::{CoordinationEngine, EngineConfig};
use roundtable_core::clock::SystemClock;
use roundtable_core::ids::RandomSessionIds;
use roundtable_store::pg_session_store::PgSessionStore;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();
    let telemetry = telemetry::init(otlp_endpoint.as_deref())?;

    tracing::info!(
        otlp = telemetry.exporting(),
        "Starting Roundtable API server"
    );

    let config = ServerConfig::from_env()?;

    // Create database connection pool and bring the schema up to date.
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    roundtable_store::MIGRATOR.run(&pool).await?;

    let engine = Arc::new(CoordinationEngine::new(
        Arc::new(PgSessionStore::new(pool)),
        Arc::new(SystemClock),
        Arc::new(RandomSessionIds),
        EngineConfig {
            catalog: config.catalog.clone(),
            max_conflict_retries: config.max_conflict_retries,
            ..EngineConfig::default()
        },
    ));
    let app_state = AppState::new(engine);

    let scan_task = config.scan_interval.map(|period| {
        scan_loop::spawn(
            Arc::clone(&app_state.scanner),
            period,
            config.scan_max_sessions,
        )
    });

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let router = app(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Some(task) = scan_task {
        task.abort();
    }
    telemetry.shutdown();
    served?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
