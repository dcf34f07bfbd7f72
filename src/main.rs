// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Duration};
use anyhow::Context;
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::refresh_service::RefreshService;
use crate::application::snapshot_store::QuerySnapshotStore;
use crate::application::streaming_service::StreamingDashboardService;
use crate::application::summary_service::SummaryService;
use crate::infrastructure::config::{load_dashboards_config, load_influx_config, load_queries_config};
use crate::infrastructure::influx_repository::InfluxRepository;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{get_summary, health_check, list_dashboards, stream_dashboard};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let influx_config = load_influx_config().context("loading config/influx")?;
    let queries_config = load_queries_config().context("loading config/queries")?;
    let dashboards_config = load_dashboards_config().context("loading config/dashboards")?;
    let server = influx_config.server;

    // Create repository (infrastructure layer)
    let repository = Arc::new(InfluxRepository::new(
        influx_config.influx.host,
        influx_config.influx.token,
        influx_config.influx.database,
        influx_config.influx.retention_policy,
    ));

    // Fill the snapshot once before serving, then keep it fresh
    let store = QuerySnapshotStore::new();
    let refresh = RefreshService::new(
        repository,
        queries_config,
        store.clone(),
        Duration::from_secs(server.refresh_secs),
        server.refresh_jitter,
    );
    refresh.refresh_once().await;
    tokio::spawn(refresh.run());

    // Create services (application layer)
    let streaming_service = StreamingDashboardService::new(
        store.clone(),
        &dashboards_config,
        Duration::from_secs(server.tick_secs),
    );
    let summary_service = SummaryService::new(store, &dashboards_config);

    let state = Arc::new(AppState {
        streaming_service,
        summary_service,
    });

    // Build router (presentation layer)
    // Frames and JSON bodies are compressed by hand, so no CompressionLayer
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/dashboards", get(list_dashboards))
        .route("/dashboards/:id", get(stream_dashboard))
        .route("/summaries/:id", get(get_summary))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", server.bind))?;
    tracing::info!("Starting observatory-telemetry service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
