// HTTP request handlers
use crate::application::streaming_service::OpenStreamError;
use crate::infrastructure::chunked_frames::stream_from_receiver;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize, PartialEq)]
pub struct ViewListing {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ViewList {
    pub dashboards: Vec<ViewListing>,
    pub summaries: Vec<ViewListing>,
}

fn listings(views: Vec<(String, String)>) -> Vec<ViewListing> {
    views
        .into_iter()
        .map(|(id, title)| ViewListing { id, title })
        .collect()
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// List configured dashboards and facility summaries
pub async fn list_dashboards(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let list = ViewList {
        dashboards: listings(state.streaming_service.dashboards()),
        summaries: listings(state.summary_service.summaries()),
    };

    match json_response(&list, accepts_brotli(&headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

/// Open a live dashboard: skeleton, initial rows, then appended rows per tick
pub async fn stream_dashboard(
    Path(id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    match state.streaming_service.open_stream(&id) {
        Ok(rx) => stream_from_receiver(rx, accepts_brotli(&headers))
            .await
            .into_response(),
        Err(OpenStreamError::UnknownDashboard(id)) => {
            (StatusCode::NOT_FOUND, format!("unknown dashboard {}", id)).into_response()
        }
        Err(OpenStreamError::Session(e)) => {
            tracing::warn!("Dashboard {} failed to open: {}", id, e);
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
    }
}

/// Latest values of one facility summary
pub async fn get_summary(
    Path(id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    match state.summary_service.get_summary(&id, Utc::now()) {
        None => (StatusCode::NOT_FOUND, format!("unknown summary {}", id)).into_response(),
        Some(Err(e)) => {
            tracing::warn!("Summary {} unavailable: {}", id, e);
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
        Some(Ok(summary)) => match json_response(&summary, accepts_brotli(&headers)).await {
            Ok(response) => response,
            Err(status) => status.into_response(),
        },
    }
}
