//! Observability HTTP surface: an `axum::Router` built from a cloneable
//! `ApiState`, narrowed to read-only inspection. Operator actions like
//! force-sync and reset-failed are chat-bot commands, not HTTP endpoints.

use axum::{extract::State, extract::Path as AxumPath, extract::Query, routing::get, Json, Router};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::{SyncLogRepository, TrackRepository};
use crate::error::{AppError, Result};
use crate::metrics::{metrics_handler, MetricsCollector};
use crate::models::{Direction, LogEntry, Track};

#[derive(Clone)]
pub struct ApiState {
    pub tracks: TrackRepository,
    pub logs: SyncLogRepository,
    pub metrics: Arc<MetricsCollector>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_endpoint))
        .route("/tracks", get(list_tracks))
        .route("/tracks/:id", get(get_track))
        .route("/tracks/:id/logs", get(get_track_logs))
        .route("/stats", get(get_stats))
        .route("/logs", get(get_recent_logs))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Ready iff the database pool answers a trivial query.
async fn readyz(State(state): State<ApiState>) -> Result<&'static str> {
    sqlx::query("SELECT 1").execute(state.tracks.pool()).await?;
    Ok("ready")
}

async fn metrics_endpoint(State(state): State<ApiState>) -> impl axum::response::IntoResponse {
    metrics_handler(axum::extract::State(state.metrics)).await
}

#[derive(Debug, Deserialize)]
struct DirectionQuery {
    direction: Option<String>,
    limit: Option<i64>,
}

fn parse_direction(raw: &Option<String>) -> Result<Option<Direction>> {
    match raw {
        None => Ok(None),
        Some(s) => Direction::from_str_opt(s)
            .map(Some)
            .ok_or_else(|| AppError::Config(format!("unknown direction {s}"))),
    }
}

async fn list_tracks(
    State(state): State<ApiState>,
    Query(query): Query<DirectionQuery>,
) -> Result<Json<Vec<Track>>> {
    let direction = parse_direction(&query.direction)?;
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    Ok(Json(state.tracks.get_recent(limit, direction).await?))
}

async fn get_track(State(state): State<ApiState>, AxumPath(id): AxumPath<i64>) -> Result<Json<Track>> {
    Ok(Json(state.tracks.require(id).await?))
}

async fn get_track_logs(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<Vec<LogEntry>>> {
    Ok(Json(state.logs.get_logs_for_track(id).await?))
}

async fn get_stats(State(state): State<ApiState>) -> Result<Json<crate::db::TrackStats>> {
    Ok(Json(state.tracks.get_stats().await?))
}

async fn get_recent_logs(
    State(state): State<ApiState>,
    Query(query): Query<DirectionQuery>,
) -> Result<Json<Vec<LogEntry>>> {
    let direction = parse_direction(&query.direction)?;
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    Ok(Json(state.logs.get_recent_logs(limit, direction).await?))
}
