//! API Handlers
//!
//! HTTP request handlers for each operations endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::cache::{current_timestamp, OptimizationReport};
use crate::context::AppContext;
use crate::error::{BotError, Result};
use crate::models::{
    CleanupResponse, HealthResponse, InvalidateRequest, InvalidateResponse, PushRequest,
    PushResponse, StatsResponse, UrgeRequest, UrgeResponse,
};
use crate::notify::FanoutReport;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<AppContext>,
}

impl AppState {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    if state.ctx.is_shutting_down() {
        Json(HealthResponse::stopping())
    } else {
        Json(HealthResponse::healthy())
    }
}

/// Handler for GET /stats
///
/// Returns statistics for every managed cache plus push queue counters.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        caches: state.ctx.caches.get_comprehensive_stats(),
        push_queue: state.ctx.push_queue.stats(),
    })
}

/// Handler for GET /cache/report
pub async fn cache_report_handler(State(state): State<AppState>) -> Json<OptimizationReport> {
    Json(state.ctx.smart.get_optimization_report(current_timestamp()))
}

/// Handler for POST /cache/cleanup
///
/// Runs an expired-entry sweep immediately instead of waiting for the
/// background task.
pub async fn cleanup_handler(State(state): State<AppState>) -> Json<CleanupResponse> {
    let report = state.ctx.caches.cleanup_all_expired();
    info!(removed = report.total(), "Manual cache cleanup");
    Json(CleanupResponse::from(report))
}

/// Handler for POST /cache/invalidate
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(BotError::InvalidRequest(error_msg));
    }

    let removed = state.ctx.caches.invalidate_db_cache(&req.pattern);
    info!(pattern = %req.pattern, removed, "Manual cache invalidation");
    Ok(Json(InvalidateResponse {
        pattern: req.pattern,
        removed,
    }))
}

/// Handler for POST /submissions/:id/notify
///
/// Re-sends the review notice for a submission and returns the fan-out tally.
pub async fn notify_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<FanoutReport>> {
    let report = state.ctx.notifier.notify_new_submission(id).await?;
    Ok(Json(report))
}

/// Handler for POST /submissions/:id/publish
///
/// Posts an approved submission to the configured channels and groups.
pub async fn publish_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<FanoutReport>> {
    let report = state.ctx.notifier.publish_submission(id).await?;
    Ok(Json(report))
}

/// Handler for POST /submissions/:id/urge
///
/// Pushes a review reminder; delivery happens in the background.
pub async fn urge_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UrgeRequest>,
) -> Result<(StatusCode, Json<UrgeResponse>)> {
    if let Some(error_msg) = req.validate() {
        return Err(BotError::InvalidRequest(error_msg));
    }

    state.ctx.notifier.notify_urge(id, req.username.trim());
    Ok((StatusCode::ACCEPTED, Json(UrgeResponse::dispatched(id))))
}

/// Handler for POST /push
///
/// Queues a WxPusher notification; delivery happens in the background.
pub async fn push_handler(
    State(state): State<AppState>,
    Json(req): Json<PushRequest>,
) -> Result<(StatusCode, Json<PushResponse>)> {
    if let Some(error_msg) = req.validate() {
        return Err(BotError::InvalidRequest(error_msg));
    }
    if !state.ctx.wxpusher.is_configured() {
        return Err(BotError::PushNotConfigured("wxpusher"));
    }

    let id = state
        .ctx
        .push_queue
        .queue_push(req.title, req.content, req.uids, req.max_retries)?;
    Ok((StatusCode::ACCEPTED, Json(PushResponse::queued(id))))
}
