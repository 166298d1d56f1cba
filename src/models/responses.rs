//! Response DTOs for the operations API
//!
//! Defines the structure of outgoing HTTP response bodies.

use indexmap::IndexMap;
use serde::Serialize;
use uuid::Uuid;

use crate::cache::{CacheKind, CleanupReport, ComprehensiveStats};
use crate::push::PushQueueStats;

/// Response body for GET /stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub caches: ComprehensiveStats,
    pub push_queue: PushQueueStats,
}

/// Response body for POST /cache/cleanup
#[derive(Debug, Clone, Serialize)]
pub struct CleanupResponse {
    /// Expired entries removed per cache
    pub removed: IndexMap<CacheKind, usize>,
    pub total: usize,
}

impl From<CleanupReport> for CleanupResponse {
    fn from(report: CleanupReport) -> Self {
        let total = report.total();
        Self {
            removed: report.removed,
            total,
        }
    }
}

/// Response body for POST /cache/invalidate
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub pattern: String,
    pub removed: usize,
}

/// Response body for POST /push
#[derive(Debug, Clone, Serialize)]
pub struct PushResponse {
    pub id: Uuid,
    pub message: String,
}

impl PushResponse {
    pub fn queued(id: Uuid) -> Self {
        Self {
            id,
            message: "Push message queued".to_string(),
        }
    }
}

/// Response body for POST /submissions/:id/urge
#[derive(Debug, Clone, Serialize)]
pub struct UrgeResponse {
    pub submission_id: i64,
    pub message: String,
}

impl UrgeResponse {
    pub fn dispatched(submission_id: i64) -> Self {
        Self {
            submission_id,
            message: "Review reminder dispatched".to_string(),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status ("healthy" or "stopping")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self::with_status("healthy")
    }

    pub fn stopping() -> Self {
        Self::with_status("stopping")
    }

    fn with_status(status: &str) -> Self {
        Self {
            status: status.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
