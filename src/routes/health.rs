//! Health check endpoint
//!
//! `/health` (and `/healthz`) answers 200 while the database answers a count
//! query, 503 otherwise. No authentication.

use hyper::StatusCode;
use serde::Serialize;

use super::{json_response, JsonResponse};
use crate::db::DbStats;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    /// "online" or "degraded"
    pub status: &'static str,
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<DbStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn health_check(state: &AppState) -> JsonResponse {
    let (status, response) = match state.db.stats() {
        Ok(stats) => (
            StatusCode::OK,
            HealthResponse {
                healthy: true,
                status: "online",
                version: env!("CARGO_PKG_VERSION"),
                uptime: state.started_at.elapsed().as_secs(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                stats: Some(stats),
                error: None,
            },
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            HealthResponse {
                healthy: false,
                status: "degraded",
                version: env!("CARGO_PKG_VERSION"),
                uptime: state.started_at.elapsed().as_secs(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                stats: None,
                error: Some(e.to_string()),
            },
        ),
    };

    json_response(status, &response)
}
