//! Status Routes
//!
//! Health checks and status endpoints.
//!
//! Routes:
//! - GET /health - Basic health check with a database round trip
//! - GET /health/live - Liveness check (server responding)
//! - GET /status - Detailed system status

use std::sync::OnceLock;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{self, PoolStats};
use crate::models::{CacheKind, CacheStats};
use crate::services::{LINEAR_SOURCE, NOTES_SOURCE};
use crate::{AppState, Result};

static STARTUP_TIME: OnceLock<Instant> = OnceLock::new();

/// Initialize startup time. Call this once at server start.
pub fn init_startup_time() {
    let _ = STARTUP_TIME.get_or_init(Instant::now);
}

fn get_uptime_seconds() -> u64 {
    STARTUP_TIME.get().map(|start| start.elapsed().as_secs()).unwrap_or(0)
}

/// Build status routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness_check))
        .route("/status", get(system_status))
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub database: HealthStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct SystemStatusResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub database: PoolStats,
    pub llm: LlmStatus,
    pub sources: Vec<SourceStatus>,
}

#[derive(Debug, Serialize)]
pub struct LlmStatus {
    pub available: bool,
    pub providers: Vec<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SourceStatus {
    pub kind: CacheKind,
    pub last_sync: Option<String>,
    pub stats: CacheStats,
}

// ============================================================================
// Handlers
// ============================================================================

/// Basic health check.
///
/// GET /health
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match db::health_check(&state.db).await {
        Ok(()) => HealthStatus::Healthy,
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            HealthStatus::Unhealthy
        }
    };

    let status = if database == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: database,
            version: env!("CARGO_PKG_VERSION").into(),
            database,
            timestamp: Utc::now(),
        }),
    )
}

/// Liveness check.
///
/// GET /health/live
async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Detailed system status.
///
/// GET /status
async fn system_status(State(state): State<AppState>) -> Result<Json<SystemStatusResponse>> {
    let mut sources = Vec::with_capacity(CacheKind::ALL.len());
    for kind in CacheKind::ALL {
        let source = match kind {
            CacheKind::Note => NOTES_SOURCE,
            _ => LINEAR_SOURCE,
        };
        sources.push(SourceStatus {
            kind,
            last_sync: state.sync.last_sync(source).await?,
            stats: db::cache_stats(&state.db, kind).await?,
        });
    }

    let llm = LlmStatus {
        available: state.llm.is_available(),
        providers: state.llm.providers(),
        last_error: state.llm.error_info().await.map(|(msg, _)| msg),
    };

    let status = if llm.available {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    Ok(Json(SystemStatusResponse {
        status,
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_seconds: get_uptime_seconds(),
        database: db::get_pool_stats(&state.db),
        llm,
        sources,
    }))
}
