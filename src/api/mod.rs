//! API Routes for devjournal
//!
//! This module combines all API routes into a single router.
//! Routes are organized by domain.

pub mod mcp;
mod oracle;
pub mod status;
mod sync;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Build the complete API router.
///
/// Route structure:
/// - /linear/*, /notes/* - Sync passes and cache reads
/// - /oracle, /index - Question answering and the knowledge index
/// - /mcp - MCP JSON-RPC endpoint
/// - /health, /status - Health checks
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(status::routes())
        .merge(sync::routes())
        .merge(oracle::routes())
        .merge(mcp::routes())
}

/// Full application with tracing and CORS layers applied.
pub fn app(state: AppState) -> Router {
    routes()
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
