//! Oracle Routes
//!
//! Routes:
//! - POST /oracle - Answer a question with cited sources
//! - GET /index - Rendered knowledge index

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::models::{Depth, KnowledgeIndex, OracleAnswer};
use crate::{AppState, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/oracle", post(ask))
        .route("/index", get(knowledge_index))
}

#[derive(Debug, Deserialize)]
pub struct OracleRequest {
    pub question: String,
    pub repository: Option<String>,
    #[serde(default)]
    pub depth: Depth,
}

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    pub repository: Option<String>,
    #[serde(default)]
    pub depth: Depth,
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub index: KnowledgeIndex,
    pub rendered: String,
}

/// Answer a question.
///
/// POST /oracle
async fn ask(
    State(state): State<AppState>,
    Json(request): Json<OracleRequest>,
) -> Result<Json<OracleAnswer>> {
    let answer = state
        .oracle
        .ask(&request.question, request.repository.as_deref(), request.depth)
        .await?;
    Ok(Json(answer))
}

/// Build and render the knowledge index.
///
/// GET /index?repository=name&depth=quick|deep
async fn knowledge_index(
    State(state): State<AppState>,
    Query(query): Query<IndexQuery>,
) -> Result<Json<IndexResponse>> {
    let builder = state.oracle.index_builder();
    let index = builder.build(query.repository.as_deref()).await;
    let rendered = builder.render(&index, query.depth);
    Ok(Json(IndexResponse { index, rendered }))
}
