//! MCP Routes
//!
//! Model Context Protocol (MCP) JSON-RPC endpoint for assistant integration.
//! Tools only call the sync, index and oracle services and relay their output.
//!
//! Routes:
//! - POST /mcp - JSON-RPC 2.0 requests from client

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db;
use crate::models::{CacheKind, Depth};
use crate::services::{
    LinearSyncOptions, NotesSyncOptions, SummaryMode, LINEAR_SOURCE, NOTES_SOURCE,
};
use crate::{AppState, Result};

/// Build MCP routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/mcp", post(handle_mcp_post))
}

// ============================================================================
// JSON-RPC Types
// ============================================================================

/// JSON-RPC 2.0 request.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(JsonRpcError { code, message }),
        }
    }
}

// JSON-RPC error codes
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;

// ============================================================================
// MCP Tool Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDefinition {
    name: &'static str,
    description: &'static str,
    input_schema: Value,
}

/// MCP tools/call parameters.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

// ============================================================================
// Handlers
// ============================================================================

/// Handle MCP JSON-RPC POST request.
///
/// POST /mcp
async fn handle_mcp_post(
    State(state): State<AppState>,
    Json(request): Json<JsonRpcRequest>,
) -> Response {
    if request.jsonrpc != "2.0" {
        return Json(JsonRpcResponse::error(
            request.id,
            INVALID_REQUEST,
            "Invalid JSON-RPC version".into(),
        ))
        .into_response();
    }

    let response = match request.method.as_str() {
        "initialize" => handle_initialize(request.id),
        "notifications/initialized" | "initialized" => {
            return StatusCode::ACCEPTED.into_response();
        }
        "ping" => JsonRpcResponse::success(request.id, json!({})),
        "tools/list" => handle_tools_list(request.id),
        "tools/call" => handle_tools_call(&state, request.id, request.params).await,
        "resources/list" => JsonRpcResponse::success(request.id, json!({ "resources": [] })),
        _ => JsonRpcResponse::error(
            request.id,
            METHOD_NOT_FOUND,
            format!("Method not found: {}", request.method),
        ),
    };

    Json(response).into_response()
}

fn handle_initialize(id: Option<Value>) -> JsonRpcResponse {
    JsonRpcResponse::success(
        id,
        json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": {
                "name": "devjournal",
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {
                "tools": {}
            }
        }),
    )
}

fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "oracle_ask",
            description: "Answer a question from the journal, cached issues, projects and notes, citing sources",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "question": { "type": "string", "description": "The question to answer" },
                    "repository": { "type": "string", "description": "Limit journal entries and issues to one repository" },
                    "depth": { "type": "string", "enum": ["quick", "deep"], "default": "quick" }
                },
                "required": ["question"]
            }),
        },
        ToolDefinition {
            name: "knowledge_index",
            description: "Show the knowledge index the oracle answers from",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "repository": { "type": "string", "description": "Optional repository scope" },
                    "depth": { "type": "string", "enum": ["quick", "deep"], "default": "quick" }
                },
                "required": []
            }),
        },
        ToolDefinition {
            name: "linear_sync",
            description: "Mirror Linear projects and issues into the local cache",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "include_completed": { "type": "boolean", "default": false, "description": "Keep completed and cancelled items" },
                    "api_key": { "type": "string", "description": "Linear API key for this sync only" },
                    "detach_summaries": { "type": "boolean", "default": false, "description": "Generate summaries after returning" }
                },
                "required": []
            }),
        },
        ToolDefinition {
            name: "notes_sync",
            description: "Mirror notes into the local cache",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "api_key": { "type": "string", "description": "Notes API key for this sync only" },
                    "detach_summaries": { "type": "boolean", "default": false }
                },
                "required": []
            }),
        },
        ToolDefinition {
            name: "sync_status",
            description: "Last sync time and cache counts for every integration",
            input_schema: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        },
    ]
}

fn handle_tools_list(id: Option<Value>) -> JsonRpcResponse {
    JsonRpcResponse::success(id, json!({ "tools": tool_definitions() }))
}

async fn handle_tools_call(state: &AppState, id: Option<Value>, params: Value) -> JsonRpcResponse {
    let call_params: ToolCallParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => {
            return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid params: {}", e));
        }
    };

    let result = match call_params.name.as_str() {
        "oracle_ask" => execute_oracle_ask(state, call_params.arguments).await,
        "knowledge_index" => execute_knowledge_index(state, call_params.arguments).await,
        "linear_sync" => execute_linear_sync(state, call_params.arguments).await,
        "notes_sync" => execute_notes_sync(state, call_params.arguments).await,
        "sync_status" => execute_sync_status(state).await,
        _ => {
            return JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Tool not found: {}", call_params.name),
            );
        }
    };

    let (text, is_error) = match result {
        Ok(text) => (text, false),
        Err(e) => {
            tracing::warn!(tool = %call_params.name, error = %e, "MCP tool failed");
            (format!("Error: {}", e), true)
        }
    };

    let mut body = json!({ "content": [{ "type": "text", "text": text }] });
    if is_error {
        body["isError"] = json!(true);
    }
    JsonRpcResponse::success(id, body)
}

// ============================================================================
// Tool Implementations
// ============================================================================

/// Null arguments behave like an empty object.
fn arguments<T: serde::de::DeserializeOwned>(args: Value) -> Result<T> {
    let args = if args.is_null() { json!({}) } else { args };
    Ok(serde_json::from_value(args)?)
}

async fn execute_oracle_ask(state: &AppState, args: Value) -> Result<String> {
    #[derive(Deserialize)]
    struct Params {
        question: String,
        repository: Option<String>,
        #[serde(default)]
        depth: Depth,
    }

    let params: Params = arguments(args)?;
    let answer = state
        .oracle
        .ask(&params.question, params.repository.as_deref(), params.depth)
        .await?;

    Ok(serde_json::to_string_pretty(&answer)?)
}

async fn execute_knowledge_index(state: &AppState, args: Value) -> Result<String> {
    #[derive(Deserialize)]
    struct Params {
        repository: Option<String>,
        #[serde(default)]
        depth: Depth,
    }

    let params: Params = arguments(args)?;
    let builder = state.oracle.index_builder();
    let index = builder.build(params.repository.as_deref()).await;

    Ok(builder.render(&index, params.depth))
}

fn summary_mode(detach: bool) -> SummaryMode {
    if detach {
        SummaryMode::Detached
    } else {
        SummaryMode::Inline
    }
}

async fn execute_linear_sync(state: &AppState, args: Value) -> Result<String> {
    #[derive(Deserialize)]
    struct Params {
        #[serde(default)]
        include_completed: bool,
        api_key: Option<String>,
        #[serde(default)]
        detach_summaries: bool,
    }

    let params: Params = arguments(args)?;
    let result = state
        .sync
        .sync_linear(LinearSyncOptions {
            include_completed: params.include_completed,
            api_key: params.api_key,
            summaries: summary_mode(params.detach_summaries),
        })
        .await?;

    Ok(serde_json::to_string_pretty(&json!({
        "projects": result.projects,
        "issues": result.issues,
        "lastSync": state.sync.last_sync(LINEAR_SOURCE).await?,
    }))?)
}

async fn execute_notes_sync(state: &AppState, args: Value) -> Result<String> {
    #[derive(Deserialize)]
    struct Params {
        api_key: Option<String>,
        #[serde(default)]
        detach_summaries: bool,
    }

    let params: Params = arguments(args)?;
    let result = state
        .sync
        .sync_notes(NotesSyncOptions {
            api_key: params.api_key,
            summaries: summary_mode(params.detach_summaries),
        })
        .await?;

    Ok(serde_json::to_string_pretty(&json!({
        "notes": result.notes,
        "lastSync": state.sync.last_sync(NOTES_SOURCE).await?,
    }))?)
}

async fn execute_sync_status(state: &AppState) -> Result<String> {
    Ok(serde_json::to_string_pretty(&json!({
        "linear": {
            "lastSync": state.sync.last_sync(LINEAR_SOURCE).await?,
            "projects": db::cache_stats(&state.db, CacheKind::LinearProject).await?,
            "issues": db::cache_stats(&state.db, CacheKind::LinearIssue).await?,
        },
        "notes": {
            "lastSync": state.sync.last_sync(NOTES_SOURCE).await?,
            "notes": db::cache_stats(&state.db, CacheKind::Note).await?,
        }
    }))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_definitions_are_unique() {
        let tools = tool_definitions();
        let mut names: Vec<&str> = tools.iter().map(|t| t.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 5);

        let value = serde_json::to_value(&tools[0]).unwrap();
        assert!(value["inputSchema"]["required"].is_array());
    }

    #[test]
    fn test_null_arguments_read_as_empty_object() {
        #[derive(Deserialize)]
        struct Params {
            #[serde(default)]
            flag: bool,
        }
        let params: Params = arguments(Value::Null).unwrap();
        assert!(!params.flag);
    }
}
