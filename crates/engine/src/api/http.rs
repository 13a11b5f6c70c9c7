//! HTTP routes.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use hearthtalk_domain::{NpcId, SessionId, Turn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::app::App;
use crate::infrastructure::ports::SessionRepo;
use crate::use_cases::conversation::ChatError;

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/", get(health))
        .route("/api/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/npcs", get(list_npcs))
        .route("/api/npcs/{npc_id}/portrait", get(get_portrait))
        .route(
            "/api/sessions/{session_id}/npcs/{npc_id}/history",
            get(get_history),
        )
}

async fn health() -> &'static str {
    "OK"
}

// =============================================================================
// Chat
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub npc_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub npc_reply_text: String,
    pub portrait_url: Option<String>,
    pub metadata: Option<Value>,
}

async fn chat(
    State(app): State<Arc<App>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session_id = parse_session_id(&request.session_id)?;
    let npc_id = parse_npc_id(&request.npc_id)?;

    // Run the exchange on its own task so a dropped connection cannot
    // cancel it between generation and the history append.
    let reply = tokio::spawn(async move {
        app.use_cases
            .conversation
            .handle_message(&session_id, &npc_id, &request.message)
            .await
    })
    .await
    .map_err(|e| ApiError::Internal(format!("chat task failed: {e}")))??;

    Ok(Json(ChatResponse {
        npc_reply_text: reply.npc_reply_text,
        portrait_url: reply.portrait_url,
        metadata: reply.metadata,
    }))
}

// =============================================================================
// NPCs
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct NpcSummary {
    pub id: String,
    pub name: String,
    pub short_description: String,
    pub portrait_url: Option<String>,
}

async fn list_npcs(State(app): State<Arc<App>>) -> Json<Vec<NpcSummary>> {
    let cache = app.use_cases.portrait.cache();
    let mut npcs = Vec::with_capacity(app.roster.len());
    for npc in app.roster.list() {
        let portrait_url = if cache.has(&npc.id).await {
            Some(cache.url_for(&npc.id))
        } else {
            None
        };
        npcs.push(NpcSummary {
            id: npc.id.to_string(),
            name: npc.name.to_string(),
            short_description: npc.short_description.to_string(),
            portrait_url,
        });
    }
    Json(npcs)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PortraitResponse {
    pub portrait_url: Option<String>,
}

async fn get_portrait(
    State(app): State<Arc<App>>,
    Path(npc_id): Path<String>,
) -> Result<Json<PortraitResponse>, ApiError> {
    let npc_id = parse_npc_id(&npc_id)?;
    let npc = app.roster.get(&npc_id).cloned().ok_or(ApiError::NotFound)?;

    let status = tokio::spawn(async move { app.use_cases.portrait.execute(&npc).await })
        .await
        .map_err(|e| ApiError::Internal(format!("portrait task failed: {e}")))?;

    Ok(Json(PortraitResponse {
        portrait_url: status.url().map(str::to_string),
    }))
}

// =============================================================================
// Sessions
// =============================================================================

async fn get_history(
    State(app): State<Arc<App>>,
    Path((session_id, npc_id)): Path<(String, String)>,
) -> Result<Json<Vec<Turn>>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let npc_id = parse_npc_id(&npc_id)?;
    if app.roster.get(&npc_id).is_none() {
        return Err(ApiError::NotFound);
    }
    Ok(Json(app.sessions.get_history(&session_id, &npc_id).await))
}

fn parse_session_id(raw: &str) -> Result<SessionId, ApiError> {
    SessionId::new(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn parse_npc_id(raw: &str) -> Result<NpcId, ApiError> {
    NpcId::new(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
    Internal(String),
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::NotFound => {
                (axum::http::StatusCode::NOT_FOUND, "Not found").into_response()
            }
            ApiError::BadRequest(msg) => {
                (axum::http::StatusCode::BAD_REQUEST, msg).into_response()
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error",
                )
                    .into_response()
            }
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::NpcNotFound(_) => ApiError::NotFound,
            ChatError::EmptyMessage => ApiError::BadRequest(e.to_string()),
            ChatError::Store(_) => ApiError::Internal(e.to_string()),
        }
    }
}
