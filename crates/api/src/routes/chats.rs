//! Read-only chat endpoints for agent dashboards and clients

use axum::{extract::State, Json};
use relaydesk_shared::{AgentId, ChatMessage, ChatSummary, Role};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    extract::ApiQuery,
    state::AppState,
};

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub id: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignedQuery {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct ChatListResponse {
    pub chats: Vec<ChatSummary>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Messages of the open chat of a client or agent
pub async fn history(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let role: Role = query.role.parse().map_err(ApiError::BadRequest)?;

    match state.queries().message_history(&query.id, role).await? {
        Some(messages) => Ok(Json(messages)),
        None => Err(ApiError::NotFound(format!(
            "No open chat for {} {}",
            role.as_str(),
            query.id
        ))),
    }
}

/// Open chats nobody has claimed yet
pub async fn unassigned(State(state): State<AppState>) -> ApiResult<Json<ChatListResponse>> {
    let chats = state.queries().unassigned_queue().await?;
    Ok(Json(ChatListResponse { chats }))
}

/// Open chats claimed by one agent
pub async fn assigned(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AssignedQuery>,
) -> ApiResult<Json<ChatListResponse>> {
    let agent_id =
        AgentId::new(query.id).ok_or_else(|| ApiError::BadRequest("Agent id must not be empty".to_string()))?;

    let chats = state.queries().agent_queue(&agent_id).await?;
    Ok(Json(ChatListResponse { chats }))
}
