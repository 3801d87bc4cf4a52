use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::models::chat::{ChatReply, ChatRequest, ClearResponse, HistoryResponse};
use crate::services::{ConversationManager, ConversationStore};
use crate::utils::error::ApiError;

/// Same key for every route: surrounding whitespace is ignored.
fn normalize_user_id(raw: &str) -> Result<String, ApiError> {
    let user_id = raw.trim();
    if user_id.is_empty() {
        return Err(ApiError::BadRequest("user_id must not be empty".to_string()));
    }
    Ok(user_id.to_string())
}

pub async fn chat_handler(
    State(manager): State<Arc<ConversationManager>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let start_time = Instant::now();
    let user_id = normalize_user_id(&request.user_id)?;

    let request_id = uuid::Uuid::new_v4();
    info!(
        "Chat request {}: user={}, message_len={}, image={}",
        request_id,
        user_id,
        request.message.as_deref().map(str::len).unwrap_or(0),
        request.image.is_some()
    );

    let outcome = manager
        .respond(&user_id, request.message.as_deref(), request.image.as_ref())
        .await;

    info!(
        "Chat request {} for user {} done in {}ms",
        request_id,
        user_id,
        start_time.elapsed().as_millis()
    );

    Ok(Json(ChatReply {
        user_id,
        reply: outcome.reply,
        history_len: outcome.history_len,
        timestamp: chrono::Utc::now(),
    }))
}

pub async fn history_handler(
    State(store): State<Arc<ConversationStore>>,
    Path(user_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let user_id = normalize_user_id(&user_id)?;
    let messages = store.context_snapshot(&user_id);
    Ok(Json(HistoryResponse { user_id, messages }))
}

pub async fn clear_history_handler(
    State(manager): State<Arc<ConversationManager>>,
    Path(user_id): Path<String>,
) -> Result<Json<ClearResponse>, ApiError> {
    let user_id = normalize_user_id(&user_id)?;
    let cleared = manager.clear_history(&user_id).await;
    Ok(Json(ClearResponse { user_id, cleared }))
}
