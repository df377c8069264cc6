//! Team chat REST endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use taskhub_core::{ChatRole, MessageType, RoomId};
use taskhub_store::{MessageStore, ParticipantStore, RoomStore, StoredMessage};
use tracing::info;

use super::{ApiError, ApiResult};
use crate::auth::AuthUser;
use crate::server::AppState;
use crate::websocket::handler::{ChatError, post_message};

const DEFAULT_PAGE_LIMIT: u32 = 50;
const MAX_PAGE_LIMIT: u32 = 100;

/// `GET /api/chat/team-chat`: get or create the team chat and join the caller.
pub async fn team_chat(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Value>> {
    let store = &state.chat.store;
    let room = store.get_or_create_team_chat(&user).await?;
    store.add_participant(room.id, &user, ChatRole::Member).await?;
    info!(room_id = room.id, user_id = user.id, "team chat ready");
    Ok(Json(json!({
        "message": "Team chat ready",
        "room": {
            "id": room.id,
            "name": room.name,
            "description": room.description,
            "created_at": room.created_at,
        },
    })))
}

/// Body of `POST /api/chat/rooms/{room_id}/messages`.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Message body.
    pub content: String,
    /// Content kind, text when absent.
    #[serde(default)]
    pub message_type: Option<MessageType>,
    /// Message being replied to.
    #[serde(default)]
    pub reply_to_id: Option<u64>,
}

/// `POST /api/chat/rooms/{room_id}/messages`: persist and broadcast a message.
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<RoomId>,
    Json(body): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if body.content.trim().is_empty() {
        return Err(ChatError::EmptyContent.into());
    }
    let event = post_message(
        &state.chat,
        &user,
        room_id,
        body.content,
        body.message_type.unwrap_or_default(),
        body.reply_to_id,
        None,
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Message sent successfully",
            "chat_message": {
                "id": event.message_id,
                "content": event.content,
                "sender": event.sender_name,
                "created_at": event.created_at,
            },
        })),
    ))
}

/// Paging query for the message history.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    /// 1-based page.
    pub page: Option<i64>,
    /// Page size.
    pub limit: Option<i64>,
}

/// Clamp paging input: page below 1 becomes 1, limit outside `1..=100` becomes 50.
pub fn normalize_paging(query: &PageQuery) -> (u32, u32) {
    let page = query.page.unwrap_or(1).clamp(1, i64::from(u32::MAX)) as u32;
    let limit = match query.limit {
        Some(l) if (1..=i64::from(MAX_PAGE_LIMIT)).contains(&l) => l as u32,
        _ => DEFAULT_PAGE_LIMIT,
    };
    (page, limit)
}

/// One entry of the message history.
#[derive(Debug, Serialize)]
pub struct MessageView {
    /// Message ID.
    pub id: u64,
    /// Body.
    pub content: String,
    /// Author's display name.
    pub sender: String,
    /// Author's user ID.
    pub sender_id: u64,
    /// Content kind.
    pub message_type: MessageType,
    /// Message being replied to.
    pub reply_to_id: Option<u64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<StoredMessage> for MessageView {
    fn from(m: StoredMessage) -> Self {
        Self {
            id: m.id,
            content: m.content,
            sender: m.sender_name,
            sender_id: m.sender_id,
            message_type: m.message_type,
            reply_to_id: m.reply_to_id,
            created_at: m.created_at,
        }
    }
}

/// `GET /api/chat/rooms/{room_id}/messages`: one page of history, newest first.
pub async fn list_messages(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<RoomId>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let store = &state.chat.store;
    if store.participant(room_id, user.id).await?.is_none() {
        return Err(ChatError::NotParticipant.into());
    }
    let (page, limit) = normalize_paging(&query);
    let messages: Vec<MessageView> = store
        .messages(room_id, page, limit)
        .await?
        .into_iter()
        .map(MessageView::from)
        .collect();
    Ok(Json(json!({
        "messages": messages,
        "page": page,
        "limit": limit,
    })))
}

/// `GET /api/chat/rooms/{room_id}/members`.
pub async fn members(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(room_id): Path<RoomId>,
) -> ApiResult<Json<Value>> {
    let members = state.chat.store.members(room_id).await.map_err(|e| {
        tracing::warn!(room_id, error = %e, "failed to list room members");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get room members")
    })?;
    Ok(Json(json!({ "members": members })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(page: Option<i64>, limit: Option<i64>) -> PageQuery {
        PageQuery { page, limit }
    }

    #[test]
    fn paging_defaults() {
        assert_eq!(normalize_paging(&PageQuery::default()), (1, 50));
    }

    #[test]
    fn paging_clamps_page() {
        assert_eq!(normalize_paging(&q(Some(0), None)), (1, 50));
        assert_eq!(normalize_paging(&q(Some(-4), None)), (1, 50));
        assert_eq!(normalize_paging(&q(Some(3), None)), (3, 50));
    }

    #[test]
    fn paging_limit_out_of_range_falls_back() {
        assert_eq!(normalize_paging(&q(None, Some(0))), (1, 50));
        assert_eq!(normalize_paging(&q(None, Some(101))), (1, 50));
        assert_eq!(normalize_paging(&q(None, Some(100))), (1, 100));
        assert_eq!(normalize_paging(&q(None, Some(1))), (1, 1));
    }
}
