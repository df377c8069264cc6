//! Per-user notification inbox.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use taskhub_store::{NotificationStore, PreferencesUpdate, StoreError};
use tracing::error;

use super::{ApiError, ApiResult};
use crate::auth::AuthUser;
use crate::server::AppState;

const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 100;

/// Query for the notification list.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Maximum entries returned.
    pub limit: Option<i64>,
}

fn normalize_limit(limit: Option<i64>) -> u32 {
    match limit {
        Some(l) if (1..=i64::from(MAX_LIMIT)).contains(&l) => l as u32,
        _ => DEFAULT_LIMIT,
    }
}

/// `GET /api/notifications`: most recent first.
pub async fn list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let notifications = state
        .chat
        .store
        .notifications(user.id, normalize_limit(query.limit))
        .await?;
    Ok(Json(json!({
        "count": notifications.len(),
        "notifications": notifications,
    })))
}

/// `GET /api/notifications/unread-count`.
pub async fn unread_count(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Value>> {
    let count = state.chat.store.unread_count(user.id).await?;
    Ok(Json(json!({ "unread_count": count })))
}

/// `PUT /api/notifications/{id}/read`.
pub async fn mark_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<u64>,
) -> ApiResult<Json<Value>> {
    match state.chat.store.mark_read(id, user.id).await {
        Ok(()) => Ok(Json(json!({ "message": "Notification marked as read" }))),
        Err(StoreError::NotFound(_)) => Err(ApiError::not_found("Notification not found")),
        Err(e) => Err(e.into()),
    }
}

/// `PUT /api/notifications/read-all`.
pub async fn mark_all_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Value>> {
    let updated = state.chat.store.mark_all_read(user.id).await?;
    Ok(Json(json!({
        "message": "All notifications marked as read",
        "updated": updated,
    })))
}

/// `DELETE /api/notifications/{id}`: only the owner may delete.
pub async fn delete(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<u64>,
) -> ApiResult<Json<Value>> {
    if state.chat.store.delete_notification(id, user.id).await? {
        Ok(Json(json!({ "message": "Notification deleted successfully" })))
    } else {
        Err(ApiError::not_found("Notification not found"))
    }
}

/// `GET /api/notifications/preferences`: defaults are stored on first read.
pub async fn get_preferences(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Value>> {
    let preferences = state.chat.store.preferences(user.id).await?;
    Ok(Json(json!({ "preferences": preferences })))
}

/// `PUT /api/notifications/preferences`: fields left out keep their value.
pub async fn update_preferences(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    body: Result<Json<PreferencesUpdate>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(update) = body.map_err(|_| ApiError::bad_request("Invalid request body"))?;
    let store = &state.chat.store;
    let mut preferences = store.preferences(user.id).await?;
    update.apply(&mut preferences);
    if let Err(e) = store.save_preferences(user.id, &preferences).await {
        error!(user_id = user.id, error = %e, "failed to save notification preferences");
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update preferences",
        ));
    }
    Ok(Json(json!({
        "message": "Preferences updated successfully",
        "preferences": preferences,
    })))
}
