//! Connection status queries.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::auth::AuthUser;
use crate::server::AppState;
use crate::websocket::registry::OnlineUser;

/// Public status body.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Number of registered sessions.
    pub online_users: usize,
    /// Always `"running"`.
    pub status: &'static str,
}

/// Authenticated status body.
#[derive(Debug, Serialize)]
pub struct DetailedStatusResponse {
    /// Number of registered sessions.
    pub online_users: usize,
    /// Always `"running"`.
    pub status: &'static str,
    /// Snapshot of online users.
    pub users: Vec<OnlineUser>,
    /// Number of live rooms.
    pub rooms: usize,
}

/// `GET /api/ws/status`.
pub async fn public_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        online_users: state.chat.registry.count(),
        status: "running",
    })
}

/// `GET /api/chat/ws/status`.
pub async fn detailed_status(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
) -> Json<DetailedStatusResponse> {
    let registry = &state.chat.registry;
    let users = registry.list_online();
    Json(DetailedStatusResponse {
        online_users: users.len(),
        status: "running",
        users,
        rooms: registry.rooms().room_count(),
    })
}
