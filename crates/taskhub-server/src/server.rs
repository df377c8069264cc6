//! `ChatServer`: axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use taskhub_store::ChatStore;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api;
use crate::auth::{AuthUser, JwtAuth};
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::notify::Notifier;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::handler::ChatContext;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::rooms::RoomRegistry;
use crate::websocket::session::run_session;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registries, broadcaster and store.
    pub chat: Arc<ChatContext>,
    /// Notification bridge.
    pub notifier: Notifier,
    /// Token verifier.
    pub auth: Arc<JwtAuth>,
    /// Runtime configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics_handle: PrometheusHandle,
}

impl FromRef<AppState> for Arc<JwtAuth> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.auth)
    }
}

/// The chat server.
pub struct ChatServer {
    state: AppState,
    shutdown: Arc<ShutdownCoordinator>,
}

impl ChatServer {
    /// Create a server over `store`.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn ChatStore>,
        auth: JwtAuth,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::with_limit(config.max_connections));
        let shutdown = Arc::new(ShutdownCoordinator::new(Arc::clone(&registry)));
        let chat = Arc::new(ChatContext::new(registry, Arc::clone(&store)));
        let notifier = Notifier::new(chat.broadcaster.clone(), store);
        Self {
            state: AppState {
                chat,
                notifier,
                auth: Arc::new(auth),
                config: Arc::new(config),
                start_time: Instant::now(),
                metrics_handle,
            },
            shutdown,
        }
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .route("/ws/chat", get(ws_handler))
            .route("/api/ws/status", get(api::status::public_status))
            .route("/api/chat/ws/status", get(api::status::detailed_status))
            .route("/api/chat/team-chat", get(api::chat::team_chat))
            .route(
                "/api/chat/rooms/{room_id}/messages",
                post(api::chat::send_message).get(api::chat::list_messages),
            )
            .route("/api/chat/rooms/{room_id}/members", get(api::chat::members))
            .route("/api/notifications", get(api::notifications::list))
            .route(
                "/api/notifications/unread-count",
                get(api::notifications::unread_count),
            )
            .route(
                "/api/notifications/read-all",
                put(api::notifications::mark_all_read),
            )
            .route(
                "/api/notifications/preferences",
                get(api::notifications::get_preferences).put(api::notifications::update_preferences),
            )
            .route(
                "/api/notifications/{id}",
                delete(api::notifications::delete),
            )
            .route(
                "/api/notifications/{id}/read",
                put(api::notifications::mark_read),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind and serve until the shutdown token fires.
    ///
    /// Returns the bound address and the serve task. When the token fires the
    /// listener stops accepting, every session is torn down, and the task
    /// completes once in-flight connections finish.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let config = &self.state.config;
        let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "chat server listening");

        let router = self.router();
        let shutdown = Arc::clone(&self.shutdown);
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.sessions_closed().await })
                .await
            {
                warn!(error = %e, "server exited with error");
            }
            info!("chat server stopped");
        });
        Ok((addr, handle))
    }

    /// Connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.state.chat.registry
    }

    /// Room registry.
    pub fn rooms(&self) -> &RoomRegistry {
        self.state.chat.registry.rooms()
    }

    /// Chat context shared by sessions and REST handlers.
    pub fn context(&self) -> &Arc<ChatContext> {
        &self.state.chat
    }

    /// Notification bridge.
    pub fn notifier(&self) -> &Notifier {
        &self.state.notifier
    }

    /// Token verifier.
    pub fn auth(&self) -> &Arc<JwtAuth> {
        &self.state.auth
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = &state.chat.registry;
    Json(health::health_check(
        state.start_time,
        registry.count(),
        registry.rooms().room_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics_handle)
}

/// GET /ws, /ws/chat: authenticate, then upgrade into a chat session.
async fn ws_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    let config = Arc::clone(&state.config);
    // `register` enforces the same rules after the upgrade; this only spares
    // the handshake when the outcome is already known.
    if let Err(e) = state.chat.registry.check_admission(user.id) {
        warn!(user_id = user.id, max = config.max_connections, error = %e, "upgrade refused");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response();
    }
    let chat = Arc::clone(&state.chat);
    ws.max_message_size(config.max_message_size)
        .max_frame_size(config.max_message_size)
        .on_upgrade(move |socket| run_session(socket, user, chat, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, header};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use std::time::Duration;
    use taskhub_core::{ChatRole, Participant, UserIdentity};
    use taskhub_store::{MemoryChatStore, MessageStore, NotificationStore, RoomStore};
    use tower::ServiceExt;

    fn make_server() -> (ChatServer, Arc<MemoryChatStore>) {
        let store = Arc::new(MemoryChatStore::new());
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let server = ChatServer::new(
            ServerConfig::default(),
            store.clone(),
            JwtAuth::new("test-secret"),
            handle,
        );
        (server, store)
    }

    fn user(id: u64, name: &str) -> UserIdentity {
        UserIdentity {
            id,
            username: name.into(),
            role: "employee".into(),
        }
    }

    fn bearer(server: &ChatServer, id: u64) -> String {
        let token = server
            .auth()
            .issue(&user(id, &format!("user{id}")), Duration::from_secs(300))
            .unwrap();
        format!("Bearer {token}")
    }

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }

    fn get_req(uri: &str, auth: Option<&str>) -> Request<Body> {
        let mut b = Request::builder().uri(uri);
        if let Some(a) = auth {
            b = b.header(header::AUTHORIZATION, a);
        }
        b.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (server, _) = make_server();
        let (status, body) = call(server.router(), get_req("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["rooms"], 0);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_text() {
        let (server, _) = make_server();
        let resp = server
            .router()
            .oneshot(get_req("/metrics", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_requires_token() {
        let (server, _) = make_server();
        let (status, body) = call(server.router(), get_req("/ws", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authorization token required");

        let (status, _) = call(server.router(), get_req("/ws?token=junk", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn public_status_counts_online_users() {
        let (server, _) = make_server();
        let (status, body) = call(server.router(), get_req("/api/ws/status", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["online_users"], 0);
        assert_eq!(body["status"], "running");
    }

    #[tokio::test]
    async fn detailed_status_requires_auth() {
        let (server, _) = make_server();
        let (status, _) = call(server.router(), get_req("/api/chat/ws/status", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let auth = bearer(&server, 1);
        let (status, body) =
            call(server.router(), get_req("/api/chat/ws/status", Some(&auth))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["users"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn team_chat_is_created_and_joined() {
        let (server, store) = make_server();
        let auth = bearer(&server, 1);
        let (status, body) =
            call(server.router(), get_req("/api/chat/team-chat", Some(&auth))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Team chat ready");
        assert_eq!(body["room"]["name"], "Team Chat");
        let room_id = body["room"]["id"].as_u64().unwrap();

        let auth2 = bearer(&server, 2);
        let (_, body2) =
            call(server.router(), get_req("/api/chat/team-chat", Some(&auth2))).await;
        assert_eq!(body2["room"]["id"].as_u64().unwrap(), room_id);
        assert_eq!(store.members(room_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn send_and_list_messages() {
        let (server, store) = make_server();
        let room = store.create_room("general", "", &user(1, "user1")).await.unwrap();
        let auth = bearer(&server, 1);
        let uri = format!("/api/chat/rooms/{}/messages", room.id);

        let req = Request::builder()
            .method("POST")
            .uri(&uri)
            .header(header::AUTHORIZATION, &auth)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"content":"hello"}"#))
            .unwrap();
        let (status, body) = call(server.router(), req).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Message sent successfully");
        assert_eq!(body["chat_message"]["content"], "hello");
        assert_eq!(body["chat_message"]["sender"], "user1");

        let (status, body) = call(
            server.router(),
            get_req(&format!("{uri}?page=0&limit=500"), Some(&auth)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["page"], 1);
        assert_eq!(body["limit"], 50);
        assert_eq!(body["messages"][0]["content"], "hello");
        assert!(store.room(room.id).await.unwrap().unwrap().last_message.is_some());
        assert_eq!(store.messages(room.id, 1, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn read_only_participant_cannot_post() {
        let (server, store) = make_server();
        store.insert_participant(
            Participant {
                room_id: 5,
                user_id: 3,
                username: "user3".into(),
                role: ChatRole::ReadOnly,
                is_blocked: false,
            },
            "employee",
        );
        let req = Request::builder()
            .method("POST")
            .uri("/api/chat/rooms/5/messages")
            .header(header::AUTHORIZATION, bearer(&server, 3))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"content":"hi"}"#))
            .unwrap();
        let (status, body) = call(server.router(), req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "You cannot send messages to this room");
        assert_eq!(store.message_count(), 0);
    }

    #[tokio::test]
    async fn non_participant_cannot_read_history() {
        let (server, store) = make_server();
        let room = store.create_room("private", "", &user(1, "user1")).await.unwrap();
        let (status, _) = call(
            server.router(),
            get_req(
                &format!("/api/chat/rooms/{}/messages", room.id),
                Some(&bearer(&server, 9)),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn notification_inbox_flow() {
        let (server, _) = make_server();
        let auth = bearer(&server, 4);
        let stored = server
            .notifier()
            .create_notification(
                4,
                taskhub_core::NotificationKind::TaskAssigned,
                "New task",
                "Write docs",
                Value::Null,
            )
            .await
            .unwrap()
            .unwrap();

        let (_, body) = call(
            server.router(),
            get_req("/api/notifications/unread-count", Some(&auth)),
        )
        .await;
        assert_eq!(body["unread_count"], 1);

        let (_, body) = call(server.router(), get_req("/api/notifications", Some(&auth))).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["notifications"][0]["type"], "task_assigned");

        let put = |uri: String| {
            Request::builder()
                .method("PUT")
                .uri(uri)
                .header(header::AUTHORIZATION, &auth)
                .body(Body::empty())
                .unwrap()
        };
        let (status, _) = call(
            server.router(),
            put(format!("/api/notifications/{}/read", stored.id)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(server.router(), put("/api/notifications/999/read".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Notification not found");
        let (status, body) =
            call(server.router(), put("/api/notifications/read-all".into())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updated"], 0);
    }

    fn json_req(method: &str, uri: &str, auth: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, auth)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn delete_notification_is_owner_scoped() {
        let (server, store) = make_server();
        let stored = server
            .notifier()
            .create_notification(
                4,
                taskhub_core::NotificationKind::TaskCompleted,
                "Done",
                "Docs shipped",
                Value::Null,
            )
            .await
            .unwrap()
            .unwrap();
        let uri = format!("/api/notifications/{}", stored.id);

        let (status, body) =
            call(server.router(), json_req("DELETE", &uri, &bearer(&server, 5), "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Notification not found");
        assert_eq!(store.notifications(4, 10).await.unwrap().len(), 1);

        let (status, body) =
            call(server.router(), json_req("DELETE", &uri, &bearer(&server, 4), "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Notification deleted successfully");
        assert!(store.notifications(4, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn preferences_read_and_partial_update() {
        let (server, store) = make_server();
        let auth = bearer(&server, 7);

        let (status, body) = call(
            server.router(),
            get_req("/api/notifications/preferences", Some(&auth)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["preferences"]["task_assigned"], true);
        assert_eq!(body["preferences"]["email_notifications"], false);

        let (status, body) = call(
            server.router(),
            json_req(
                "PUT",
                "/api/notifications/preferences",
                &auth,
                r#"{"task_assigned": false, "email_notifications": true}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Preferences updated successfully");
        assert_eq!(body["preferences"]["task_assigned"], false);
        assert_eq!(body["preferences"]["task_updated"], true);
        assert_eq!(body["preferences"]["email_notifications"], true);

        let created = server
            .notifier()
            .create_notification(
                7,
                taskhub_core::NotificationKind::TaskAssigned,
                "New task",
                "Muted",
                Value::Null,
            )
            .await
            .unwrap();
        assert!(created.is_none());
        assert!(store.notifications(7, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn preferences_update_rejects_bad_body() {
        let (server, _) = make_server();
        let auth = bearer(&server, 7);
        let (status, body) = call(
            server.router(),
            json_req("PUT", "/api/notifications/preferences", &auth, "{not json"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid request body");

        let (status, _) = call(
            server.router(),
            get_req("/api/notifications/preferences", None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let (server, _) = make_server();
        let resp = server
            .router()
            .oneshot(get_req("/nonexistent", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_and_shutdown() {
        let (server, _) = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        let report = server.shutdown().drain(handle, Duration::from_secs(5)).await;
        assert!(report.serve_finished);
        assert_eq!(report.sessions_closed, 0);
    }
}
