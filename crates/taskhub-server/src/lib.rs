//! # taskhub-server
//!
//! Axum HTTP + `WebSocket` chat server.
//!
//! - `WebSocket` core: connection and room registries, per-session read/write
//!   loops, frame dispatch, non-blocking fan-out with slow-consumer eviction
//! - Notification bridge for task/project/HR events
//! - REST surface: team chat, message history, notifications, status, health
//! - JWT authentication extractor
//! - Prometheus metrics and graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod api;
pub mod auth;
pub mod config;
pub mod health;
pub mod metrics;
pub mod notify;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use auth::{AuthError, AuthUser, Claims, JwtAuth, issue_token};
pub use config::ServerConfig;
pub use notify::Notifier;
pub use server::{AppState, ChatServer};
pub use shutdown::{ShutdownCoordinator, ShutdownReport};
pub use websocket::broadcast::Broadcaster;
pub use websocket::connection::ClientSession;
pub use websocket::handler::{ChatContext, ChatError};
pub use websocket::registry::{ConnectionRegistry, OnlineUser, RegisterError};
pub use websocket::rooms::RoomRegistry;
