//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use taskhub_settings::TaskhubSettings;

/// Runtime configuration for the chat server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Per-session outbound queue capacity.
    pub send_queue_capacity: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Interval between server pings when the peer is otherwise silent.
    pub ping_interval_ms: u64,
    /// Idle read window; a session with no inbound traffic for this long is closed.
    pub pong_wait_ms: u64,
    /// Deadline for a single socket write.
    pub write_timeout_ms: u64,
}

impl ServerConfig {
    /// Project loaded settings onto a server config.
    pub fn from_settings(settings: &TaskhubSettings) -> Self {
        let ws = &settings.websocket;
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_connections: settings.server.max_connections,
            send_queue_capacity: ws.send_queue_capacity,
            max_message_size: ws.max_message_size,
            ping_interval_ms: ws.ping_interval_secs * 1000,
            pong_wait_ms: ws.pong_wait_secs * 1000,
            write_timeout_ms: ws.write_timeout_secs * 1000,
        }
    }

    /// Ping interval as a `Duration`.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Idle read window as a `Duration`.
    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    /// Write deadline as a `Duration`.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 10_000,
            send_queue_capacity: 256,
            max_message_size: 512,
            ping_interval_ms: 54_000,
            pong_wait_ms: 60_000,
            write_timeout_ms: 10_000,
        }
    }
}
