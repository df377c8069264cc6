//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file may specify any subset of fields.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "websocket": { "maxMessageSize": 4096 },
///   "auth": { "jwtSecret": "change-me" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskhubSettings {
    /// HTTP listener.
    pub server: ServerSettings,
    /// WebSocket session limits and timers.
    pub websocket: WebSocketSettings,
    /// Token verification.
    pub auth: AuthSettings,
    /// `SQLite` storage.
    pub database: DatabaseSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl TaskhubSettings {
    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        let ws = &self.websocket;
        if ws.ping_interval_secs >= ws.pong_wait_secs {
            return Err(SettingsError::InvalidValue(format!(
                "websocket.pingIntervalSecs ({}) must be below websocket.pongWaitSecs ({})",
                ws.ping_interval_secs, ws.pong_wait_secs
            )));
        }
        if ws.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "websocket.sendQueueCapacity must be at least 1".into(),
            ));
        }
        if self.auth.jwt_secret.is_empty() {
            return Err(SettingsError::InvalidValue("auth.jwtSecret must not be empty".into()));
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Upper bound on simultaneous WebSocket sessions.
    pub max_connections: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 10_000,
        }
    }
}

/// Per-session WebSocket limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebSocketSettings {
    /// Bounded outbound queue length per session.
    pub send_queue_capacity: usize,
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
    /// Seconds between keep-alive pings on an idle connection.
    pub ping_interval_secs: u64,
    /// Seconds without any inbound traffic before the session is closed.
    pub pong_wait_secs: u64,
    /// Seconds a single socket write may take.
    pub write_timeout_secs: u64,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            send_queue_capacity: 256,
            max_message_size: 512,
            ping_interval_secs: 54,
            pong_wait_secs: 60,
            write_timeout_secs: 10,
        }
    }
}

/// Token verification settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HMAC secret for HS256 tokens.
    pub jwt_secret: String,
    /// Lifetime of tokens minted by the CLI.
    pub token_ttl_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: "taskhub-dev-secret".to_string(),
            token_ttl_secs: 86_400,
        }
    }
}

/// Storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// Database file. Empty means `~/.taskhub/taskhub.db`.
    pub path: String,
    /// Connection pool size.
    pub pool_size: u32,
    /// `SQLite` busy timeout.
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: String::new(),
            pool_size: 16,
            busy_timeout_ms: 30_000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_chat_timings() {
        let ws = WebSocketSettings::default();
        assert_eq!(ws.send_queue_capacity, 256);
        assert_eq!(ws.max_message_size, 512);
        assert_eq!(ws.ping_interval_secs, 54);
        assert_eq!(ws.pong_wait_secs, 60);
        assert_eq!(ws.write_timeout_secs, 10);
    }

    #[test]
    fn defaults_validate() {
        TaskhubSettings::default().validate().unwrap();
    }

    #[test]
    fn ping_must_be_below_pong_wait() {
        let mut settings = TaskhubSettings::default();
        settings.websocket.ping_interval_secs = 60;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("pingIntervalSecs"));
    }

    #[test]
    fn zero_queue_rejected() {
        let mut settings = TaskhubSettings::default();
        settings.websocket.send_queue_capacity = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn empty_secret_rejected() {
        let mut settings = TaskhubSettings::default();
        settings.auth.jwt_secret.clear();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn camel_case_wire_names() {
        let value = serde_json::to_value(TaskhubSettings::default()).unwrap();
        assert!(value["websocket"]["sendQueueCapacity"].is_number());
        assert!(value["auth"]["jwtSecret"].is_string());
        assert!(value["database"]["busyTimeoutMs"].is_number());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: TaskhubSettings =
            serde_json::from_str(r#"{"server":{"port":9000}}"#).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.websocket.pong_wait_secs, 60);
    }
}
