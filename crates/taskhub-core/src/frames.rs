//! JSON frames exchanged over the chat WebSocket.
//!
//! Every frame is a JSON object with a `type` discriminator. Inbound frames
//! are deliberately lenient: missing fields take defaults so that the router
//! can answer with a meaningful `error` frame instead of silently dropping
//! the request. Outbound frames are built server-side and always complete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::MessageType;
use crate::ids::{RoomId, UserId};

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// Dispatch kind of an inbound frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Persist and broadcast a chat message.
    Chat,
    /// Join a room.
    JoinRoom,
    /// Leave a room.
    LeaveRoom,
    /// Typing indicator.
    Typing,
    /// Application-level heartbeat.
    Ping,
    /// Anything else.
    Unknown,
}

impl FrameKind {
    /// Map the wire `type` string to a kind.
    pub fn parse(s: &str) -> Self {
        match s {
            "chat" => Self::Chat,
            "join_room" => Self::JoinRoom,
            "leave_room" => Self::LeaveRoom,
            "typing" => Self::Typing,
            "ping" => Self::Ping,
            _ => Self::Unknown,
        }
    }

    /// Label used for logging and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::JoinRoom => "join_room",
            Self::LeaveRoom => "leave_room",
            Self::Typing => "typing",
            Self::Ping => "ping",
            Self::Unknown => "unknown",
        }
    }
}

/// A frame received from a client.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct InboundFrame {
    /// Raw `type` string; see [`InboundFrame::kind`].
    #[serde(rename = "type")]
    pub kind: String,
    /// Target room. Absent means `0`, which never matches a real room.
    #[serde(default)]
    pub room_id: RoomId,
    /// Chat body.
    #[serde(default)]
    pub content: String,
    /// Chat content kind; defaults to text when absent.
    #[serde(default)]
    pub message_type: Option<MessageType>,
    /// Message being replied to.
    #[serde(default)]
    pub reply_to_id: Option<u64>,
    /// Free-form client metadata stored alongside the message.
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl InboundFrame {
    /// Decode a frame from JSON text.
    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Dispatch kind of this frame.
    pub fn kind(&self) -> FrameKind {
        FrameKind::parse(&self.kind)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// Payload of a `message` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageEvent {
    /// Persisted message ID.
    pub message_id: u64,
    /// Room the message was posted to.
    pub room_id: RoomId,
    /// Author's user ID.
    pub sender_id: UserId,
    /// Author's display name.
    pub sender_name: String,
    /// Message body.
    pub content: String,
    /// Content kind.
    pub message_type: MessageType,
    /// Message being replied to.
    pub reply_to_id: Option<u64>,
    /// Persistence timestamp.
    pub created_at: DateTime<Utc>,
    /// Broadcast timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Payload shared by `user_joined`, `user_left` and `typing` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresenceEvent {
    /// Room concerned.
    pub room_id: RoomId,
    /// Acting user.
    pub user_id: UserId,
    /// Acting user's display name.
    pub username: String,
    /// Event time.
    pub timestamp: DateTime<Utc>,
}

impl PresenceEvent {
    /// Build a presence payload stamped with the current time.
    pub fn now(room_id: RoomId, user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            room_id,
            user_id,
            username: username.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A frame sent from the server to a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Sent once after the upgrade completes.
    Welcome {
        /// Greeting text.
        message: String,
        /// Connected user.
        user_id: UserId,
        /// Connected user's display name.
        username: String,
        /// Connection time.
        timestamp: DateTime<Utc>,
    },
    /// A persisted chat message.
    Message(ChatMessageEvent),
    /// Join confirmation, unicast to the joiner.
    RoomJoined {
        /// Joined room.
        room_id: RoomId,
        /// Confirmation text.
        message: String,
    },
    /// Leave confirmation, unicast to the leaver.
    RoomLeft {
        /// Left room.
        room_id: RoomId,
        /// Confirmation text.
        message: String,
    },
    /// Another user joined a room.
    UserJoined(PresenceEvent),
    /// Another user left a room.
    UserLeft(PresenceEvent),
    /// Another user is typing.
    Typing(PresenceEvent),
    /// Reply to an inbound `ping`.
    Pong {
        /// Reply time.
        timestamp: DateTime<Utc>,
    },
    /// A rejected request.
    Error {
        /// Human-readable reason.
        message: String,
        /// Rejection time.
        timestamp: DateTime<Utc>,
    },
}

impl OutboundFrame {
    /// Greeting sent right after registration.
    pub fn welcome(user_id: UserId, username: impl Into<String>) -> Self {
        Self::Welcome {
            message: "Connected to chat server".into(),
            user_id,
            username: username.into(),
            timestamp: Utc::now(),
        }
    }

    /// Join confirmation.
    pub fn room_joined(room_id: RoomId) -> Self {
        Self::RoomJoined {
            room_id,
            message: "Successfully joined room".into(),
        }
    }

    /// Leave confirmation.
    pub fn room_left(room_id: RoomId) -> Self {
        Self::RoomLeft {
            room_id,
            message: "Successfully left room".into(),
        }
    }

    /// Heartbeat reply.
    pub fn pong() -> Self {
        Self::Pong {
            timestamp: Utc::now(),
        }
    }

    /// Rejection with a human-readable reason.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Wire `type` of this frame.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::Message(_) => "message",
            Self::RoomJoined { .. } => "room_joined",
            Self::RoomLeft { .. } => "room_left",
            Self::UserJoined(_) => "user_joined",
            Self::UserLeft(_) => "user_left",
            Self::Typing(_) => "typing",
            Self::Pong { .. } => "pong",
            Self::Error { .. } => "error",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Notifications
// ─────────────────────────────────────────────────────────────────────────────

/// Category of a non-chat notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A task was assigned to the recipient.
    TaskAssigned,
    /// A task the recipient follows changed.
    TaskUpdated,
    /// A task was completed.
    TaskCompleted,
    /// Someone commented on a task.
    TaskCommented,
    /// A task deadline is approaching.
    TaskDueSoon,
    /// A project was created.
    ProjectCreated,
    /// A user joined the workspace.
    UserJoined,
    /// A file was attached to a task.
    FileUploaded,
    /// An HR problem was reported.
    HrProblem,
    /// An HR problem changed.
    HrProblemUpdate,
    /// An HR problem was assigned to the recipient.
    HrProblemAssigned,
}

impl NotificationKind {
    /// Stored string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskAssigned => "task_assigned",
            Self::TaskUpdated => "task_updated",
            Self::TaskCompleted => "task_completed",
            Self::TaskCommented => "task_commented",
            Self::TaskDueSoon => "task_due_soon",
            Self::ProjectCreated => "project_created",
            Self::UserJoined => "user_joined",
            Self::FileUploaded => "file_uploaded",
            Self::HrProblem => "hr_problem",
            Self::HrProblemUpdate => "hr_problem_update",
            Self::HrProblemAssigned => "hr_problem_assigned",
        }
    }

    /// Parse the stored string form.
    pub fn parse(s: &str) -> Option<Self> {
        serde_json::from_value(Value::String(s.to_owned())).ok()
    }
}

/// A structured notification pushed to a user or room outside the chat flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification category, serialized as the frame `type`.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Arbitrary structured payload.
    #[serde(default)]
    pub data: Value,
    /// Recipient, when addressed to a single user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Build a notification stamped with the current time.
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            data: Value::Null,
            user_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach a structured payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}
