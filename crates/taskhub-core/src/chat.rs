//! Chat domain types shared by the store and the server.

use serde::{Deserialize, Serialize};

use crate::ids::{RoomId, UserId};

/// Identity of an authenticated user, as supplied by the auth layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// User primary key.
    pub id: UserId,
    /// Display name.
    pub username: String,
    /// Application role. Opaque to the chat core, shown in status listings.
    pub role: String,
}

/// A participant's capability within one room.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    /// May read and write.
    #[default]
    Member,
    /// May read only.
    ReadOnly,
}

impl ChatRole {
    /// Stored string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::ReadOnly => "read_only",
        }
    }

    /// Parse the stored string form. Unknown values fall back to `Member`.
    pub fn parse(s: &str) -> Self {
        match s {
            "read_only" => Self::ReadOnly,
            _ => Self::Member,
        }
    }
}

/// Kind of content carried by a chat message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Plain text.
    #[default]
    Text,
    /// Image attachment.
    Image,
    /// Generic file attachment.
    File,
    /// Video attachment.
    Video,
    /// Audio attachment.
    Audio,
}

impl MessageType {
    /// Stored string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    /// Parse the stored string form. Unknown values fall back to `Text`.
    pub fn parse(s: &str) -> Self {
        match s {
            "image" => Self::Image,
            "file" => Self::File,
            "video" => Self::Video,
            "audio" => Self::Audio,
            _ => Self::Text,
        }
    }
}

/// A user's membership record for one room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Room the membership belongs to.
    pub room_id: RoomId,
    /// Member's user ID.
    pub user_id: UserId,
    /// Member's display name at join time.
    pub username: String,
    /// Read/write capability.
    pub role: ChatRole,
    /// Blocked participants may neither write nor be treated as active.
    pub is_blocked: bool,
}

impl Participant {
    /// Whether this participant may post messages.
    pub fn can_write(&self) -> bool {
        !self.is_blocked && self.role != ChatRole::ReadOnly
    }
}
