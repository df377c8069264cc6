//! Collaborator interfaces consumed by the chat server.
//!
//! The server depends only on these traits; [`crate::SqliteChatStore`] backs
//! them in production and [`crate::MemoryChatStore`] in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use taskhub_core::{ChatRole, NotificationKind, Participant, RoomId, UserId, UserIdentity};

use crate::errors::Result;
use crate::types::{
    ChatRoom, Member, NewMessage, NotificationPreferences, SavedMessage, StoredMessage,
    StoredNotification, TEAM_CHAT_DESCRIPTION, TEAM_CHAT_NAME,
};

/// Room membership lookups.
#[async_trait]
pub trait ParticipantStore: Send + Sync {
    /// The user's membership record for the room, if they are a participant.
    async fn participant(&self, room_id: RoomId, user_id: UserId) -> Result<Option<Participant>>;
}

/// Message persistence.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message and return its assigned ID and timestamp.
    async fn save_message(&self, message: NewMessage) -> Result<SavedMessage>;

    /// Record `at` as the room's most recent message time.
    async fn touch_room_last_message(&self, room_id: RoomId, at: DateTime<Utc>) -> Result<()>;

    /// One page of a room's messages, newest first. `page` is 1-based.
    async fn messages(&self, room_id: RoomId, page: u32, limit: u32) -> Result<Vec<StoredMessage>>;
}

/// Room and membership management.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Look up a room by ID.
    async fn room(&self, room_id: RoomId) -> Result<Option<ChatRoom>>;

    /// Look up the first room with the given name.
    async fn room_by_name(&self, name: &str) -> Result<Option<ChatRoom>>;

    /// Create a room and add its creator as a member.
    async fn create_room(
        &self,
        name: &str,
        description: &str,
        creator: &UserIdentity,
    ) -> Result<ChatRoom>;

    /// Add a participant. Existing participants are left unchanged.
    async fn add_participant(
        &self,
        room_id: RoomId,
        user: &UserIdentity,
        role: ChatRole,
    ) -> Result<()>;

    /// Block or unblock an existing participant.
    async fn set_blocked(&self, room_id: RoomId, user_id: UserId, blocked: bool) -> Result<()>;

    /// All participants of a room.
    async fn members(&self, room_id: RoomId) -> Result<Vec<Member>>;

    /// The workspace-wide team chat, if it exists.
    async fn team_chat(&self) -> Result<Option<ChatRoom>> {
        self.room_by_name(TEAM_CHAT_NAME).await
    }

    /// Return the team chat, creating it with `creator` as first member if absent.
    async fn get_or_create_team_chat(&self, creator: &UserIdentity) -> Result<ChatRoom> {
        if let Some(room) = self.team_chat().await? {
            return Ok(room);
        }
        self.create_room(TEAM_CHAT_NAME, TEAM_CHAT_DESCRIPTION, creator)
            .await
    }
}

/// Notification persistence.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a notification for one user.
    async fn create_notification(
        &self,
        user_id: UserId,
        kind: NotificationKind,
        title: &str,
        message: &str,
        data: Value,
    ) -> Result<StoredNotification>;

    /// The user's most recent notifications, newest first.
    async fn notifications(&self, user_id: UserId, limit: u32) -> Result<Vec<StoredNotification>>;

    /// Number of unread notifications.
    async fn unread_count(&self, user_id: UserId) -> Result<u64>;

    /// Mark one of the user's notifications read.
    async fn mark_read(&self, id: u64, user_id: UserId) -> Result<()>;

    /// Mark all of the user's notifications read; returns how many changed.
    async fn mark_all_read(&self, user_id: UserId) -> Result<u64>;

    /// Delete one of the user's notifications. Returns `false` when no
    /// notification with that ID belongs to the user.
    async fn delete_notification(&self, id: u64, user_id: UserId) -> Result<bool>;

    /// The user's delivery preferences, stored as defaults on first read.
    async fn preferences(&self, user_id: UserId) -> Result<NotificationPreferences>;

    /// Replace the user's delivery preferences.
    async fn save_preferences(
        &self,
        user_id: UserId,
        preferences: &NotificationPreferences,
    ) -> Result<()>;
}

/// Everything the server needs from persistence.
pub trait ChatStore: ParticipantStore + MessageStore + RoomStore + NotificationStore {}

impl<T> ChatStore for T where T: ParticipantStore + MessageStore + RoomStore + NotificationStore {}
