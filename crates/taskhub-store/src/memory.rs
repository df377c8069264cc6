//! In-memory store for tests and throwaway servers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use taskhub_core::{ChatRole, NotificationKind, Participant, RoomId, UserId, UserIdentity};

use crate::errors::{Result, StoreError};
use crate::traits::{MessageStore, NotificationStore, ParticipantStore, RoomStore};
use crate::types::{
    ChatRoom, DEFAULT_MAX_MEMBERS, Member, NewMessage, NotificationPreferences, SavedMessage,
    StoredMessage, StoredNotification,
};

#[derive(Default)]
struct State {
    rooms: Vec<ChatRoom>,
    /// Keyed by `(room_id, user_id)`; the `String` is the application role.
    participants: HashMap<(RoomId, UserId), (Participant, String)>,
    messages: Vec<StoredMessage>,
    notifications: Vec<StoredNotification>,
    preferences: HashMap<UserId, NotificationPreferences>,
    next_room_id: u64,
    next_message_id: u64,
    next_notification_id: u64,
}

/// `parking_lot`-guarded store holding everything in process memory.
#[derive(Default)]
pub struct MemoryChatStore {
    state: Mutex<State>,
    fail_saves: AtomicBool,
}

impl MemoryChatStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save_message` fail until reset.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::Relaxed);
    }

    /// Number of persisted messages across all rooms.
    pub fn message_count(&self) -> usize {
        self.state.lock().messages.len()
    }

    /// Insert a participant with an explicit role and block flag.
    ///
    /// The room is created with a placeholder name if it does not exist yet.
    pub fn insert_participant(&self, participant: Participant, app_role: &str) {
        let mut state = self.state.lock();
        let room_id = participant.room_id;
        if !state.rooms.iter().any(|r| r.id == room_id) {
            state.rooms.push(ChatRoom {
                id: room_id,
                name: format!("room {room_id}"),
                description: String::new(),
                created_by: participant.user_id,
                max_members: DEFAULT_MAX_MEMBERS,
                last_message: None,
                created_at: Utc::now(),
            });
            state.next_room_id = state.next_room_id.max(room_id);
        }
        let key = (room_id, participant.user_id);
        let _ = state
            .participants
            .insert(key, (participant, app_role.to_string()));
    }
}

#[async_trait]
impl ParticipantStore for MemoryChatStore {
    async fn participant(&self, room_id: RoomId, user_id: UserId) -> Result<Option<Participant>> {
        Ok(self
            .state
            .lock()
            .participants
            .get(&(room_id, user_id))
            .map(|(p, _)| p.clone()))
    }
}

#[async_trait]
impl MessageStore for MemoryChatStore {
    async fn save_message(&self, message: NewMessage) -> Result<SavedMessage> {
        if self.fail_saves.load(Ordering::Relaxed) {
            return Err(StoreError::Internal("injected save failure".into()));
        }
        let mut state = self.state.lock();
        if !state.rooms.iter().any(|r| r.id == message.room_id) {
            return Err(StoreError::NotFound(format!("room {}", message.room_id)));
        }
        state.next_message_id += 1;
        let saved = SavedMessage {
            id: state.next_message_id,
            created_at: Utc::now(),
        };
        state.messages.push(StoredMessage {
            id: saved.id,
            room_id: message.room_id,
            sender_id: message.sender_id,
            sender_name: message.sender_name,
            content: message.content,
            message_type: message.message_type,
            reply_to_id: message.reply_to_id,
            created_at: saved.created_at,
        });
        Ok(saved)
    }

    async fn touch_room_last_message(&self, room_id: RoomId, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock();
        let room = state
            .rooms
            .iter_mut()
            .find(|r| r.id == room_id)
            .ok_or_else(|| StoreError::NotFound(format!("room {room_id}")))?;
        room.last_message = Some(at);
        Ok(())
    }

    async fn messages(&self, room_id: RoomId, page: u32, limit: u32) -> Result<Vec<StoredMessage>> {
        let offset = page.saturating_sub(1) as usize * limit as usize;
        Ok(self
            .state
            .lock()
            .messages
            .iter()
            .rev()
            .filter(|m| m.room_id == room_id)
            .skip(offset)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RoomStore for MemoryChatStore {
    async fn room(&self, room_id: RoomId) -> Result<Option<ChatRoom>> {
        Ok(self
            .state
            .lock()
            .rooms
            .iter()
            .find(|r| r.id == room_id)
            .cloned())
    }

    async fn room_by_name(&self, name: &str) -> Result<Option<ChatRoom>> {
        Ok(self
            .state
            .lock()
            .rooms
            .iter()
            .find(|r| r.name == name)
            .cloned())
    }

    async fn create_room(
        &self,
        name: &str,
        description: &str,
        creator: &UserIdentity,
    ) -> Result<ChatRoom> {
        let room = {
            let mut state = self.state.lock();
            state.next_room_id += 1;
            let room = ChatRoom {
                id: state.next_room_id,
                name: name.to_string(),
                description: description.to_string(),
                created_by: creator.id,
                max_members: DEFAULT_MAX_MEMBERS,
                last_message: None,
                created_at: Utc::now(),
            };
            state.rooms.push(room.clone());
            room
        };
        self.add_participant(room.id, creator, ChatRole::Member).await?;
        Ok(room)
    }

    async fn add_participant(
        &self,
        room_id: RoomId,
        user: &UserIdentity,
        role: ChatRole,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if !state.rooms.iter().any(|r| r.id == room_id) {
            return Err(StoreError::NotFound(format!("room {room_id}")));
        }
        let _ = state
            .participants
            .entry((room_id, user.id))
            .or_insert_with(|| {
                (
                    Participant {
                        room_id,
                        user_id: user.id,
                        username: user.username.clone(),
                        role,
                        is_blocked: false,
                    },
                    user.role.clone(),
                )
            });
        Ok(())
    }

    async fn set_blocked(&self, room_id: RoomId, user_id: UserId, blocked: bool) -> Result<()> {
        let mut state = self.state.lock();
        let (participant, _) = state
            .participants
            .get_mut(&(room_id, user_id))
            .ok_or_else(|| StoreError::NotFound(format!("participant {user_id} in room {room_id}")))?;
        participant.is_blocked = blocked;
        Ok(())
    }

    async fn members(&self, room_id: RoomId) -> Result<Vec<Member>> {
        let state = self.state.lock();
        let mut members: Vec<Member> = state
            .participants
            .values()
            .filter(|(p, _)| p.room_id == room_id)
            .map(|(p, role)| Member {
                id: p.user_id,
                username: p.username.clone(),
                role: role.clone(),
            })
            .collect();
        members.sort_by_key(|m| m.id);
        Ok(members)
    }
}

#[async_trait]
impl NotificationStore for MemoryChatStore {
    async fn create_notification(
        &self,
        user_id: UserId,
        kind: NotificationKind,
        title: &str,
        message: &str,
        data: Value,
    ) -> Result<StoredNotification> {
        let mut state = self.state.lock();
        state.next_notification_id += 1;
        let stored = StoredNotification {
            id: state.next_notification_id,
            user_id,
            kind,
            title: title.to_string(),
            message: message.to_string(),
            data,
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        };
        state.notifications.push(stored.clone());
        Ok(stored)
    }

    async fn notifications(&self, user_id: UserId, limit: u32) -> Result<Vec<StoredNotification>> {
        Ok(self
            .state
            .lock()
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn unread_count(&self, user_id: UserId) -> Result<u64> {
        Ok(self
            .state
            .lock()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count() as u64)
    }

    async fn mark_read(&self, id: u64, user_id: UserId) -> Result<()> {
        let mut state = self.state.lock();
        let notification = state
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
            .ok_or_else(|| StoreError::NotFound(format!("notification {id}")))?;
        if !notification.is_read {
            notification.is_read = true;
            notification.read_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_all_read(&self, user_id: UserId) -> Result<u64> {
        let now = Utc::now();
        let mut changed = 0;
        for n in self
            .state
            .lock()
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.is_read)
        {
            n.is_read = true;
            n.read_at = Some(now);
            changed += 1;
        }
        Ok(changed)
    }

    async fn delete_notification(&self, id: u64, user_id: UserId) -> Result<bool> {
        let mut state = self.state.lock();
        let before = state.notifications.len();
        state
            .notifications
            .retain(|n| !(n.id == id && n.user_id == user_id));
        Ok(state.notifications.len() < before)
    }

    async fn preferences(&self, user_id: UserId) -> Result<NotificationPreferences> {
        Ok(*self.state.lock().preferences.entry(user_id).or_default())
    }

    async fn save_preferences(
        &self,
        user_id: UserId,
        preferences: &NotificationPreferences,
    ) -> Result<()> {
        let _ = self.state.lock().preferences.insert(user_id, *preferences);
        Ok(())
    }
}
