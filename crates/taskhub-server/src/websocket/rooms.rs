//! Room registry: room key → member sessions.
//!
//! Room membership is stored twice, once here and once in each session's own
//! room set. Both sides are updated while holding this registry's write
//! lock, so at every quiescent point a session is a member of a room exactly
//! when the room key is in that session's set. Lock order is registry lock
//! first, then the session's room-set lock; nothing takes them the other way
//! round.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use taskhub_core::{RoomKey, UserId};
use tracing::debug;

use super::connection::ClientSession;

#[derive(Default)]
struct Room {
    members: HashMap<UserId, Arc<ClientSession>>,
}

/// Live rooms, created on first join and dropped when the last member leaves.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomKey, Room>>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `session` to `key`, creating the room if needed.
    ///
    /// Authorization is the caller's job. Returns `false` when the session is
    /// already closed (nothing is recorded) or was already a member.
    pub fn join(&self, session: &Arc<ClientSession>, key: &RoomKey) -> bool {
        let mut rooms = self.rooms.write();
        if session.is_closed() {
            return false;
        }
        let room = rooms.entry(key.clone()).or_default();
        let previous = room.members.insert(session.user.id, Arc::clone(session));
        session.add_room(key.clone());
        match previous {
            Some(prev) if prev.conn_id == session.conn_id => false,
            Some(prev) => {
                // Same user on an older connection: keep the two sides in step.
                let _ = prev.remove_room(key);
                true
            }
            None => {
                debug!(room = %key, user_id = session.user.id, "joined room");
                true
            }
        }
    }

    /// Remove `session` from `key`. No-op if it was not a member.
    pub fn leave(&self, session: &ClientSession, key: &RoomKey) -> bool {
        let mut rooms = self.rooms.write();
        Self::leave_locked(&mut rooms, session, key)
    }

    /// Remove `session` from every room it has joined. Returns the rooms left.
    pub fn leave_all(&self, session: &ClientSession) -> Vec<RoomKey> {
        let mut rooms = self.rooms.write();
        session
            .joined_rooms()
            .into_iter()
            .filter(|key| Self::leave_locked(&mut rooms, session, key))
            .collect()
    }

    fn leave_locked(
        rooms: &mut HashMap<RoomKey, Room>,
        session: &ClientSession,
        key: &RoomKey,
    ) -> bool {
        let was_joined = session.remove_room(key);
        let Some(room) = rooms.get_mut(key) else {
            return false;
        };
        let is_current = room
            .members
            .get(&session.user.id)
            .is_some_and(|m| m.conn_id == session.conn_id);
        if is_current {
            let _ = room.members.remove(&session.user.id);
        }
        if room.members.is_empty() {
            let _ = rooms.remove(key);
            debug!(room = %key, "room emptied and removed");
        }
        was_joined && is_current
    }

    /// Snapshot of the members of `key`.
    pub fn members(&self, key: &RoomKey) -> Vec<Arc<ClientSession>> {
        self.rooms
            .read()
            .get(key)
            .map(|room| room.members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `user_id` is currently in `key`.
    pub fn is_member(&self, key: &RoomKey, user_id: UserId) -> bool {
        self.rooms
            .read()
            .get(key)
            .is_some_and(|room| room.members.contains_key(&user_id))
    }

    /// Number of members in `key` (0 if the room does not exist).
    pub fn member_count(&self, key: &RoomKey) -> usize {
        self.rooms.read().get(key).map_or(0, |room| room.members.len())
    }

    /// Whether the room currently exists.
    pub fn contains(&self, key: &RoomKey) -> bool {
        self.rooms.read().contains_key(key)
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    /// Sorted keys of all live rooms.
    pub fn room_keys(&self) -> Vec<RoomKey> {
        let mut keys: Vec<RoomKey> = self.rooms.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}
