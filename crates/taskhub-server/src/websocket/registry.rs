//! Connection registry: user → live session, with single-session-per-user.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use taskhub_core::UserId;
use tracing::{debug, info};

use super::connection::ClientSession;
use super::rooms::RoomRegistry;

/// Entry in the online-users listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OnlineUser {
    /// User ID.
    pub id: UserId,
    /// Display name.
    pub username: String,
    /// Application role.
    pub role: String,
    /// Time of the user's last decoded frame.
    pub last_seen: DateTime<Utc>,
}

/// Why a session could not be registered. `Display` is the client-facing reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    /// The connection limit is reached and the user has no session to replace.
    #[error("Too many connections")]
    Full {
        /// Configured limit.
        limit: usize,
    },
    /// [`ConnectionRegistry::shutdown_all`] has run.
    #[error("Server is shutting down")]
    ShuttingDown,
}

/// Tracks every live session and owns the room registry.
///
/// At most one session per user is registered. Registering a second session
/// for the same user tears the first one down (rooms left, queue closed)
/// and is allowed even when the registry is at its limit.
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<UserId, Arc<ClientSession>>>,
    rooms: RoomRegistry,
    max_connections: usize,
    accepting: AtomicBool,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Create an empty registry without a connection limit.
    pub fn new() -> Self {
        Self::with_limit(usize::MAX)
    }

    /// Create an empty registry admitting at most `max_connections` sessions.
    pub fn with_limit(max_connections: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            rooms: RoomRegistry::new(),
            max_connections,
            accepting: AtomicBool::new(true),
        }
    }

    /// Room registry.
    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Whether a session for `user_id` would be admitted right now.
    ///
    /// Advisory only: [`register`](Self::register) re-checks under the lock.
    pub fn check_admission(&self, user_id: UserId) -> Result<(), RegisterError> {
        self.admit(&self.sessions.read(), user_id)
    }

    fn admit(
        &self,
        sessions: &HashMap<UserId, Arc<ClientSession>>,
        user_id: UserId,
    ) -> Result<(), RegisterError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(RegisterError::ShuttingDown);
        }
        if !sessions.contains_key(&user_id) && sessions.len() >= self.max_connections {
            return Err(RegisterError::Full {
                limit: self.max_connections,
            });
        }
        Ok(())
    }

    /// Register a session, replacing any previous session for the same user.
    ///
    /// Returns the replaced session, which has already been torn down.
    pub fn register(
        &self,
        session: Arc<ClientSession>,
    ) -> Result<Option<Arc<ClientSession>>, RegisterError> {
        let user_id = session.user.id;
        let previous = {
            let mut sessions = self.sessions.write();
            self.admit(&sessions, user_id)?;
            sessions.insert(user_id, Arc::clone(&session))
        };
        let Some(previous) = previous.filter(|prev| prev.conn_id != session.conn_id) else {
            return Ok(None);
        };
        info!(
            user_id,
            old_conn = %previous.conn_id,
            new_conn = %session.conn_id,
            "replacing existing session"
        );
        let _ = self.unregister(&previous);
        Ok(Some(previous))
    }

    /// Tear a session down. Idempotent: only the first call does anything.
    ///
    /// The session leaves every room, is removed from the registry if it is
    /// still the registered session for its user, and has its outbound queue
    /// closed so the write loop drains and exits.
    pub fn unregister(&self, session: &ClientSession) -> bool {
        if !session.begin_close() {
            return false;
        }
        let left = self.rooms.leave_all(session);
        {
            let mut sessions = self.sessions.write();
            let is_current = sessions
                .get(&session.user.id)
                .is_some_and(|s| s.conn_id == session.conn_id);
            if is_current {
                let _ = sessions.remove(&session.user.id);
            }
        }
        session.shutdown_io();
        debug!(
            conn_id = %session.conn_id,
            user_id = session.user.id,
            rooms_left = left.len(),
            "session unregistered"
        );
        true
    }

    /// The live session for a user.
    pub fn lookup(&self, user_id: UserId) -> Option<Arc<ClientSession>> {
        self.sessions.read().get(&user_id).cloned()
    }

    /// Number of registered sessions.
    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Online users sorted by ID.
    pub fn list_online(&self) -> Vec<OnlineUser> {
        let mut users: Vec<OnlineUser> = self
            .sessions
            .read()
            .values()
            .map(|s| OnlineUser {
                id: s.user.id,
                username: s.user.username.clone(),
                role: s.user.role.clone(),
                last_seen: s.last_activity(),
            })
            .collect();
        users.sort_by_key(|u| u.id);
        users
    }

    /// Stop admitting sessions and tear down every live one.
    pub fn shutdown_all(&self) -> usize {
        let sessions: Vec<Arc<ClientSession>> = {
            let sessions = self.sessions.write();
            self.accepting.store(false, Ordering::Release);
            sessions.values().cloned().collect()
        };
        let closed = sessions.iter().filter(|s| self.unregister(s)).count();
        if closed > 0 {
            info!(closed, "closed all sessions");
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::tests::session;
    use taskhub_core::RoomKey;

    #[test]
    fn register_and_lookup() {
        let reg = ConnectionRegistry::new();
        let (a, _rx) = session(1);
        assert!(reg.register(Arc::clone(&a)).unwrap().is_none());
        assert_eq!(reg.count(), 1);
        assert_eq!(reg.lookup(1).unwrap().conn_id, a.conn_id);
        assert!(reg.lookup(2).is_none());
    }

    #[tokio::test]
    async fn second_session_replaces_first() {
        let reg = ConnectionRegistry::new();
        let (old, mut old_rx) = session(1);
        let (new, _new_rx) = session(1);
        let _ = reg.register(Arc::clone(&old));
        let _ = reg.rooms().join(&old, &RoomKey::from(4));

        let replaced = reg.register(Arc::clone(&new)).unwrap().unwrap();
        assert_eq!(replaced.conn_id, old.conn_id);
        assert!(old.is_closed());
        assert!(old.joined_rooms().is_empty());
        assert!(!reg.rooms().contains(&RoomKey::from(4)));
        assert_eq!(reg.count(), 1);
        assert_eq!(reg.lookup(1).unwrap().conn_id, new.conn_id);
        // Old queue is closed.
        assert!(old_rx.recv().await.is_none());
    }

    #[test]
    fn unregister_is_idempotent() {
        let reg = ConnectionRegistry::new();
        let (a, _rx) = session(1);
        let _ = reg.register(Arc::clone(&a));
        let _ = reg.rooms().join(&a, &RoomKey::from(1));
        assert!(reg.unregister(&a));
        assert!(!reg.unregister(&a));
        assert_eq!(reg.count(), 0);
        assert_eq!(reg.rooms().room_count(), 0);
    }

    #[test]
    fn concurrent_unregister_tears_down_once() {
        for _ in 0..50 {
            let reg = Arc::new(ConnectionRegistry::new());
            let (a, _rx) = session(1);
            let _ = reg.register(Arc::clone(&a));
            for room in 1..=3 {
                let _ = reg.rooms().join(&a, &RoomKey::from(room));
            }

            let barrier = Arc::new(std::sync::Barrier::new(4));
            let winners: usize = (0..4)
                .map(|_| {
                    let reg = Arc::clone(&reg);
                    let a = Arc::clone(&a);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        let _ = barrier.wait();
                        usize::from(reg.unregister(&a))
                    })
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|h| h.join().unwrap())
                .sum();

            assert_eq!(winners, 1);
            assert_eq!(reg.count(), 0);
            assert_eq!(reg.rooms().room_count(), 0);
            assert!(a.joined_rooms().is_empty());
        }
    }

    #[test]
    fn unregister_racing_shutdown_all() {
        for _ in 0..50 {
            let reg = Arc::new(ConnectionRegistry::new());
            let sessions: Vec<_> = (1..=4).map(session).collect();
            for (s, _) in &sessions {
                let _ = reg.register(Arc::clone(s));
                let _ = reg.rooms().join(s, &RoomKey::from(5));
            }

            let reader_side = {
                let reg = Arc::clone(&reg);
                let victims: Vec<_> = sessions.iter().map(|(s, _)| Arc::clone(s)).collect();
                std::thread::spawn(move || victims.iter().filter(|s| reg.unregister(s)).count())
            };
            let by_shutdown = reg.shutdown_all();
            let by_reader = reader_side.join().unwrap();

            assert_eq!(by_shutdown + by_reader, 4);
            assert_eq!(reg.count(), 0);
            assert_eq!(reg.rooms().room_count(), 0);
        }
    }

    #[test]
    fn limit_rejects_new_users_but_allows_reconnect() {
        let reg = ConnectionRegistry::with_limit(2);
        let (a, _ra) = session(1);
        let (b, _rb) = session(2);
        let (c, _rc) = session(3);
        let (a2, _ra2) = session(1);
        let _ = reg.register(Arc::clone(&a));
        let _ = reg.register(b);

        assert_eq!(reg.check_admission(3), Err(RegisterError::Full { limit: 2 }));
        assert_eq!(
            reg.register(Arc::clone(&c)).unwrap_err(),
            RegisterError::Full { limit: 2 }
        );
        assert!(reg.lookup(3).is_none());

        assert_eq!(reg.check_admission(1), Ok(()));
        let replaced = reg.register(Arc::clone(&a2)).unwrap().unwrap();
        assert_eq!(replaced.conn_id, a.conn_id);
        assert_eq!(reg.count(), 2);
    }

    #[test]
    fn concurrent_registers_respect_limit() {
        let reg = Arc::new(ConnectionRegistry::with_limit(5));
        let admitted: usize = (1..=20)
            .map(|id| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    let (s, rx) = session(id);
                    let ok = reg.register(s).is_ok();
                    drop(rx);
                    usize::from(ok)
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum();
        assert_eq!(admitted, 5);
        assert_eq!(reg.count(), 5);
    }

    #[test]
    fn no_registration_after_shutdown() {
        let reg = ConnectionRegistry::new();
        let _ = reg.shutdown_all();
        let (a, _rx) = session(1);
        assert_eq!(reg.check_admission(1), Err(RegisterError::ShuttingDown));
        assert_eq!(reg.register(a).unwrap_err(), RegisterError::ShuttingDown);
        assert_eq!(reg.count(), 0);
    }

    #[test]
    fn stale_unregister_keeps_newer_session() {
        let reg = ConnectionRegistry::new();
        let (old, _r1) = session(1);
        let (new, _r2) = session(1);
        let _ = reg.register(Arc::clone(&old));
        let _ = reg.register(Arc::clone(&new));
        // The replaced session's own teardown path runs later.
        assert!(!reg.unregister(&old));
        assert_eq!(reg.lookup(1).unwrap().conn_id, new.conn_id);
    }

    #[test]
    fn closed_session_cannot_rejoin_rooms() {
        let reg = ConnectionRegistry::new();
        let (a, _rx) = session(1);
        let _ = reg.register(Arc::clone(&a));
        let _ = reg.unregister(&a);
        assert!(!reg.rooms().join(&a, &RoomKey::from(2)));
        assert_eq!(reg.rooms().room_count(), 0);
    }

    #[test]
    fn list_online_sorted() {
        let reg = ConnectionRegistry::new();
        let (b, _rb) = session(2);
        let (a, _ra) = session(1);
        let _ = reg.register(b);
        let _ = reg.register(a);
        let online = reg.list_online();
        assert_eq!(online.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(online[0].username, "user1");
        assert_eq!(online[0].role, "employee");
    }

    #[test]
    fn shutdown_all_closes_everything() {
        let reg = ConnectionRegistry::new();
        let sessions: Vec<_> = (1..=3).map(session).collect();
        for (s, _) in &sessions {
            let _ = reg.register(Arc::clone(s));
            let _ = reg.rooms().join(s, &RoomKey::from(9));
        }
        assert_eq!(reg.shutdown_all(), 3);
        assert_eq!(reg.count(), 0);
        assert_eq!(reg.rooms().room_count(), 0);
        assert!(sessions.iter().all(|(s, _)| s.is_closed()));
    }
}
