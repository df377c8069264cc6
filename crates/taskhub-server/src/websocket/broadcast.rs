//! Frame fan-out to room members and single users.

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use taskhub_core::{RoomKey, UserId};
use tracing::{debug, warn};

use super::connection::ClientSession;
use super::registry::ConnectionRegistry;
use crate::metrics::WS_BROADCAST_DROPS_TOTAL;

/// Serializes a frame once and enqueues it on every recipient.
///
/// Enqueueing never blocks. A recipient whose queue is full is a slow
/// consumer and gets disconnected; other recipients are unaffected.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    /// Create a broadcaster over the given registry.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Send `frame` to every member of `key`. Returns the number enqueued.
    pub fn to_room<T: Serialize + ?Sized>(&self, key: &RoomKey, frame: &T) -> usize {
        self.fan_out(key, None, frame)
    }

    /// Send `frame` to every member of `key` except `excluded`.
    pub fn to_room_except<T: Serialize + ?Sized>(
        &self,
        key: &RoomKey,
        excluded: UserId,
        frame: &T,
    ) -> usize {
        self.fan_out(key, Some(excluded), frame)
    }

    /// Send `frame` to one user. Returns `false` if the user is offline or
    /// their queue is full.
    pub fn to_user<T: Serialize + ?Sized>(&self, user_id: UserId, frame: &T) -> bool {
        let Some(session) = self.registry.lookup(user_id) else {
            debug!(user_id, "user offline, frame not delivered");
            return false;
        };
        let Some(json) = encode(frame) else {
            return false;
        };
        if session.send(json) {
            true
        } else {
            self.drop_slow(&[session]);
            false
        }
    }

    fn fan_out<T: Serialize + ?Sized>(
        &self,
        key: &RoomKey,
        excluded: Option<UserId>,
        frame: &T,
    ) -> usize {
        let Some(json) = encode(frame) else {
            return 0;
        };
        let members = self.registry.rooms().members(key);
        let mut delivered = 0;
        let mut slow = Vec::new();
        for member in members {
            if Some(member.user.id) == excluded {
                continue;
            }
            if member.send(Arc::clone(&json)) {
                delivered += 1;
            } else {
                slow.push(member);
            }
        }
        debug!(room = %key, delivered, dropped = slow.len(), "broadcast to room");
        self.drop_slow(&slow);
        delivered
    }

    fn drop_slow(&self, sessions: &[Arc<ClientSession>]) {
        for session in sessions {
            counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
            if self.registry.unregister(session) {
                warn!(
                    conn_id = %session.conn_id,
                    user_id = session.user.id,
                    "send queue full, disconnecting slow consumer"
                );
            }
        }
    }
}

fn encode<T: Serialize + ?Sized>(frame: &T) -> Option<Arc<String>> {
    match serde_json::to_string(frame) {
        Ok(json) => Some(Arc::new(json)),
        Err(e) => {
            warn!(error = %e, "failed to serialize frame");
            None
        }
    }
}
