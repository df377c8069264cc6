//! Notification bridge for services outside the chat flow.
//!
//! Task, project and HR services push [`Notification`]s to a user or a room
//! through a [`Notifier`] without knowing anything about connections.

use std::sync::Arc;

use serde_json::Value;
use taskhub_core::{Notification, NotificationKind, RoomId, RoomKey, UserId};
use taskhub_store::{ChatStore, NotificationStore, StoredNotification};
use tracing::debug;

use crate::websocket::broadcast::Broadcaster;

/// Pushes notifications to live sessions and persists per-user ones.
#[derive(Clone)]
pub struct Notifier {
    broadcaster: Broadcaster,
    store: Arc<dyn ChatStore>,
}

impl Notifier {
    /// Create a notifier.
    pub fn new(broadcaster: Broadcaster, store: Arc<dyn ChatStore>) -> Self {
        Self { broadcaster, store }
    }

    /// Push to one user. Returns `false` if the user is offline.
    pub fn notify_user(&self, user_id: UserId, mut notification: Notification) -> bool {
        notification.user_id = Some(user_id);
        self.broadcaster.to_user(user_id, &notification)
    }

    /// Push to every live member of a room. Returns the number reached.
    pub fn notify_room(&self, room_id: RoomId, notification: &Notification) -> usize {
        self.broadcaster
            .to_room(&RoomKey::from(room_id), notification)
    }

    /// Persist a notification for `user_id`, then push it if they are online.
    ///
    /// Returns `None`, storing and pushing nothing, when the user has switched
    /// `kind` off in their preferences.
    pub async fn create_notification(
        &self,
        user_id: UserId,
        kind: NotificationKind,
        title: &str,
        message: &str,
        data: Value,
    ) -> taskhub_store::Result<Option<StoredNotification>> {
        if !self.store.preferences(user_id).await?.allows(kind) {
            debug!(user_id, kind = kind.as_str(), "notification suppressed by preferences");
            return Ok(None);
        }
        let stored = self
            .store
            .create_notification(user_id, kind, title, message, data)
            .await?;
        let delivered = self.broadcaster.to_user(user_id, &stored.to_notification());
        debug!(user_id, kind = kind.as_str(), delivered, "notification created");
        Ok(Some(stored))
    }
}
