//! Row types exchanged with the stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskhub_core::{MessageType, Notification, NotificationKind, RoomId, UserId};

/// Name of the shared workspace-wide room.
pub const TEAM_CHAT_NAME: &str = "Team Chat";

/// Description given to the team chat when it is first created.
pub const TEAM_CHAT_DESCRIPTION: &str = "Main chat room for all team members";

/// Member cap recorded on newly created rooms.
pub const DEFAULT_MAX_MEMBERS: u32 = 1000;

/// A persisted chat room.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRoom {
    /// Primary key.
    pub id: RoomId,
    /// Display name.
    pub name: String,
    /// Free text.
    pub description: String,
    /// Creator's user ID.
    pub created_by: UserId,
    /// Member cap.
    pub max_members: u32,
    /// Time of the most recent message, if any.
    pub last_message: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A room member as listed by the members endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// User ID.
    pub id: UserId,
    /// Display name.
    pub username: String,
    /// Application role.
    pub role: String,
}

/// A message about to be persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMessage {
    /// Target room.
    pub room_id: RoomId,
    /// Author.
    pub sender_id: UserId,
    /// Author's display name.
    pub sender_name: String,
    /// Body.
    pub content: String,
    /// Content kind.
    pub message_type: MessageType,
    /// Message being replied to.
    pub reply_to_id: Option<u64>,
    /// Client metadata.
    pub metadata: Option<Value>,
}

/// Identity the store assigned to a saved message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SavedMessage {
    /// Assigned primary key.
    pub id: u64,
    /// Assigned creation time.
    pub created_at: DateTime<Utc>,
}

/// A message read back from the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Primary key.
    pub id: u64,
    /// Room.
    pub room_id: RoomId,
    /// Author.
    pub sender_id: UserId,
    /// Author's display name.
    pub sender_name: String,
    /// Body.
    pub content: String,
    /// Content kind.
    pub message_type: MessageType,
    /// Message being replied to.
    pub reply_to_id: Option<u64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A persisted notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredNotification {
    /// Primary key.
    pub id: u64,
    /// Recipient.
    pub user_id: UserId,
    /// Category.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Headline.
    pub title: String,
    /// Body.
    pub message: String,
    /// Structured payload.
    pub data: Value,
    /// Whether the recipient has read it.
    pub is_read: bool,
    /// When it was read.
    pub read_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl StoredNotification {
    /// The realtime frame for this notification.
    pub fn to_notification(&self) -> Notification {
        Notification {
            kind: self.kind,
            title: self.title.clone(),
            message: self.message.clone(),
            data: self.data.clone(),
            user_id: Some(self.user_id),
            timestamp: self.created_at,
        }
    }
}

/// Per-user switches for which notifications are delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPreferences {
    /// Task assigned to the user.
    pub task_assigned: bool,
    /// Task changed.
    pub task_updated: bool,
    /// Task completed.
    pub task_completed: bool,
    /// Task commented on.
    pub task_commented: bool,
    /// Task deadline approaching.
    pub task_due_soon: bool,
    /// Project created.
    pub project_created: bool,
    /// User joined the workspace.
    pub user_joined: bool,
    /// File attached to a task.
    pub file_uploaded: bool,
    /// Email delivery. Stored only; no mailer reads it.
    pub email_notifications: bool,
    /// Push delivery. Stored only.
    pub push_notifications: bool,
    /// In-app delivery. Stored only.
    pub in_app_notifications: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            task_assigned: true,
            task_updated: true,
            task_completed: true,
            task_commented: true,
            task_due_soon: true,
            project_created: true,
            user_joined: true,
            file_uploaded: true,
            email_notifications: false,
            push_notifications: true,
            in_app_notifications: true,
        }
    }
}

impl NotificationPreferences {
    /// Whether a notification of `kind` should be created for this user.
    /// HR kinds have no switch and are always delivered.
    pub fn allows(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::TaskAssigned => self.task_assigned,
            NotificationKind::TaskUpdated => self.task_updated,
            NotificationKind::TaskCompleted => self.task_completed,
            NotificationKind::TaskCommented => self.task_commented,
            NotificationKind::TaskDueSoon => self.task_due_soon,
            NotificationKind::ProjectCreated => self.project_created,
            NotificationKind::UserJoined => self.user_joined,
            NotificationKind::FileUploaded => self.file_uploaded,
            NotificationKind::HrProblem
            | NotificationKind::HrProblemUpdate
            | NotificationKind::HrProblemAssigned => true,
        }
    }
}

/// Partial preference update; absent fields keep their current value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PreferencesUpdate {
    /// New [`NotificationPreferences::task_assigned`].
    pub task_assigned: Option<bool>,
    /// New [`NotificationPreferences::task_updated`].
    pub task_updated: Option<bool>,
    /// New [`NotificationPreferences::task_completed`].
    pub task_completed: Option<bool>,
    /// New [`NotificationPreferences::task_commented`].
    pub task_commented: Option<bool>,
    /// New [`NotificationPreferences::task_due_soon`].
    pub task_due_soon: Option<bool>,
    /// New [`NotificationPreferences::project_created`].
    pub project_created: Option<bool>,
    /// New [`NotificationPreferences::user_joined`].
    pub user_joined: Option<bool>,
    /// New [`NotificationPreferences::file_uploaded`].
    pub file_uploaded: Option<bool>,
    /// New [`NotificationPreferences::email_notifications`].
    pub email_notifications: Option<bool>,
    /// New [`NotificationPreferences::push_notifications`].
    pub push_notifications: Option<bool>,
    /// New [`NotificationPreferences::in_app_notifications`].
    pub in_app_notifications: Option<bool>,
}

impl PreferencesUpdate {
    /// Overlay the present fields onto `prefs`.
    pub fn apply(&self, prefs: &mut NotificationPreferences) {
        let fields = [
            (self.task_assigned, &mut prefs.task_assigned),
            (self.task_updated, &mut prefs.task_updated),
            (self.task_completed, &mut prefs.task_completed),
            (self.task_commented, &mut prefs.task_commented),
            (self.task_due_soon, &mut prefs.task_due_soon),
            (self.project_created, &mut prefs.project_created),
            (self.user_joined, &mut prefs.user_joined),
            (self.file_uploaded, &mut prefs.file_uploaded),
            (self.email_notifications, &mut prefs.email_notifications),
            (self.push_notifications, &mut prefs.push_notifications),
            (self.in_app_notifications, &mut prefs.in_app_notifications),
        ];
        for (update, field) in fields {
            if let Some(value) = update {
                *field = value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stored_notification_to_frame() {
        let created_at = Utc::now();
        let stored = StoredNotification {
            id: 3,
            user_id: 9,
            kind: NotificationKind::TaskDueSoon,
            title: "Due tomorrow".into(),
            message: "Quarterly report".into(),
            data: json!({"task_id": 4}),
            is_read: false,
            read_at: None,
            created_at,
        };
        let frame = stored.to_notification();
        assert_eq!(frame.kind, NotificationKind::TaskDueSoon);
        assert_eq!(frame.user_id, Some(9));
        assert_eq!(frame.timestamp, created_at);
        assert_eq!(frame.data["task_id"], 4);
    }

    #[test]
    fn default_preferences_allow_everything_but_email() {
        let prefs = NotificationPreferences::default();
        assert!(prefs.allows(NotificationKind::TaskAssigned));
        assert!(prefs.allows(NotificationKind::HrProblem));
        assert!(!prefs.email_notifications);
    }

    #[test]
    fn disabled_kind_is_refused_but_hr_kinds_are_not() {
        let prefs = NotificationPreferences {
            task_commented: false,
            ..NotificationPreferences::default()
        };
        assert!(!prefs.allows(NotificationKind::TaskCommented));
        assert!(prefs.allows(NotificationKind::TaskUpdated));
        assert!(prefs.allows(NotificationKind::HrProblemAssigned));
    }

    #[test]
    fn update_touches_only_present_fields() {
        let update: PreferencesUpdate =
            serde_json::from_value(json!({"task_updated": false, "email_notifications": true}))
                .unwrap();
        let mut prefs = NotificationPreferences::default();
        update.apply(&mut prefs);
        assert!(!prefs.task_updated);
        assert!(prefs.email_notifications);
        assert!(prefs.task_assigned);
        assert!(prefs.push_notifications);
    }

    #[test]
    fn update_rejects_non_boolean_switch() {
        let result = serde_json::from_value::<PreferencesUpdate>(json!({"task_updated": "no"}));
        assert!(result.is_err());
    }
}
