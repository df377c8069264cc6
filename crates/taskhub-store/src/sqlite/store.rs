//! [`SqliteChatStore`]: the production implementation of the store traits.
//!
//! Each call checks a connection out of the pool on a blocking thread, so the
//! async runtime never waits on disk I/O.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;
use taskhub_core::{
    ChatRole, MessageType, NotificationKind, Participant, RoomId, UserId, UserIdentity,
};

use super::connection::ConnectionPool;
use crate::errors::{Result, StoreError};
use crate::traits::{MessageStore, NotificationStore, ParticipantStore, RoomStore};
use crate::types::{
    ChatRoom, DEFAULT_MAX_MEMBERS, Member, NewMessage, NotificationPreferences, SavedMessage,
    StoredMessage, StoredNotification,
};

const ROOM_COLUMNS: &str =
    "id, name, description, created_by, max_members, last_message, created_at";

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, kind, title, message, data, is_read, read_at, created_at";

const PREFERENCE_COLUMNS: &str = "task_assigned, task_updated, task_completed, task_commented, \
     task_due_soon, project_created, user_joined, file_uploaded, email_notifications, \
     push_notifications, in_app_notifications";

/// Chat persistence over an `r2d2` pool of `SQLite` connections.
#[derive(Clone)]
pub struct SqliteChatStore {
    pool: ConnectionPool,
}

impl SqliteChatStore {
    /// Wrap a pool whose schema has already been migrated.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("store task failed: {e}")))?
    }
}

// ── Row mapping ─────────────────────────────────────────────────────────────

fn room_from_row(row: &Row<'_>) -> rusqlite::Result<ChatRoom> {
    Ok(ChatRoom {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_by: row.get(3)?,
        max_members: row.get(4)?,
        last_message: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<StoredMessage> {
    let message_type: String = row.get(5)?;
    Ok(StoredMessage {
        id: row.get(0)?,
        room_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row.get(3)?,
        content: row.get(4)?,
        message_type: MessageType::parse(&message_type),
        reply_to_id: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<StoredNotification> {
    let kind: String = row.get(2)?;
    let kind = NotificationKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown notification kind: {kind}").into(),
        )
    })?;
    let data: Option<Value> = row.get(5)?;
    Ok(StoredNotification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind,
        title: row.get(3)?,
        message: row.get(4)?,
        data: data.unwrap_or(Value::Null),
        is_read: row.get(6)?,
        read_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn preferences_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationPreferences> {
    Ok(NotificationPreferences {
        task_assigned: row.get(0)?,
        task_updated: row.get(1)?,
        task_completed: row.get(2)?,
        task_commented: row.get(3)?,
        task_due_soon: row.get(4)?,
        project_created: row.get(5)?,
        user_joined: row.get(6)?,
        file_uploaded: row.get(7)?,
        email_notifications: row.get(8)?,
        push_notifications: row.get(9)?,
        in_app_notifications: row.get(10)?,
    })
}

fn write_preferences(
    conn: &Connection,
    user_id: UserId,
    p: &NotificationPreferences,
    replace: bool,
) -> Result<()> {
    let verb = if replace { "INSERT OR REPLACE" } else { "INSERT OR IGNORE" };
    let sql = format!(
        "{verb} INTO notification_preferences (user_id, {PREFERENCE_COLUMNS}, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
    );
    let _ = conn.execute(
        &sql,
        params![
            user_id,
            p.task_assigned,
            p.task_updated,
            p.task_completed,
            p.task_commented,
            p.task_due_soon,
            p.project_created,
            p.user_joined,
            p.file_uploaded,
            p.email_notifications,
            p.push_notifications,
            p.in_app_notifications,
            Utc::now(),
        ],
    )?;
    Ok(())
}

fn find_room(conn: &Connection, clause: &str, param: &dyn rusqlite::ToSql) -> Result<Option<ChatRoom>> {
    let sql = format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE {clause} ORDER BY id LIMIT 1");
    Ok(conn.query_row(&sql, [param], room_from_row).optional()?)
}

fn insert_participant(
    conn: &Connection,
    room_id: RoomId,
    user: &UserIdentity,
    role: ChatRole,
) -> Result<()> {
    let _ = conn.execute(
        "INSERT OR IGNORE INTO chat_participants
           (room_id, user_id, username, user_role, chat_role, is_blocked, joined_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        params![room_id, user.id, user.username, user.role, role.as_str(), Utc::now()],
    )?;
    Ok(())
}

fn room_exists(conn: &Connection, room_id: RoomId) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM chat_rooms WHERE id = ?1", [room_id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

// ── Trait implementations ───────────────────────────────────────────────────

#[async_trait]
impl ParticipantStore for SqliteChatStore {
    async fn participant(&self, room_id: RoomId, user_id: UserId) -> Result<Option<Participant>> {
        self.with_conn(move |conn| {
            let participant = conn
                .query_row(
                    "SELECT username, chat_role, is_blocked FROM chat_participants
                     WHERE room_id = ?1 AND user_id = ?2",
                    params![room_id, user_id],
                    |row| {
                        let role: String = row.get(1)?;
                        Ok(Participant {
                            room_id,
                            user_id,
                            username: row.get(0)?,
                            role: ChatRole::parse(&role),
                            is_blocked: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(participant)
        })
        .await
    }
}

#[async_trait]
impl MessageStore for SqliteChatStore {
    async fn save_message(&self, message: NewMessage) -> Result<SavedMessage> {
        self.with_conn(move |conn| {
            let created_at = Utc::now();
            let _ = conn.execute(
                "INSERT INTO chat_messages
                   (room_id, sender_id, sender_name, content, message_type, reply_to_id, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    message.room_id,
                    message.sender_id,
                    message.sender_name,
                    message.content,
                    message.message_type.as_str(),
                    message.reply_to_id,
                    message.metadata,
                    created_at,
                ],
            )?;
            Ok(SavedMessage {
                id: conn.last_insert_rowid() as u64,
                created_at,
            })
        })
        .await
    }

    async fn touch_room_last_message(&self, room_id: RoomId, at: DateTime<Utc>) -> Result<()> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE chat_rooms SET last_message = ?1 WHERE id = ?2",
                params![at, room_id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("room {room_id}")));
            }
            Ok(())
        })
        .await
    }

    async fn messages(&self, room_id: RoomId, page: u32, limit: u32) -> Result<Vec<StoredMessage>> {
        let offset = u64::from(page.saturating_sub(1)) * u64::from(limit);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, room_id, sender_id, sender_name, content, message_type, reply_to_id, created_at
                 FROM chat_messages WHERE room_id = ?1
                 ORDER BY id DESC LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt.query_map(params![room_id, limit, offset], message_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }
}

#[async_trait]
impl RoomStore for SqliteChatStore {
    async fn room(&self, room_id: RoomId) -> Result<Option<ChatRoom>> {
        self.with_conn(move |conn| find_room(conn, "id = ?1", &room_id))
            .await
    }

    async fn room_by_name(&self, name: &str) -> Result<Option<ChatRoom>> {
        let name = name.to_string();
        self.with_conn(move |conn| find_room(conn, "name = ?1", &name))
            .await
    }

    async fn create_room(
        &self,
        name: &str,
        description: &str,
        creator: &UserIdentity,
    ) -> Result<ChatRoom> {
        let name = name.to_string();
        let description = description.to_string();
        let creator = creator.clone();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let created_at = Utc::now();
            let _ = tx.execute(
                "INSERT INTO chat_rooms (name, description, created_by, max_members, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![name, description, creator.id, DEFAULT_MAX_MEMBERS, created_at],
            )?;
            let id = tx.last_insert_rowid() as u64;
            insert_participant(&tx, id, &creator, ChatRole::Member)?;
            tx.commit()?;
            Ok(ChatRoom {
                id,
                name,
                description,
                created_by: creator.id,
                max_members: DEFAULT_MAX_MEMBERS,
                last_message: None,
                created_at,
            })
        })
        .await
    }

    async fn add_participant(
        &self,
        room_id: RoomId,
        user: &UserIdentity,
        role: ChatRole,
    ) -> Result<()> {
        let user = user.clone();
        self.with_conn(move |conn| {
            if !room_exists(conn, room_id)? {
                return Err(StoreError::NotFound(format!("room {room_id}")));
            }
            insert_participant(conn, room_id, &user, role)
        })
        .await
    }

    async fn set_blocked(&self, room_id: RoomId, user_id: UserId, blocked: bool) -> Result<()> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE chat_participants SET is_blocked = ?1 WHERE room_id = ?2 AND user_id = ?3",
                params![blocked, room_id, user_id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!(
                    "participant {user_id} in room {room_id}"
                )));
            }
            Ok(())
        })
        .await
    }

    async fn members(&self, room_id: RoomId) -> Result<Vec<Member>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, username, user_role FROM chat_participants
                 WHERE room_id = ?1 ORDER BY user_id",
            )?;
            let rows = stmt.query_map([room_id], |row| {
                Ok(Member {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    role: row.get(2)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }
}

#[async_trait]
impl NotificationStore for SqliteChatStore {
    async fn create_notification(
        &self,
        user_id: UserId,
        kind: NotificationKind,
        title: &str,
        message: &str,
        data: Value,
    ) -> Result<StoredNotification> {
        let title = title.to_string();
        let message = message.to_string();
        self.with_conn(move |conn| {
            let created_at = Utc::now();
            let stored_data = (!data.is_null()).then_some(&data);
            let _ = conn.execute(
                "INSERT INTO notifications (user_id, kind, title, message, data, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![user_id, kind.as_str(), title, message, stored_data, created_at],
            )?;
            Ok(StoredNotification {
                id: conn.last_insert_rowid() as u64,
                user_id,
                kind,
                title,
                message,
                data,
                is_read: false,
                read_at: None,
                created_at,
            })
        })
        .await
    }

    async fn notifications(&self, user_id: UserId, limit: u32) -> Result<Vec<StoredNotification>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                 WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![user_id, limit], notification_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn unread_count(&self, user_id: UserId) -> Result<u64> {
        self.with_conn(move |conn| {
            let count: u64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
    }

    async fn mark_read(&self, id: u64, user_id: UserId) -> Result<()> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1, read_at = COALESCE(read_at, ?1)
                 WHERE id = ?2 AND user_id = ?3",
                params![Utc::now(), id, user_id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("notification {id}")));
            }
            Ok(())
        })
        .await
    }

    async fn mark_all_read(&self, user_id: UserId) -> Result<u64> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1, read_at = ?1
                 WHERE user_id = ?2 AND is_read = 0",
                params![Utc::now(), user_id],
            )?;
            Ok(changed as u64)
        })
        .await
    }

    async fn delete_notification(&self, id: u64, user_id: UserId) -> Result<bool> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "DELETE FROM notifications WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn preferences(&self, user_id: UserId) -> Result<NotificationPreferences> {
        self.with_conn(move |conn| {
            write_preferences(conn, user_id, &NotificationPreferences::default(), false)?;
            let sql = format!(
                "SELECT {PREFERENCE_COLUMNS} FROM notification_preferences WHERE user_id = ?1"
            );
            Ok(conn.query_row(&sql, [user_id], preferences_from_row)?)
        })
        .await
    }

    async fn save_preferences(
        &self,
        user_id: UserId,
        preferences: &NotificationPreferences,
    ) -> Result<()> {
        let preferences = *preferences;
        self.with_conn(move |conn| write_preferences(conn, user_id, &preferences, true))
            .await
    }
}
