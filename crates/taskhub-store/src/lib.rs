//! # taskhub-store
//!
//! Persistence collaborators for the chat server.
//!
//! - [`traits`]: the async interfaces the server consumes
//!   ([`ParticipantStore`], [`MessageStore`], [`RoomStore`], [`NotificationStore`])
//! - [`sqlite`]: pooled `SQLite` implementation with embedded migrations
//! - [`memory`]: in-process implementation for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod memory;
pub mod sqlite;
pub mod traits;
pub mod types;

pub use errors::{Result, StoreError};
pub use memory::MemoryChatStore;
pub use sqlite::{ConnectionConfig, ConnectionPool, SqliteChatStore, new_file, new_in_memory, run_migrations};
pub use traits::{ChatStore, MessageStore, NotificationStore, ParticipantStore, RoomStore};
pub use types::{
    ChatRoom, Member, NewMessage, NotificationPreferences, PreferencesUpdate, SavedMessage,
    StoredMessage, StoredNotification, TEAM_CHAT_NAME,
};
