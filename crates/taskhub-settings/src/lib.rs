//! # taskhub-settings
//!
//! Configuration for the taskhub chat server, loaded from three layers
//! (in priority order):
//! 1. **Compiled defaults**: [`TaskhubSettings::default()`]
//! 2. **Settings file**: `~/.taskhub/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `TASKHUB_*`, `PORT` and `JWT_SECRET`

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, default_db_path, load_settings, load_settings_from_path, settings_path,
};
pub use types::{
    AuthSettings, DatabaseSettings, LoggingSettings, ServerSettings, TaskhubSettings,
    WebSocketSettings,
};
