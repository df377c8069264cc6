//! `SQLite` backend.

pub mod connection;
pub mod migrations;
pub mod store;

pub use connection::{ConnectionConfig, ConnectionPool, new_file, new_in_memory};
pub use migrations::run_migrations;
pub use store::SqliteChatStore;
