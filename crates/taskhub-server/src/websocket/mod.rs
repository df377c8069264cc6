//! WebSocket chat core: sessions, room and connection registries, frame
//! dispatch, and broadcasting.

pub mod broadcast;
pub mod connection;
pub mod handler;
pub mod registry;
pub mod rooms;
pub mod session;
