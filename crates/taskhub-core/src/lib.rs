//! # taskhub-core
//!
//! Shared vocabulary for the taskhub chat server.
//!
//! - **IDs**: [`ConnectionId`] and [`RoomKey`] newtypes, numeric [`UserId`] / [`RoomId`]
//! - **Chat types**: [`ChatRole`], [`MessageType`], [`Participant`], [`UserIdentity`]
//! - **Wire frames**: [`InboundFrame`] decoded from clients, [`OutboundFrame`] and
//!   [`Notification`] pushed to them
//! - **Logging**: [`logging::init_subscriber`]

#![deny(unsafe_code)]

pub mod chat;
pub mod frames;
pub mod ids;
pub mod logging;

pub use chat::{ChatRole, MessageType, Participant, UserIdentity};
pub use frames::{
    ChatMessageEvent, FrameKind, InboundFrame, Notification, NotificationKind, OutboundFrame,
    PresenceEvent,
};
pub use ids::{ConnectionId, RoomId, RoomKey, UserId};
