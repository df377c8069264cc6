//! Identifier types.
//!
//! Users and rooms are identified by the numeric primary keys of the
//! surrounding application. Live connections get a time-ordered UUID v7 so a
//! reconnecting user can be told apart from their previous socket. Rooms are
//! addressed in the in-memory registries by a [`RoomKey`], the stringified
//! room ID.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Numeric user primary key.
pub type UserId = u64;

/// Numeric chat room primary key.
pub type RoomId = u64;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

branded_id!(
    /// Unique identifier of one live WebSocket connection.
    ConnectionId
);

branded_id!(
    /// Registry key of a room: the decimal form of its [`RoomId`].
    RoomKey
);

impl ConnectionId {
    /// Create a new random ID (UUID v7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomKey {
    /// Parse the key back into a numeric room ID, if it is one.
    pub fn room_id(&self) -> Option<RoomId> {
        self.0.parse().ok()
    }
}

impl From<RoomId> for RoomKey {
    fn from(id: RoomId) -> Self {
        Self(id.to_string())
    }
}
