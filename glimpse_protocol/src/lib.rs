//! Wire types for the glimpse signaling relay
//!
//! Two kinds of traffic cross the wire:
//!
//! - [`Message`] envelopes pushed to a connected user, serialized as
//!   `{"type": <integer>, "payload": <value>}`.
//! - Control-plane request and response bodies (see [`requests`]) used to
//!   create, join, approve, deny, relay and end rooms.

#![forbid(unsafe_code)]

mod message;
pub mod requests;

pub use message::{
    JoinRoomRequestPayload, JoinRoomResultPayload, Message, MessageType, RoomPayload,
};

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Borrow the id as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True for the empty string
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// Caller-supplied user identity. Not issued or verified by the server.
    UserId
);

string_id!(
    /// Server-generated room identifier
    RoomId
);

string_id!(
    /// Server-generated join request identifier
    RequestId
);
