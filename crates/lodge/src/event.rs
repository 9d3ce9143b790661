//! Room events: immutable notifications consumed by the room handler.

use std::fmt;
use std::sync::Arc;

use crate::client::Client;

/// Something that happened in a room, tagged with the client that caused
/// it. Produced by membership and data operations, consumed solely by the
/// room's handler loop.
pub enum Event<C, D> {
    /// A client joined the room.
    Join(Arc<Client<C, D>>),
    /// A client left the room (or was removed).
    Leave(Arc<Client<C, D>>),
    /// A client sent application data into the room.
    Custom {
        /// The originating client.
        client: Arc<Client<C, D>>,
        /// The caller-defined payload.
        data: D,
    },
}

impl<C, D> Event<C, D> {
    /// The client this event refers to.
    pub fn client(&self) -> &Arc<Client<C, D>> {
        match self {
            Self::Join(client) | Self::Leave(client) => client,
            Self::Custom { client, .. } => client,
        }
    }

    /// The event's kind, for logging and dispatch.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Join(_) => EventKind::Join,
            Self::Leave(_) => EventKind::Leave,
            Self::Custom { .. } => EventKind::Custom,
        }
    }
}

/// Discriminant of an [`Event`], independent of its payload types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Join,
    Leave,
    Custom,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Join => write!(f, "join"),
            Self::Leave => write!(f, "leave"),
            Self::Custom => write!(f, "custom"),
        }
    }
}
