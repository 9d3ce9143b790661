//! Error types for the hub, room, and client layers.

use crate::client::ClientId;

/// Error returned by a room's init hook.
///
/// Kept as a plain message so the same failure can be handed to every
/// caller concurrently waiting on the room's creation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct InitError {
    message: String,
}

impl InitError {
    /// Creates an init error from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InitError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for InitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Errors surfaced by [`Hub::get_or_create`](crate::Hub::get_or_create).
#[derive(Debug, Clone, thiserror::Error)]
pub enum HubError {
    /// The room id was empty.
    #[error("invalid room id: must be non-empty")]
    InvalidRoomId,

    /// The room's init hook failed. Every caller waiting on the same
    /// creation attempt receives this same error.
    #[error("room init failed: {0}")]
    InitFailed(#[from] InitError),
}

/// Client-level delivery failures. Both mean "this client is no longer
/// reachable"; `BufferFull` additionally closes the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The client has already been closed.
    #[error("client disconnected")]
    Disconnected,

    /// The client's outbound buffer was full. The client is closed as a
    /// side effect — a slow consumer is disconnected, not waited on.
    #[error("outbound buffer full, client disconnected")]
    BufferFull,
}

/// Errors surfaced by room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room's cancellation signal has already fired.
    #[error("room {0} is closed")]
    Closed(String),

    /// The referenced client is not currently a member of the room.
    #[error("client {0} is not a member of this room")]
    NotAMember(ClientId),

    /// Delivery to a client failed. The client has been removed from
    /// the room as part of handling this error.
    #[error("delivery to client {client_id} failed: {source}")]
    Delivery {
        /// The client that could not be reached.
        client_id: ClientId,
        /// The underlying client-level failure.
        #[source]
        source: SendError,
    },
}
