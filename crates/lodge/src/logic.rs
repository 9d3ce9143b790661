//! The `RoomLogic` trait — the extension point applications implement.
//!
//! The hub calls these hooks at the right time; the application only
//! writes room behavior. Both hooks return `impl Future + Send` so the
//! hub can run them as independent tasks; implementations can use plain
//! `async fn` syntax.

use std::future::Future;
use std::sync::Arc;

use crate::error::InitError;
use crate::room::{Events, Room};

/// Per-application room behavior.
///
/// The associated types define the shape of a deployment's data:
/// - `RoomMeta` — produced once per room by [`init`](Self::init)
/// - `ClientMeta` — caller-supplied per-connection metadata
/// - `Data` — the message type exchanged between clients (`Clone` so
///   broadcasts can fan one value out to every member)
pub trait RoomLogic: Sized + Send + Sync + 'static {
    /// Room metadata, produced once by a successful `init`.
    type RoomMeta: Send + Sync + 'static;

    /// Per-connection metadata, immutable after `add_client`.
    type ClientMeta: Send + Sync + 'static;

    /// The message type delivered to clients.
    type Data: Clone + Send + Sync + 'static;

    /// Initializes a room, e.g. loading its state from elsewhere.
    ///
    /// Called once per room, asynchronously, before the room becomes
    /// usable. An error fails creation for every caller concurrently
    /// waiting on it. A panic is contained and treated as a failure.
    fn init(
        &self,
        room_id: &str,
    ) -> impl Future<Output = Result<Self::RoomMeta, InitError>> + Send;

    /// The room's handler loop. Started once after a successful `init`;
    /// the room closes when it returns. [`Events::next`] yields `None`
    /// once the room's cancellation signal fires, so a plain
    /// `while let Some(event) = events.next().await` loop shuts down
    /// cooperatively.
    fn run(
        &self,
        room: Arc<Room<Self>>,
        events: Events<Self::ClientMeta, Self::Data>,
    ) -> impl Future<Output = ()> + Send;
}
