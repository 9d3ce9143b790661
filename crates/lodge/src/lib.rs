//! Room-based presence and messaging core.
//!
//! Lodge is a process-local hub that lets many independent connections join
//! named rooms, exchange typed messages, and observe join/leave/custom
//! events, with automatic reclamation of rooms that stay empty. It carries
//! no wire format of its own — transports plug in at the edges.
//!
//! # Key types
//!
//! - [`RoomLogic`] — the trait applications implement (room init + handler)
//! - [`Hub`] — keyed registry that creates each room exactly once
//! - [`Room`] — membership, event stream, broadcast, idle auto-close
//! - [`Client`] — one connected participant with a bounded outbound path
//! - [`Event`] — join/leave/custom notifications fed to the room handler

mod client;
mod config;
mod error;
mod event;
mod hub;
mod logic;
mod room;

pub use client::{Client, ClientId};
pub use config::{CLIENT_BUFFER_CAPACITY, EVENT_QUEUE_CAPACITY, HubConfig};
pub use error::{HubError, InitError, RoomError, SendError};
pub use event::{Event, EventKind};
pub use hub::Hub;
pub use logic::RoomLogic;
pub use room::{Events, Room};
