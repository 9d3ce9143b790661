//! Hub-wide policy knobs.

use std::time::Duration;

/// Capacity of each room's event queue.
///
/// Generous on purpose: transient handler slowness must not trip the
/// overflow policy (queue full closes the room) under normal load.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Capacity of each client's outbound buffer.
///
/// A client whose consumer falls this far behind is disconnected rather
/// than allowed to push backpressure into the room.
pub const CLIENT_BUFFER_CAPACITY: usize = 256;

/// Configuration shared by every room a [`Hub`](crate::Hub) creates.
///
/// Policy is per-deployment, not per-room: all rooms in a hub use the
/// same idle-close delay.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// How long a room may sit with zero members before it is closed
    /// and removed from the hub.
    pub idle_close_delay: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            idle_close_delay: Duration::from_secs(120),
        }
    }
}
