//! The hub: a keyed registry that creates each room at most once.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::HubConfig;
use crate::error::HubError;
use crate::logic::RoomLogic;
use crate::room::Room;

/// Registry of rooms, keyed by non-empty string ids.
///
/// Lookups take the shared side of the lock; only the creation race and
/// deregistration take the exclusive side, and neither is ever held
/// across an `.await` — waiting for a room's init happens outside.
pub struct Hub<L: RoomLogic> {
    logic: Arc<L>,
    config: HubConfig,
    rooms: RwLock<HashMap<String, Arc<Room<L>>>>,
}

impl<L: RoomLogic> Hub<L> {
    /// Creates a hub with default configuration.
    pub fn new(logic: L) -> Arc<Self> {
        Self::with_config(logic, HubConfig::default())
    }

    /// Creates a hub with explicit configuration.
    pub fn with_config(logic: L, config: HubConfig) -> Arc<Self> {
        Arc::new(Self {
            logic: Arc::new(logic),
            config,
            rooms: RwLock::new(HashMap::new()),
        })
    }

    /// Returns the room for `id`, creating it if absent.
    ///
    /// Creation is double-checked: concurrent callers racing on the same
    /// unseen id all end up with the same room and the init hook runs
    /// exactly once. Every caller then waits for that initialization and
    /// observes the same success or the same [`HubError::InitFailed`].
    pub async fn get_or_create(self: &Arc<Self>, id: &str) -> Result<Arc<Room<L>>, HubError> {
        if id.is_empty() {
            return Err(HubError::InvalidRoomId);
        }

        let existing = self.rooms.read().get(id).cloned();
        let (room, created) = match existing {
            Some(room) => (room, false),
            None => {
                let mut rooms = self.rooms.write();
                match rooms.entry(id.to_string()) {
                    Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
                    Entry::Vacant(entry) => {
                        let room =
                            Room::spawn(id.to_string(), Arc::clone(&self.logic), &self.config);
                        entry.insert(Arc::clone(&room));
                        tracing::info!(room_id = %id, "room created");
                        (room, true)
                    }
                }
            }
        };

        let init = room.initialized().await;

        if created {
            match &init {
                // Keep the registry honest: the slot belongs to this room
                // only while it is alive.
                Ok(()) => self.watch_for_close(&room),
                Err(_) => self.deregister(&room),
            }
        }

        init?;
        Ok(room)
    }

    /// Returns the room for `id` without creating one.
    pub fn get(&self, id: &str) -> Option<Arc<Room<L>>> {
        self.rooms.read().get(id).cloned()
    }

    /// Returns the number of registered rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    /// Lists the ids of all registered rooms.
    pub fn room_ids(&self) -> Vec<String> {
        self.rooms.read().keys().cloned().collect()
    }

    /// Closes every registered room. Deregistration follows through each
    /// room's close watcher.
    pub fn close_all(&self) {
        for room in self.rooms.read().values() {
            room.close();
        }
    }

    /// Deregisters the room as soon as its cancellation signal fires, so
    /// the registry never keeps serving a room that has shut down.
    fn watch_for_close(self: &Arc<Self>, room: &Arc<Room<L>>) {
        let hub = Arc::downgrade(self);
        let room = Arc::clone(room);
        tokio::spawn(async move {
            room.closed().await;
            if let Some(hub) = hub.upgrade() {
                hub.deregister(&room);
            }
        });
    }

    fn deregister(&self, room: &Arc<Room<L>>) {
        let mut rooms = self.rooms.write();
        if rooms
            .get(room.id())
            .is_some_and(|entry| Arc::ptr_eq(entry, room))
        {
            rooms.remove(room.id());
            tracing::info!(room_id = %room.id(), "room deregistered");
        }
    }
}
