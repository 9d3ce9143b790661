//! Room lifecycle, membership, and event delivery.
//!
//! A room owns a copy-on-write membership map and a bounded event queue.
//! Writers replace the membership map under a short lock; readers clone
//! the `Arc` and iterate a consistent snapshot without holding anything.
//! Emitting an event is a non-blocking `try_send` — if the queue is full
//! the room is closed rather than letting a stalled handler back up its
//! producers.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::{Client, ClientId};
use crate::config::{EVENT_QUEUE_CAPACITY, HubConfig};
use crate::error::{InitError, RoomError};
use crate::event::Event;
use crate::logic::RoomLogic;

type Members<L> =
    HashMap<ClientId, Arc<Client<<L as RoomLogic>::ClientMeta, <L as RoomLogic>::Data>>>;

/// Where the room is in its two-phase startup.
#[derive(Debug, Clone)]
enum InitPhase {
    Pending,
    Ready,
    Failed(InitError),
}

/// The event stream handed to a room's handler.
///
/// The handler is the queue's only consumer. `next` observes the room's
/// cancellation signal, so the stream ends when the room closes even
/// though the underlying channel is never explicitly closed.
pub struct Events<C, D> {
    rx: mpsc::Receiver<Event<C, D>>,
    cancel: CancellationToken,
}

impl<C, D> Events<C, D> {
    /// Waits for the next event. Returns `None` once the room closes.
    pub async fn next(&mut self) -> Option<Event<C, D>> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            event = self.rx.recv() => event,
        }
    }
}

/// A named, isolated group of clients sharing an event stream.
///
/// Created through [`Hub::get_or_create`](crate::Hub::get_or_create);
/// every handle is an `Arc`, and all operations take `&self`, so rooms
/// can be driven from any task, including their own handler.
pub struct Room<L: RoomLogic> {
    id: String,
    metadata: OnceLock<L::RoomMeta>,
    clients: RwLock<Arc<Members<L>>>,
    events_tx: mpsc::Sender<Event<L::ClientMeta, L::Data>>,
    cancel: CancellationToken,
    idle_timer: Mutex<Option<JoinHandle<()>>>,
    init_rx: watch::Receiver<InitPhase>,
    idle_close_delay: Duration,
}

impl<L: RoomLogic> Room<L> {
    /// Creates the room and kicks off its asynchronous initialization.
    /// The room is registered before init completes; callers wait via
    /// [`initialized`](Self::initialized).
    pub(crate) fn spawn(id: String, logic: Arc<L>, config: &HubConfig) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (init_tx, init_rx) = watch::channel(InitPhase::Pending);

        let room = Arc::new(Self {
            id,
            metadata: OnceLock::new(),
            clients: RwLock::new(Arc::new(HashMap::new())),
            events_tx,
            cancel: CancellationToken::new(),
            idle_timer: Mutex::new(None),
            init_rx,
            idle_close_delay: config.idle_close_delay,
        });

        tokio::spawn(Self::lifecycle(
            Arc::clone(&room),
            logic,
            events_rx,
            init_tx,
        ));
        room
    }

    /// Runs init, then the handler, containing panics at each boundary.
    /// Whatever happens, the room ends up closed.
    async fn lifecycle(
        room: Arc<Self>,
        logic: Arc<L>,
        events_rx: mpsc::Receiver<Event<L::ClientMeta, L::Data>>,
        init_tx: watch::Sender<InitPhase>,
    ) {
        let mut init_task = tokio::spawn({
            let logic = Arc::clone(&logic);
            let id = room.id.clone();
            async move { logic.init(&id).await }
        });

        let outcome = tokio::select! {
            _ = room.cancel.cancelled() => {
                init_task.abort();
                Err(InitError::new(format!("room {} closed during init", room.id)))
            }
            joined = &mut init_task => match joined {
                Ok(result) => result,
                Err(join_err) => {
                    if join_err.is_panic() {
                        tracing::error!(room_id = %room.id, "room init panicked");
                    }
                    Err(InitError::new(format!("room {} init aborted", room.id)))
                }
            }
        };

        let metadata = match outcome {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::warn!(room_id = %room.id, error = %err, "room init failed");
                room.close();
                let _ = init_tx.send(InitPhase::Failed(err));
                return;
            }
        };

        let _ = room.metadata.set(metadata);
        let _ = init_tx.send(InitPhase::Ready);
        tracing::info!(room_id = %room.id, "room running");

        let handler = tokio::spawn({
            let room = Arc::clone(&room);
            let events = Events {
                rx: events_rx,
                cancel: room.cancel.clone(),
            };
            async move { logic.run(room, events).await }
        });

        if let Err(join_err) = handler.await {
            if join_err.is_panic() {
                tracing::error!(room_id = %room.id, "room handler panicked");
            }
        }
        room.close();
    }

    /// Waits for init to finish. Callers that did not create the room
    /// join the in-flight initialization and observe the same outcome.
    pub(crate) async fn initialized(&self) -> Result<(), InitError> {
        let mut rx = self.init_rx.clone();
        let waited = rx
            .wait_for(|phase| !matches!(phase, InitPhase::Pending))
            .await;
        match waited.as_deref() {
            Ok(InitPhase::Ready) => Ok(()),
            Ok(InitPhase::Failed(err)) => Err(err.clone()),
            // Pending is excluded by the predicate; a dropped sender
            // means the lifecycle task was torn down mid-init.
            _ => Err(InitError::new(format!(
                "room {} closed during init",
                self.id
            ))),
        }
    }

    /// Returns the room's unique id within its hub.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the metadata produced by the init hook. `None` only
    /// while initialization is still in flight or after it failed.
    pub fn metadata(&self) -> Option<&L::RoomMeta> {
        self.metadata.get()
    }

    /// Constructs a client, adds it to the membership set, and emits a
    /// `Join` event. Any pending idle-close is cancelled.
    pub fn add_client(
        self: &Arc<Self>,
        metadata: L::ClientMeta,
    ) -> Result<Arc<Client<L::ClientMeta, L::Data>>, RoomError> {
        let client = {
            let mut members = self.clients.write();
            if self.cancel.is_cancelled() {
                return Err(RoomError::Closed(self.id.clone()));
            }
            self.cancel_idle_timer();
            let client = Arc::new(Client::new(metadata));
            let mut next = Members::<L>::clone(&members);
            next.insert(client.id(), Arc::clone(&client));
            *members = Arc::new(next);
            client
        };
        tracing::debug!(room_id = %self.id, client_id = %client.id(), "client joined");
        self.emit(Event::Join(Arc::clone(&client)));
        Ok(client)
    }

    /// Removes a client, emits `Leave`, and closes the client's delivery
    /// path. If the room became empty, arms the idle-close timer.
    pub fn remove_client(
        self: &Arc<Self>,
        client: &Arc<Client<L::ClientMeta, L::Data>>,
    ) -> Result<(), RoomError> {
        let now_empty = {
            let mut members = self.clients.write();
            if !members.contains_key(&client.id()) {
                return Err(RoomError::NotAMember(client.id()));
            }
            let mut next = Members::<L>::clone(&members);
            next.remove(&client.id());
            let now_empty = next.is_empty();
            *members = Arc::new(next);
            now_empty
        };
        tracing::debug!(room_id = %self.id, client_id = %client.id(), "client left");
        self.emit(Event::Leave(Arc::clone(client)));
        client.close();
        if now_empty {
            self.schedule_idle_close();
        }
        Ok(())
    }

    /// Emits inbound data from a client as a `Custom` event.
    pub fn handle_client_data(
        &self,
        client: &Arc<Client<L::ClientMeta, L::Data>>,
        data: L::Data,
    ) -> Result<(), RoomError> {
        if !self.is_member(client.id()) {
            return Err(RoomError::NotAMember(client.id()));
        }
        self.emit(Event::Custom {
            client: Arc::clone(client),
            data,
        });
        Ok(())
    }

    /// Delivers data to one client. A failed delivery removes the client
    /// from the room — it is never silently dropped.
    pub fn send_to_client(
        self: &Arc<Self>,
        client: &Arc<Client<L::ClientMeta, L::Data>>,
        data: L::Data,
    ) -> Result<(), RoomError> {
        if !self.is_member(client.id()) {
            return Err(RoomError::NotAMember(client.id()));
        }
        if let Err(source) = client.send(data) {
            // Already-gone clients make this racy; cleanup elsewhere wins.
            let _ = self.remove_client(client);
            return Err(RoomError::Delivery {
                client_id: client.id(),
                source,
            });
        }
        Ok(())
    }

    /// Delivers data to every member. Failed deliveries remove the
    /// offending client and are logged; remaining members still receive.
    pub fn broadcast(self: &Arc<Self>, data: L::Data) {
        self.fan_out(None, data);
    }

    /// Like [`broadcast`](Self::broadcast), skipping one client.
    pub fn broadcast_except(
        self: &Arc<Self>,
        except: &Arc<Client<L::ClientMeta, L::Data>>,
        data: L::Data,
    ) {
        self.fan_out(Some(except.id()), data);
    }

    fn fan_out(self: &Arc<Self>, except: Option<ClientId>, data: L::Data) {
        let members = self.snapshot();
        for client in members.values() {
            if Some(client.id()) == except {
                continue;
            }
            if let Err(err) = client.send(data.clone()) {
                tracing::warn!(
                    room_id = %self.id,
                    client_id = %client.id(),
                    error = %err,
                    "removing client after failed delivery"
                );
                let _ = self.remove_client(client);
            }
        }
    }

    /// Pushes an event onto the room's queue without blocking. A full
    /// queue means the handler has stalled beyond what the buffer
    /// absorbs, and the room is closed (shed load, don't retry).
    pub fn emit(&self, event: Event<L::ClientMeta, L::Data>) {
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(
                    room_id = %self.id,
                    kind = %event.kind(),
                    "event queue full, closing room"
                );
                self.close();
            }
            // Handler finished and dropped the receiver: the room is
            // already on its way down.
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Returns a point-in-time list of the room's members.
    pub fn clients(&self) -> Vec<Arc<Client<L::ClientMeta, L::Data>>> {
        self.snapshot().values().cloned().collect()
    }

    /// Returns the first member whose metadata matches the predicate.
    pub fn find_client(
        &self,
        predicate: impl Fn(&L::ClientMeta) -> bool,
    ) -> Option<Arc<Client<L::ClientMeta, L::Data>>> {
        self.snapshot()
            .values()
            .find(|client| predicate(client.metadata()))
            .cloned()
    }

    /// Returns the current number of members.
    pub fn client_count(&self) -> usize {
        self.snapshot().len()
    }

    /// Closes the room: fires the cancellation signal, cancels any idle
    /// timer, closes every member, and clears membership. Idempotent and
    /// safe to call from any task, including the room's own handler.
    pub fn close(&self) {
        let first = !self.cancel.is_cancelled();
        self.cancel_idle_timer();
        self.cancel.cancel();
        let members = {
            let mut members = self.clients.write();
            std::mem::take(&mut *members)
        };
        for client in members.values() {
            client.close();
        }
        if first {
            tracing::info!(room_id = %self.id, clients = members.len(), "room closed");
        }
    }

    /// Returns `true` once the room's cancellation signal has fired.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes once the room closes. Cancellation-safe.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    fn is_member(&self, id: ClientId) -> bool {
        self.clients.read().contains_key(&id)
    }

    fn snapshot(&self) -> Arc<Members<L>> {
        Arc::clone(&self.clients.read())
    }

    /// Arms the idle-close timer, replacing any previous one. The room
    /// closes when the timer fires with membership still empty.
    fn schedule_idle_close(self: &Arc<Self>) {
        let mut slot = self.idle_timer.lock();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        let room = Arc::clone(self);
        let delay = self.idle_close_delay;
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if room.client_count() == 0 {
                tracing::info!(room_id = %room.id, "closing idle room");
                room.close();
            }
        }));
    }

    fn cancel_idle_timer(&self) {
        if let Some(timer) = self.idle_timer.lock().take() {
            timer.abort();
        }
    }
}
