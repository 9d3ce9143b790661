//! Integration tests for the hub and room system using mock room logic.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use lodge::{
    CLIENT_BUFFER_CAPACITY, EVENT_QUEUE_CAPACITY, ClientId, Event, Events, Hub, HubConfig,
    HubError, InitError, Room, RoomError, RoomLogic,
};
use tokio::sync::mpsc;

// =========================================================================
// Mock logic: a chat room that broadcasts to everyone except the sender
// and mirrors every event into a channel the tests can observe.
// =========================================================================

#[derive(Debug, PartialEq, Eq)]
enum Observed {
    Join(ClientId),
    Leave(ClientId),
    Custom(ClientId, String),
}

struct ChatLogic {
    init_calls: Arc<AtomicUsize>,
    init_delay: Duration,
    observed: mpsc::UnboundedSender<Observed>,
}

impl ChatLogic {
    fn new() -> (Self, mpsc::UnboundedReceiver<Observed>, Arc<AtomicUsize>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let init_calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                init_calls: Arc::clone(&init_calls),
                init_delay: Duration::ZERO,
                observed: tx,
            },
            rx,
            init_calls,
        )
    }
}

impl RoomLogic for ChatLogic {
    type RoomMeta = String;
    type ClientMeta = String;
    type Data = String;

    async fn init(&self, room_id: &str) -> Result<String, InitError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if !self.init_delay.is_zero() {
            tokio::time::sleep(self.init_delay).await;
        }
        Ok(format!("metadata for {room_id}"))
    }

    async fn run(&self, room: Arc<Room<Self>>, mut events: Events<String, String>) {
        while let Some(event) = events.next().await {
            match event {
                Event::Join(client) => {
                    let _ = self.observed.send(Observed::Join(client.id()));
                }
                Event::Leave(client) => {
                    let _ = self.observed.send(Observed::Leave(client.id()));
                }
                Event::Custom { client, data } => {
                    let _ = self.observed.send(Observed::Custom(client.id(), data.clone()));
                    room.broadcast_except(&client, data);
                }
            }
        }
    }
}

/// Logic whose handler never consumes events, for overflow testing.
struct StallLogic;

impl RoomLogic for StallLogic {
    type RoomMeta = ();
    type ClientMeta = ();
    type Data = String;

    async fn init(&self, _room_id: &str) -> Result<(), InitError> {
        Ok(())
    }

    async fn run(&self, room: Arc<Room<Self>>, _events: Events<(), String>) {
        room.closed().await;
    }
}

/// Logic whose init always fails.
struct FailInitLogic {
    attempts: Arc<AtomicUsize>,
}

impl RoomLogic for FailInitLogic {
    type RoomMeta = ();
    type ClientMeta = ();
    type Data = String;

    async fn init(&self, room_id: &str) -> Result<(), InitError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        Err(InitError::new(format!("no backing store for {room_id}")))
    }

    async fn run(&self, _room: Arc<Room<Self>>, _events: Events<(), String>) {}
}

/// Logic that panics in init or in the handler, per flag.
struct PanicLogic {
    panic_in_init: bool,
}

impl RoomLogic for PanicLogic {
    type RoomMeta = ();
    type ClientMeta = ();
    type Data = String;

    async fn init(&self, _room_id: &str) -> Result<(), InitError> {
        if self.panic_in_init {
            panic!("init exploded");
        }
        Ok(())
    }

    async fn run(&self, _room: Arc<Room<Self>>, _events: Events<(), String>) {
        panic!("handler exploded");
    }
}

// =========================================================================
// Helpers
// =========================================================================

/// Polls `condition` across task switches, failing the test if it never
/// holds. Background tasks (close watchers, relays) get to run in between.
async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

fn ids(clients: &[Arc<lodge::Client<String, String>>]) -> Vec<ClientId> {
    clients.iter().map(|c| c.id()).collect()
}

// =========================================================================
// Hub registry
// =========================================================================

#[tokio::test]
async fn test_empty_room_id_is_rejected() {
    let (logic, _observed, _calls) = ChatLogic::new();
    let hub = Hub::new(logic);
    let result = hub.get_or_create("").await;
    assert!(matches!(result, Err(HubError::InvalidRoomId)));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_create_runs_init_exactly_once() {
    let (mut logic, _observed, init_calls) = ChatLogic::new();
    logic.init_delay = Duration::from_millis(50);
    let hub = Hub::new(logic);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let hub = Arc::clone(&hub);
        handles.push(tokio::spawn(async move {
            hub.get_or_create("alpha").await.unwrap()
        }));
    }

    let mut rooms = Vec::new();
    for handle in handles {
        rooms.push(handle.await.unwrap());
    }

    assert_eq!(init_calls.load(Ordering::SeqCst), 1);
    for room in &rooms[1..] {
        assert!(Arc::ptr_eq(&rooms[0], room));
    }
    assert_eq!(rooms[0].metadata(), Some(&"metadata for alpha".to_string()));
    assert_eq!(hub.room_count(), 1);
}

#[tokio::test]
async fn test_get_or_create_reuses_existing_room() {
    let (logic, _observed, init_calls) = ChatLogic::new();
    let hub = Hub::new(logic);

    let first = hub.get_or_create("alpha").await.unwrap();
    let second = hub.get_or_create("alpha").await.unwrap();
    let other = hub.get_or_create("beta").await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(init_calls.load(Ordering::SeqCst), 2);
    assert_eq!(hub.room_count(), 2);
    let mut room_ids = hub.room_ids();
    room_ids.sort();
    assert_eq!(room_ids, vec!["alpha", "beta"]);
}

#[tokio::test(start_paused = true)]
async fn test_init_failure_reaches_every_waiter_and_deregisters() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let hub = Hub::new(FailInitLogic {
        attempts: Arc::clone(&attempts),
    });

    let mut handles = Vec::new();
    for _ in 0..4 {
        let hub = Arc::clone(&hub);
        handles.push(tokio::spawn(async move { hub.get_or_create("broken").await }));
    }
    for handle in handles {
        let result = handle.await.unwrap();
        match result {
            Err(HubError::InitFailed(err)) => {
                assert!(err.to_string().contains("no backing store"))
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected InitFailed"),
        }
    }

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(hub.room_count(), 0);

    // A later request starts a fresh attempt.
    assert!(hub.get_or_create("broken").await.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_init_panic_fails_creation() {
    let hub = Hub::new(PanicLogic {
        panic_in_init: true,
    });
    let result = hub.get_or_create("kaboom").await;
    assert!(matches!(result, Err(HubError::InitFailed(_))));
    assert_eq!(hub.room_count(), 0);
}

#[tokio::test]
async fn test_handler_panic_closes_and_deregisters_room() {
    let hub = Hub::new(PanicLogic {
        panic_in_init: false,
    });
    let room = hub.get_or_create("kaboom").await.unwrap();
    room.closed().await;
    wait_until(|| hub.get("kaboom").is_none()).await;
}

#[tokio::test]
async fn test_close_all_empties_the_hub() {
    let (logic, _observed, _calls) = ChatLogic::new();
    let hub = Hub::new(logic);
    let alpha = hub.get_or_create("alpha").await.unwrap();
    let beta = hub.get_or_create("beta").await.unwrap();

    hub.close_all();

    assert!(alpha.is_closed());
    assert!(beta.is_closed());
    wait_until(|| hub.room_count() == 0).await;
}

// =========================================================================
// Room membership
// =========================================================================

#[tokio::test]
async fn test_membership_tracks_adds_and_removes() {
    let (logic, _observed, _calls) = ChatLogic::new();
    let hub = Hub::new(logic);
    let room = hub.get_or_create("alpha").await.unwrap();

    let a = room.add_client("alice".into()).unwrap();
    let b = room.add_client("bob".into()).unwrap();
    let c = room.add_client("carol".into()).unwrap();
    assert_eq!(room.client_count(), 3);

    room.remove_client(&b).unwrap();
    let members = ids(&room.clients());
    assert_eq!(members.len(), 2);
    assert!(members.contains(&a.id()));
    assert!(!members.contains(&b.id()));
    assert!(members.contains(&c.id()));
    assert!(b.is_closed());

    let again = room.remove_client(&b);
    assert!(matches!(again, Err(RoomError::NotAMember(_))));
}

#[tokio::test]
async fn test_find_client_by_metadata() {
    let (logic, _observed, _calls) = ChatLogic::new();
    let hub = Hub::new(logic);
    let room = hub.get_or_create("alpha").await.unwrap();

    let bob = room.add_client("bob".into()).unwrap();
    room.add_client("alice".into()).unwrap();

    let found = room.find_client(|name| name == "bob").unwrap();
    assert_eq!(found.id(), bob.id());
    assert!(room.find_client(|name| name == "mallory").is_none());
}

#[tokio::test]
async fn test_room_close_is_idempotent_and_rejects_new_clients() {
    let (logic, _observed, _calls) = ChatLogic::new();
    let hub = Hub::new(logic);
    let room = hub.get_or_create("alpha").await.unwrap();
    let client = room.add_client("alice".into()).unwrap();

    room.close();
    room.close();

    assert!(room.is_closed());
    assert!(client.is_closed());
    assert_eq!(room.client_count(), 0);
    let result = room.add_client("bob".into());
    assert!(matches!(result, Err(RoomError::Closed(_))));
}

#[tokio::test]
async fn test_operations_on_non_member_client_fail() {
    let (logic, _observed, _calls) = ChatLogic::new();
    let hub = Hub::new(logic);
    let alpha = hub.get_or_create("alpha").await.unwrap();
    let beta = hub.get_or_create("beta").await.unwrap();

    // A client of one room is a stranger to another.
    let drifter = alpha.add_client("drifter".into()).unwrap();
    assert!(matches!(
        beta.handle_client_data(&drifter, "hi".into()),
        Err(RoomError::NotAMember(_))
    ));
    assert!(matches!(
        beta.send_to_client(&drifter, "hi".into()),
        Err(RoomError::NotAMember(_))
    ));
}

// =========================================================================
// Delivery and backpressure
// =========================================================================

#[tokio::test]
async fn test_send_to_client_delivers() {
    let (logic, _observed, _calls) = ChatLogic::new();
    let hub = Hub::new(logic);
    let room = hub.get_or_create("alpha").await.unwrap();
    let client = room.add_client("alice".into()).unwrap();

    room.send_to_client(&client, "direct".into()).unwrap();
    assert_eq!(client.recv().await.as_deref(), Some("direct"));
}

#[tokio::test]
async fn test_slow_consumer_is_disconnected_and_removed() {
    let (logic, _observed, _calls) = ChatLogic::new();
    let hub = Hub::new(logic);
    let room = hub.get_or_create("alpha").await.unwrap();
    let client = room.add_client("sloth".into()).unwrap();

    // No awaits between sends on a single-threaded runtime, so the
    // client's relay cannot drain: the buffer fills exactly.
    for n in 0..CLIENT_BUFFER_CAPACITY {
        room.send_to_client(&client, format!("msg {n}")).unwrap();
    }
    let overflow = room.send_to_client(&client, "one too many".into());
    match overflow {
        Err(RoomError::Delivery { source, .. }) => {
            assert_eq!(source, lodge::SendError::BufferFull)
        }
        other => panic!("expected Delivery error, got {other:?}"),
    }

    assert!(client.is_closed());
    assert_eq!(room.client_count(), 0);
    assert!(matches!(
        room.send_to_client(&client, "gone".into()),
        Err(RoomError::NotAMember(_))
    ));
}

#[tokio::test]
async fn test_event_queue_overflow_closes_room() {
    let hub = Hub::new(StallLogic);
    let room = hub.get_or_create("stalled").await.unwrap();
    let client = room.add_client(()).unwrap();

    // The join already used one slot; this loop overflows the queue.
    for n in 0..EVENT_QUEUE_CAPACITY {
        let _ = room.handle_client_data(&client, format!("msg {n}"));
    }

    assert!(room.is_closed());
    assert!(client.is_closed());
}

// =========================================================================
// Event ordering and end-to-end flow
// =========================================================================

#[tokio::test]
async fn test_custom_events_preserve_send_order() {
    let (logic, mut observed, _calls) = ChatLogic::new();
    let hub = Hub::new(logic);
    let room = hub.get_or_create("alpha").await.unwrap();
    let client = room.add_client("alice".into()).unwrap();

    for msg in ["m1", "m2", "m3"] {
        room.handle_client_data(&client, msg.into()).unwrap();
    }

    assert_eq!(observed.recv().await, Some(Observed::Join(client.id())));
    for msg in ["m1", "m2", "m3"] {
        assert_eq!(
            observed.recv().await,
            Some(Observed::Custom(client.id(), msg.into()))
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_chat_room_end_to_end() {
    let (logic, mut observed, _calls) = ChatLogic::new();
    let hub = Hub::new(logic);
    let room = hub.get_or_create("room1").await.unwrap();

    let alice = room.add_client("alice".into()).unwrap();
    let bob = room.add_client("bob".into()).unwrap();
    assert_eq!(observed.recv().await, Some(Observed::Join(alice.id())));
    assert_eq!(observed.recv().await, Some(Observed::Join(bob.id())));

    room.handle_client_data(&alice, "hi".into()).unwrap();
    assert_eq!(
        observed.recv().await,
        Some(Observed::Custom(alice.id(), "hi".into()))
    );

    // The handler broadcasts to everyone except the sender.
    assert_eq!(bob.recv().await.as_deref(), Some("hi"));
    let nothing = tokio::time::timeout(Duration::from_millis(50), alice.recv()).await;
    assert!(nothing.is_err(), "sender must not receive its own message");

    room.remove_client(&alice).unwrap();
    assert_eq!(observed.recv().await, Some(Observed::Leave(alice.id())));
    assert_eq!(ids(&room.clients()), vec![bob.id()]);
}

// =========================================================================
// Idle auto-close
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_idle_room_closes_and_a_new_one_replaces_it() {
    let (logic, _observed, init_calls) = ChatLogic::new();
    let hub = Hub::new(logic);
    let room = hub.get_or_create("alpha").await.unwrap();

    let client = room.add_client("alice".into()).unwrap();
    room.remove_client(&client).unwrap();

    tokio::time::sleep(Duration::from_secs(121)).await;
    wait_until(|| room.is_closed()).await;
    wait_until(|| hub.get("alpha").is_none()).await;

    // The next request builds a brand-new room with a fresh init.
    let replacement = hub.get_or_create("alpha").await.unwrap();
    assert!(!Arc::ptr_eq(&room, &replacement));
    assert_eq!(init_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_rejoin_before_the_deadline_keeps_the_room_alive() {
    let (logic, _observed, _calls) = ChatLogic::new();
    let hub = Hub::with_config(
        logic,
        HubConfig {
            idle_close_delay: Duration::from_secs(30),
        },
    );
    let room = hub.get_or_create("alpha").await.unwrap();

    let first = room.add_client("alice".into()).unwrap();
    room.remove_client(&first).unwrap();

    tokio::time::sleep(Duration::from_secs(15)).await;
    let _second = room.add_client("bob".into()).unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(!room.is_closed());
    assert_eq!(hub.room_count(), 1);
}
