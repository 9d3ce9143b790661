//! WebSocket chat server built on the lodge core.
//!
//! Rooms are addressed by URL path (`ws://.../ws/<room>`) and clients
//! pick a display name with `?name=`. The room handler broadcasts join
//! and leave notices plus chat lines to everyone except the originator.
//! Messages travel as `"<tag> <json>"` lines via `lodge-wire`.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use lodge::{Client, Event, Events, Hub, InitError, Room, RoomLogic};
use lodge_wire::{MessageRegistry, Tagged, WireError, encode};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

// ---------------------------------------------------------------------------
// Wire messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JoinNotice {
    name: String,
}

impl Tagged for JoinNotice {
    const TAG: &'static str = "join";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeaveNotice {
    name: String,
}

impl Tagged for LeaveNotice {
    const TAG: &'static str = "leave";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatLine {
    name: String,
    content: String,
}

impl Tagged for ChatLine {
    const TAG: &'static str = "chat";
}

/// Everything a chat room can carry, inbound or outbound.
#[derive(Debug, Clone)]
enum Frame {
    Join(JoinNotice),
    Leave(LeaveNotice),
    Chat(ChatLine),
}

impl Frame {
    fn encode(&self) -> Result<String, WireError> {
        match self {
            Self::Join(msg) => encode(msg),
            Self::Leave(msg) => encode(msg),
            Self::Chat(msg) => encode(msg),
        }
    }
}

impl From<JoinNotice> for Frame {
    fn from(msg: JoinNotice) -> Self {
        Self::Join(msg)
    }
}

impl From<LeaveNotice> for Frame {
    fn from(msg: LeaveNotice) -> Self {
        Self::Leave(msg)
    }
}

impl From<ChatLine> for Frame {
    fn from(msg: ChatLine) -> Self {
        Self::Chat(msg)
    }
}

fn build_registry() -> Result<MessageRegistry<Frame>, WireError> {
    let mut registry = MessageRegistry::new();
    registry.register::<JoinNotice>()?;
    registry.register::<LeaveNotice>()?;
    registry.register::<ChatLine>()?;
    Ok(registry)
}

// ---------------------------------------------------------------------------
// Room logic
// ---------------------------------------------------------------------------

struct RoomInfo {
    name: String,
}

struct User {
    name: String,
}

struct ChatServer;

impl RoomLogic for ChatServer {
    type RoomMeta = RoomInfo;
    type ClientMeta = User;
    type Data = Frame;

    async fn init(&self, room_id: &str) -> Result<RoomInfo, InitError> {
        // A real deployment would load room state from storage here.
        Ok(RoomInfo {
            name: room_id.to_string(),
        })
    }

    async fn run(&self, room: Arc<Room<Self>>, mut events: Events<User, Frame>) {
        let room_name = room
            .metadata()
            .map(|info| info.name.clone())
            .unwrap_or_default();
        tracing::info!(room = %room_name, "room handler started");
        while let Some(event) = events.next().await {
            match event {
                Event::Join(client) => {
                    let name = client.metadata().name.clone();
                    tracing::info!(room = %room.id(), %name, "user joined");
                    room.broadcast_except(&client, Frame::Join(JoinNotice { name }));
                }
                Event::Leave(client) => {
                    let name = client.metadata().name.clone();
                    tracing::info!(room = %room.id(), %name, "user left");
                    room.broadcast_except(&client, Frame::Leave(LeaveNotice { name }));
                }
                Event::Custom { client, data } => {
                    if let Frame::Chat(line) = &data {
                        tracing::info!(
                            room = %room.id(),
                            name = %line.name,
                            content = %line.content,
                            "chat"
                        );
                    }
                    room.broadcast_except(&client, data);
                }
            }
        }
        tracing::info!(room = %room.id(), "room handler exiting");
    }
}

// ---------------------------------------------------------------------------
// Transport glue
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let hub = Hub::new(ChatServer);
    let registry = Arc::new(build_registry()?);

    let listener = TcpListener::bind("127.0.0.1:8080").await?;
    tracing::info!("chat server listening on ws://127.0.0.1:8080/ws/<room>?name=<you>");

    loop {
        let (stream, addr) = listener.accept().await?;
        let hub = Arc::clone(&hub);
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, hub, registry).await {
                tracing::debug!(%addr, error = %err, "connection ended with error");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    hub: Arc<Hub<ChatServer>>,
    registry: Arc<MessageRegistry<Frame>>,
) -> Result<(), BoxError> {
    let mut room_id = String::new();
    let mut name = String::from("anonymous");
    let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        if let Some(segment) = req.uri().path().rsplit('/').next() {
            room_id = segment.to_string();
        }
        if let Some(query) = req.uri().query() {
            for pair in query.split('&') {
                if let Some(value) = pair.strip_prefix("name=") {
                    if !value.is_empty() {
                        name = value.to_string();
                    }
                }
            }
        }
        Ok::<Response, ErrorResponse>(resp)
    })
    .await?;

    let room = hub.get_or_create(&room_id).await?;
    let client = room.add_client(User { name })?;

    let (mut ws_tx, mut ws_rx) = ws.split();

    // Outbound: drain the client's delivery path to the socket. Ends on
    // its own once the client closes.
    let outbound_client: Arc<Client<User, Frame>> = Arc::clone(&client);
    tokio::spawn(async move {
        while let Some(frame) = outbound_client.recv().await {
            match frame.encode() {
                Ok(line) => {
                    if ws_tx.send(Message::text(line)).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "dropping unencodable frame");
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    // Inbound: decode socket lines into room data.
    loop {
        let message = tokio::select! {
            _ = client.closed() => break,
            message = ws_rx.next() => match message {
                Some(Ok(message)) => message,
                Some(Err(_)) | None => break,
            },
        };
        match message {
            Message::Text(text) => match registry.decode(text.as_str()) {
                Ok(frame) => {
                    if room.handle_client_data(&client, frame).is_err() {
                        break;
                    }
                }
                Err(err) => tracing::warn!(error = %err, "ignoring bad message"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    let _ = room.remove_client(&client);
    Ok(())
}
