//! Per-connection client: a bounded outbound path from "anyone may
//! enqueue" to "exactly one consumer reads in order."
//!
//! Producers (room broadcasts, direct sends) push into a bounded buffer
//! with a non-blocking `try_send`. A dedicated relay task drains that
//! buffer into a second, consumer-facing channel one item at a time, so
//! concurrent producers never contend with the consumer and only `send`
//! ever observes the buffer's "full" state.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::config::CLIENT_BUFFER_CAPACITY;
use crate::error::SendError;

/// Counter for generating unique client IDs. IDs are never reused.
static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// A unique identifier for one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

/// One connected participant, decoupled from any specific transport.
///
/// `C` is caller-supplied metadata (opaque to the core, immutable after
/// construction); `D` is the message type delivered to the connection.
pub struct Client<C, D> {
    id: ClientId,
    metadata: C,
    buffer_tx: mpsc::Sender<D>,
    outbound_rx: tokio::sync::Mutex<mpsc::Receiver<D>>,
    cancel: CancellationToken,
}

impl<C, D> Client<C, D>
where
    D: Send + 'static,
{
    pub(crate) fn new(metadata: C) -> Self {
        let (buffer_tx, mut buffer_rx) = mpsc::channel(CLIENT_BUFFER_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        // Relay: the only reader of the buffer and the only writer of the
        // consumer-facing channel. Exits on cancellation or when the
        // consumer side is dropped; dropping `outbound_tx` here is what
        // ends the consumer's stream.
        let relay_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    _ = relay_cancel.cancelled() => break,
                    item = buffer_rx.recv() => item,
                };
                let Some(item) = item else { break };
                tokio::select! {
                    _ = relay_cancel.cancelled() => break,
                    sent = outbound_tx.send(item) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            id: ClientId::next(),
            metadata,
            buffer_tx,
            outbound_rx: tokio::sync::Mutex::new(outbound_rx),
            cancel,
        }
    }

    /// Returns the client's unique ID.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Returns the caller-supplied metadata for this connection.
    pub fn metadata(&self) -> &C {
        &self.metadata
    }

    /// Queues data for delivery to this client's consumer.
    ///
    /// Non-blocking. Crate-private on purpose: delivery goes through the
    /// room so a failure always results in membership cleanup.
    pub(crate) fn send(&self, data: D) -> Result<(), SendError> {
        if self.cancel.is_cancelled() {
            return Err(SendError::Disconnected);
        }
        match self.buffer_tx.try_send(data) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                // Slow consumer: disconnect instead of blocking the room.
                self.close();
                Err(SendError::BufferFull)
            }
            Err(TrySendError::Closed(_)) => Err(SendError::Disconnected),
        }
    }

    /// Receives the next item queued for this client, in send order.
    ///
    /// Returns `None` once the client is closed and anything the relay
    /// already forwarded has been drained. The stream is not restartable.
    pub async fn recv(&self) -> Option<D> {
        self.outbound_rx.lock().await.recv().await
    }

    /// Closes the client. Idempotent; fires the cancellation signal and
    /// terminates the consumer stream.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the client has been closed.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes once the client is closed. Cancellation-safe.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }
}
